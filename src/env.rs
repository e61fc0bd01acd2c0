//! Effective environment resolution.
//!
//! Builds the (variables, working directory, timeout) triple for a suite and
//! for each case by layering ambient process environment, suite settings, and
//! case overrides. Each layer works on its own copy; nothing is mutated in
//! place, so the resolver stays a pure data transform.

use crate::schema::{SuiteDefinition, TestCase};
use std::collections::HashMap;
use std::path::PathBuf;

/// The effective environment for one scope (suite or case).
#[derive(Debug, Clone, Default)]
pub struct ResolvedEnv {
    pub vars: HashMap<String, String>,
    /// `None` means "current directory at execution time".
    pub working_dir: Option<PathBuf>,
    /// `None` means no limit.
    pub timeout: Option<f64>,
}

/// Snapshot the ambient process environment.
pub fn ambient_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Resolve the suite-level environment: ambient variables overlaid with the
/// suite's variable block, plus the suite's working directory and timeout.
pub fn resolve_suite(ambient: &HashMap<String, String>, suite: &SuiteDefinition) -> ResolvedEnv {
    let mut vars = ambient.clone();
    let mut working_dir = None;

    if let Some(env) = &suite.environment {
        for (name, value) in &env.variables {
            vars.insert(name.clone(), value.clone());
        }
        working_dir = env.working_dir.as_ref().map(PathBuf::from);
    }

    ResolvedEnv {
        vars,
        working_dir,
        timeout: suite.timeout,
    }
}

/// Resolve the case-level environment on top of the suite snapshot.
///
/// Case variables augment the suite set (case wins on collision); working
/// directory and timeout are overridden only when the case supplies them.
pub fn resolve_case(suite_env: &ResolvedEnv, case: &TestCase) -> ResolvedEnv {
    let mut resolved = suite_env.clone();

    if let Some(env) = &case.environment {
        for (name, value) in &env.variables {
            resolved.vars.insert(name.clone(), value.clone());
        }
        if let Some(dir) = &env.working_dir {
            resolved.working_dir = Some(PathBuf::from(dir));
        }
    }
    if case.timeout.is_some() {
        resolved.timeout = case.timeout;
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnvironmentBlock, Expectation};

    fn ambient(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env_block(vars: &[(&str, &str)]) -> EnvironmentBlock {
        EnvironmentBlock {
            variables: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..EnvironmentBlock::default()
        }
    }

    fn suite(environment: Option<EnvironmentBlock>, timeout: Option<f64>) -> SuiteDefinition {
        SuiteDefinition {
            description: "suite".to_string(),
            timeout,
            environment,
            cases: vec![],
        }
    }

    fn case(environment: Option<EnvironmentBlock>, timeout: Option<f64>) -> TestCase {
        TestCase {
            description: "case".to_string(),
            timeout,
            environment,
            command: "true".to_string(),
            args: vec![],
            stdin: None,
            expect: Expectation {
                stdout: None,
                stderr: None,
                exit_code: Some(0),
            },
        }
    }

    #[test]
    fn suite_vars_overlay_ambient() {
        let ambient = ambient(&[("PATH", "/bin"), ("MODE", "ambient")]);
        let resolved = resolve_suite(&ambient, &suite(Some(env_block(&[("MODE", "suite")])), None));

        assert_eq!(resolved.vars.get("PATH"), Some(&"/bin".to_string()));
        assert_eq!(resolved.vars.get("MODE"), Some(&"suite".to_string()));
    }

    #[test]
    fn case_vars_override_suite_vars() {
        let ambient = ambient(&[]);
        let suite_env = resolve_suite(
            &ambient,
            &suite(Some(env_block(&[("MODE", "suite"), ("KEEP", "yes")])), None),
        );
        let resolved = resolve_case(&suite_env, &case(Some(env_block(&[("MODE", "case")])), None));

        assert_eq!(resolved.vars.get("MODE"), Some(&"case".to_string()));
        // A case omitting a variable still sees the suite-level value.
        assert_eq!(resolved.vars.get("KEEP"), Some(&"yes".to_string()));
    }

    #[test]
    fn suite_snapshot_not_mutated_by_case() {
        let ambient = ambient(&[]);
        let suite_env = resolve_suite(&ambient, &suite(Some(env_block(&[("MODE", "suite")])), None));
        let _ = resolve_case(&suite_env, &case(Some(env_block(&[("MODE", "case")])), None));

        assert_eq!(suite_env.vars.get("MODE"), Some(&"suite".to_string()));
    }

    #[test]
    fn working_dir_case_overrides_suite() {
        let mut suite_block = env_block(&[]);
        suite_block.working_dir = Some("/srv/suite".to_string());
        let suite_env = resolve_suite(&ambient(&[]), &suite(Some(suite_block), None));
        assert_eq!(suite_env.working_dir, Some(PathBuf::from("/srv/suite")));

        let mut case_block = env_block(&[]);
        case_block.working_dir = Some("/srv/case".to_string());
        let resolved = resolve_case(&suite_env, &case(Some(case_block), None));
        assert_eq!(resolved.working_dir, Some(PathBuf::from("/srv/case")));

        // Case without a working directory keeps the suite's.
        let resolved = resolve_case(&suite_env, &case(Some(env_block(&[])), None));
        assert_eq!(resolved.working_dir, Some(PathBuf::from("/srv/suite")));
    }

    #[test]
    fn timeout_layering() {
        let suite_env = resolve_suite(&ambient(&[]), &suite(None, Some(5.0)));
        assert_eq!(suite_env.timeout, Some(5.0));

        let resolved = resolve_case(&suite_env, &case(None, Some(0.5)));
        assert_eq!(resolved.timeout, Some(0.5));

        let resolved = resolve_case(&suite_env, &case(None, None));
        assert_eq!(resolved.timeout, Some(5.0));
    }

    #[test]
    fn unset_everywhere_stays_unset() {
        let suite_env = resolve_suite(&ambient(&[]), &suite(None, None));
        let resolved = resolve_case(&suite_env, &case(None, None));

        assert!(resolved.working_dir.is_none());
        assert!(resolved.timeout.is_none());
    }
}
