//! Suite document schema.
//!
//! The structural rules for suite documents live in a declarative table
//! (element -> allowed attributes, child cardinalities, field checks) walked
//! by one generic recursive validator. The typed suite model is built from a
//! tree only after it has passed validation, so the runner never re-checks
//! document shape.

use crate::compare::{MATCH_MODES, MatchMode, NormalizeRule, StreamExpectation};
use crate::loader::{Element, LoadError};
use std::collections::HashMap;

/// Required tag of a suite document's root element.
pub const ROOT_TAG: &str = "test-suite";

/// Occurrence bounds for a child tag. `max: None` means unbounded.
pub struct ChildRule {
    pub tag: &'static str,
    pub min: usize,
    pub max: Option<usize>,
}

/// Field-level semantic checks, run after the structural checks pass.
pub enum FieldCheck {
    /// The element's text must be non-empty after trimming.
    NonEmptyText,
    /// The element must have at least one child element.
    NonEmptyElement,
    /// The element's text must parse as an integer.
    IntText,
    /// The named attribute must be present.
    RequiredAttr(&'static str),
    /// The named attribute, when present, must parse as a positive float.
    AttrPositiveFloat(&'static str),
    /// The named attribute, when present, must be one of the listed values.
    AttrOneOf(&'static str, &'static [&'static str]),
    /// The named attribute, when present, must be a comma-separated list of
    /// normalization keywords.
    AttrNormalizeRules(&'static str),
}

/// The structural rules for one element tag.
pub struct ElementRule {
    pub tag: &'static str,
    pub attrs: &'static [&'static str],
    pub children: &'static [ChildRule],
    pub checks: &'static [FieldCheck],
}

const STREAM_CHECKS: &[FieldCheck] = &[
    FieldCheck::AttrOneOf("match", MATCH_MODES),
    FieldCheck::AttrNormalizeRules("normalize"),
];

/// The suite document schema.
pub const SUITE_SCHEMA: &[ElementRule] = &[
    ElementRule {
        tag: "test-suite",
        attrs: &["description", "timeout"],
        children: &[
            ChildRule { tag: "environment", min: 0, max: Some(1) },
            ChildRule { tag: "test-cases", min: 1, max: Some(1) },
        ],
        checks: &[FieldCheck::AttrPositiveFloat("timeout")],
    },
    ElementRule {
        tag: "environment",
        attrs: &[],
        children: &[
            ChildRule { tag: "working-directory", min: 0, max: Some(1) },
            ChildRule { tag: "variable", min: 0, max: None },
            ChildRule { tag: "setup", min: 0, max: Some(1) },
            ChildRule { tag: "teardown", min: 0, max: Some(1) },
        ],
        checks: &[],
    },
    ElementRule {
        tag: "working-directory",
        attrs: &[],
        children: &[],
        checks: &[FieldCheck::NonEmptyText],
    },
    ElementRule {
        tag: "variable",
        attrs: &["name"],
        children: &[],
        checks: &[FieldCheck::RequiredAttr("name")],
    },
    ElementRule {
        tag: "setup",
        attrs: &[],
        children: &[ChildRule { tag: "command", min: 1, max: None }],
        checks: &[],
    },
    ElementRule {
        tag: "teardown",
        attrs: &[],
        children: &[ChildRule { tag: "command", min: 1, max: None }],
        checks: &[],
    },
    ElementRule {
        tag: "command",
        attrs: &[],
        children: &[],
        checks: &[FieldCheck::NonEmptyText],
    },
    ElementRule {
        tag: "test-cases",
        attrs: &[],
        children: &[ChildRule { tag: "test-case", min: 0, max: None }],
        checks: &[],
    },
    ElementRule {
        tag: "test-case",
        attrs: &["description", "timeout"],
        children: &[
            ChildRule { tag: "environment", min: 0, max: Some(1) },
            ChildRule { tag: "command", min: 1, max: Some(1) },
            ChildRule { tag: "args", min: 0, max: Some(1) },
            ChildRule { tag: "stdin", min: 0, max: Some(1) },
            ChildRule { tag: "expect", min: 1, max: Some(1) },
        ],
        checks: &[FieldCheck::AttrPositiveFloat("timeout")],
    },
    ElementRule {
        tag: "args",
        attrs: &[],
        children: &[ChildRule { tag: "arg", min: 1, max: None }],
        checks: &[],
    },
    ElementRule {
        tag: "arg",
        attrs: &[],
        children: &[],
        checks: &[FieldCheck::NonEmptyText],
    },
    ElementRule {
        tag: "stdin",
        attrs: &[],
        children: &[],
        checks: &[],
    },
    ElementRule {
        tag: "expect",
        attrs: &[],
        children: &[
            ChildRule { tag: "stdout", min: 0, max: Some(1) },
            ChildRule { tag: "stderr", min: 0, max: Some(1) },
            ChildRule { tag: "exit_code", min: 0, max: Some(1) },
        ],
        checks: &[FieldCheck::NonEmptyElement],
    },
    ElementRule {
        tag: "stdout",
        attrs: &["match", "normalize"],
        children: &[],
        checks: STREAM_CHECKS,
    },
    ElementRule {
        tag: "stderr",
        attrs: &["match", "normalize"],
        children: &[],
        checks: STREAM_CHECKS,
    },
    ElementRule {
        tag: "exit_code",
        attrs: &[],
        children: &[],
        checks: &[FieldCheck::IntText],
    },
];

/// Validate a parsed suite document against [`SUITE_SCHEMA`].
///
/// A wrong root element is reported as [`LoadError::WrongRoot`]; schema-rule
/// violations are collected (all of them, not just the first) into
/// [`LoadError::Invalid`]. No process is ever spawned for a document that
/// fails here.
pub fn validate(root: &Element) -> Result<(), LoadError> {
    if root.tag != ROOT_TAG {
        return Err(LoadError::WrongRoot(root.tag.clone()));
    }
    let mut errors = Vec::new();
    validate_node(root, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(LoadError::Invalid(errors))
    }
}

fn rule_for(tag: &str) -> Option<&'static ElementRule> {
    SUITE_SCHEMA.iter().find(|r| r.tag == tag)
}

fn validate_node(element: &Element, errors: &mut Vec<String>) {
    let Some(rule) = rule_for(&element.tag) else {
        errors.push(format!("<{}> is not a recognized element.", element.tag));
        return;
    };

    let mut unknown_attrs: Vec<&str> = element
        .attrs
        .iter()
        .map(|(name, _)| name.as_str())
        .filter(|name| !rule.attrs.contains(name))
        .collect();
    if !unknown_attrs.is_empty() {
        unknown_attrs.sort_unstable();
        unknown_attrs.dedup();
        errors.push(format!(
            "<{}> contains unknown attribute(s): {:?}",
            element.tag, unknown_attrs
        ));
    }

    let mut unknown_children: Vec<&str> = element
        .children
        .iter()
        .map(|c| c.tag.as_str())
        .filter(|tag| !rule.children.iter().any(|c| c.tag == *tag))
        .collect();
    if !unknown_children.is_empty() {
        unknown_children.sort_unstable();
        unknown_children.dedup();
        errors.push(format!(
            "<{}> contains unknown child element(s): {:?}",
            element.tag, unknown_children
        ));
    }

    for child_rule in rule.children {
        let count = element.count(child_rule.tag);
        if count < child_rule.min {
            errors.push(format!(
                "<{}> must contain at least {} <{}> child element(s), found {count}.",
                element.tag, child_rule.min, child_rule.tag
            ));
        }
        if let Some(max) = child_rule.max
            && count > max
        {
            errors.push(format!(
                "<{}> allows at most {max} <{}> child element(s), found {count}.",
                element.tag, child_rule.tag
            ));
        }
    }

    for check in rule.checks {
        run_check(element, check, errors);
    }

    // Recurse into allowed children only; unknown ones were already reported.
    let mut case_index = 0;
    for child in &element.children {
        if !rule.children.iter().any(|c| c.tag == child.tag) {
            continue;
        }
        if child.tag == "test-case" {
            let mut case_errors = Vec::new();
            validate_node(child, &mut case_errors);
            if !case_errors.is_empty() {
                let description = child
                    .attr("description")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("at index {case_index}"));
                errors.push(format!("Invalid test case '{description}':"));
                errors.extend(case_errors.into_iter().map(|e| format!("  - {e}")));
            }
            case_index += 1;
        } else {
            validate_node(child, errors);
        }
    }
}

fn run_check(element: &Element, check: &FieldCheck, errors: &mut Vec<String>) {
    match check {
        FieldCheck::NonEmptyText => {
            if element.text.trim().is_empty() {
                errors.push(format!("<{}> tag cannot be empty.", element.tag));
            }
        }
        FieldCheck::NonEmptyElement => {
            if element.children.is_empty() {
                errors.push(format!("<{}> block cannot be empty.", element.tag));
            }
        }
        FieldCheck::IntText => {
            if element.text.trim().parse::<i32>().is_err() {
                errors.push(format!("<{}> must contain a valid integer.", element.tag));
            }
        }
        FieldCheck::RequiredAttr(name) => {
            if element.attr(name).is_none() {
                errors.push(format!(
                    "<{}> is missing required '{name}' attribute.",
                    element.tag
                ));
            }
        }
        FieldCheck::AttrPositiveFloat(name) => {
            if let Some(value) = element.attr(name) {
                match value.parse::<f64>() {
                    Ok(n) if n > 0.0 => {}
                    _ => errors.push(format!(
                        "<{}> has an invalid '{name}' attribute: {value:?} (must be a positive number).",
                        element.tag
                    )),
                }
            }
        }
        FieldCheck::AttrOneOf(name, allowed) => {
            if let Some(value) = element.attr(name)
                && !allowed.contains(&value)
            {
                errors.push(format!(
                    "<{}> has invalid '{name}' attribute value: '{value}'",
                    element.tag
                ));
            }
        }
        FieldCheck::AttrNormalizeRules(name) => {
            if let Some(value) = element.attr(name)
                && let Err(invalid) = NormalizeRule::parse_list(value)
            {
                errors.push(format!(
                    "<{}> has invalid '{name}' keyword(s): {invalid:?}",
                    element.tag
                ));
            }
        }
    }
}

/// A validated suite document: environment defaults plus an ordered sequence
/// of test cases. Immutable for the lifetime of one suite execution.
#[derive(Debug, Clone)]
pub struct SuiteDefinition {
    /// Suite description; defaults to the source path.
    pub description: String,
    /// Default timeout in seconds for all cases.
    pub timeout: Option<f64>,
    pub environment: Option<EnvironmentBlock>,
    pub cases: Vec<TestCase>,
}

/// Environment settings shared by suite and case scope. Case scope augments
/// suite scope for variables but overrides working directory and timeout.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBlock {
    pub working_dir: Option<String>,
    /// Last write wins for a duplicate variable name.
    pub variables: HashMap<String, String>,
    /// Shell-interpreted setup commands, run in order.
    pub setup: Vec<String>,
    /// Shell-interpreted teardown commands, run in order.
    pub teardown: Vec<String>,
}

/// One executable invocation plus its assertions.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub description: String,
    /// Overrides the suite timeout when present.
    pub timeout: Option<f64>,
    pub environment: Option<EnvironmentBlock>,
    /// Executable path; invoked without shell interpretation.
    pub command: String,
    pub args: Vec<String>,
    /// Literal text fed to the process's standard input.
    pub stdin: Option<String>,
    pub expect: Expectation,
}

/// Assertions for one case. Validation guarantees at least one is present.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub stdout: Option<StreamExpectation>,
    pub stderr: Option<StreamExpectation>,
    /// Explicit expected exit code. When absent, 0 is asserted.
    pub exit_code: Option<i32>,
}

/// Fallback description for a case without a `description` attribute.
pub const UNNAMED_CASE: &str = "Unnamed Test Case";

impl SuiteDefinition {
    /// Build the typed model from a tree that already passed [`validate`].
    ///
    /// Numeric fields use `.ok()` rather than error paths: the validator has
    /// already rejected anything unparseable.
    pub fn from_element(root: &Element, source: &str) -> SuiteDefinition {
        let cases = root
            .find("test-cases")
            .map(|wrapper| {
                wrapper
                    .find_all("test-case")
                    .map(TestCase::from_element)
                    .collect()
            })
            .unwrap_or_default();

        SuiteDefinition {
            description: root
                .attr("description")
                .unwrap_or(source)
                .to_string(),
            timeout: root.attr("timeout").and_then(|t| t.parse().ok()),
            environment: root.find("environment").map(EnvironmentBlock::from_element),
            cases,
        }
    }
}

impl EnvironmentBlock {
    fn from_element(element: &Element) -> EnvironmentBlock {
        let mut variables = HashMap::new();
        for var in element.find_all("variable") {
            if let Some(name) = var.attr("name") {
                variables.insert(name.to_string(), var.text.clone());
            }
        }

        let commands = |tag: &str| -> Vec<String> {
            element
                .find(tag)
                .map(|block| {
                    block
                        .find_all("command")
                        .map(|c| c.text.trim().to_string())
                        .collect()
                })
                .unwrap_or_default()
        };

        EnvironmentBlock {
            working_dir: element
                .find("working-directory")
                .map(|wd| wd.text.trim().to_string()),
            variables,
            setup: commands("setup"),
            teardown: commands("teardown"),
        }
    }
}

impl TestCase {
    fn from_element(element: &Element) -> TestCase {
        let args = element
            .find("args")
            .map(|block| block.find_all("arg").map(|a| a.text.clone()).collect())
            .unwrap_or_default();

        TestCase {
            description: element
                .attr("description")
                .unwrap_or(UNNAMED_CASE)
                .to_string(),
            timeout: element.attr("timeout").and_then(|t| t.parse().ok()),
            environment: element.find("environment").map(EnvironmentBlock::from_element),
            command: element
                .find("command")
                .map(|c| c.text.trim().to_string())
                .unwrap_or_default(),
            args,
            stdin: element.find("stdin").map(|s| s.text.clone()),
            expect: Expectation::from_element(element.find("expect")),
        }
    }
}

impl Expectation {
    fn from_element(element: Option<&Element>) -> Expectation {
        let Some(element) = element else {
            return Expectation {
                stdout: None,
                stderr: None,
                exit_code: None,
            };
        };

        let stream = |tag: &str| -> Option<StreamExpectation> {
            element.find(tag).map(|el| StreamExpectation {
                text: el.text.clone(),
                match_mode: el
                    .attr("match")
                    .and_then(MatchMode::parse)
                    .unwrap_or_default(),
                normalize: el
                    .attr("normalize")
                    .map(|s| NormalizeRule::parse_list(s).unwrap_or_default())
                    .unwrap_or_default(),
            })
        };

        Expectation {
            stdout: stream("stdout"),
            stderr: stream("stderr"),
            exit_code: element
                .find("exit_code")
                .and_then(|el| el.text.trim().parse().ok()),
        }
    }
}

/// Validate a parsed document and build the typed suite model from it.
pub fn parse_suite(root: &Element, source: &str) -> Result<SuiteDefinition, LoadError> {
    validate(root)?;
    Ok(SuiteDefinition::from_element(root, source))
}
