//! Output stream comparison.
//!
//! Applies named normalization rules to captured output and compares it
//! against a stream expectation using one of three match modes.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ANSI pattern is valid")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Comparison strategy for a captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
    Regex,
}

/// Accepted values for the `match` attribute.
pub const MATCH_MODES: &[&str] = &["exact", "contains", "regex"];

impl MatchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchMode::Exact),
            "contains" => Some(MatchMode::Contains),
            "regex" => Some(MatchMode::Regex),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchMode::Exact => "exact",
            MatchMode::Contains => "contains",
            MatchMode::Regex => "regex",
        };
        f.write_str(name)
    }
}

/// A named text transform applied before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeRule {
    /// Strip ANSI escape sequences.
    Ansi,
    /// Collapse whitespace runs into single spaces and trim.
    Whitespace,
}

impl NormalizeRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ansi" => Some(NormalizeRule::Ansi),
            "whitespace" => Some(NormalizeRule::Whitespace),
            _ => None,
        }
    }

    /// Parse a comma-separated rule list, e.g. `"ansi, whitespace"`.
    ///
    /// Returns the invalid keywords (sorted) on failure so the validator can
    /// report all of them at once.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, Vec<String>> {
        let mut rules = Vec::new();
        let mut invalid = Vec::new();
        for keyword in s.split(',') {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() {
                continue;
            }
            match Self::parse(&keyword) {
                Some(rule) => {
                    if !rules.contains(&rule) {
                        rules.push(rule);
                    }
                }
                None => invalid.push(keyword),
            }
        }
        if invalid.is_empty() {
            Ok(rules)
        } else {
            invalid.sort();
            invalid.dedup();
            Err(invalid)
        }
    }
}

/// Expectation for one captured stream.
#[derive(Debug, Clone)]
pub struct StreamExpectation {
    /// The expected text (or pattern, under the `regex` mode).
    pub text: String,
    pub match_mode: MatchMode,
    pub normalize: Vec<NormalizeRule>,
}

/// Outcome of comparing one stream, with normalized values for diagnostics.
#[derive(Debug)]
pub struct Comparison {
    pub passed: bool,
    pub reason: String,
    pub normalized_actual: String,
    pub normalized_expected: String,
}

/// Apply normalization rules to a string.
pub fn normalize(text: &str, rules: &[NormalizeRule]) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut text = text.to_string();
    if rules.contains(&NormalizeRule::Ansi) {
        text = ANSI_RE.replace_all(&text, "").into_owned();
    }
    if rules.contains(&NormalizeRule::Whitespace) {
        text = WHITESPACE_RE.replace_all(&text, " ").trim().to_string();
    }
    text
}

/// Compare captured output against a stream expectation.
///
/// Normalization applies to the actual output unconditionally, but to the
/// expected text only under the `whitespace` rule, so literal expectations
/// keep their exact spacing under `exact`/`contains`/`regex`.
pub fn compare(actual: &str, expectation: &StreamExpectation) -> Comparison {
    let normalized_actual = normalize(actual, &expectation.normalize);
    let normalized_expected = if expectation.normalize.contains(&NormalizeRule::Whitespace) {
        normalize(&expectation.text, &expectation.normalize)
    } else {
        expectation.text.clone()
    };

    let passed = match expectation.match_mode {
        MatchMode::Exact => normalized_actual == normalized_expected,
        MatchMode::Contains => normalized_actual.contains(normalized_expected.as_str()),
        MatchMode::Regex => match Regex::new(&normalized_expected) {
            Ok(re) => re.is_match(&normalized_actual),
            Err(e) => {
                return Comparison {
                    passed: false,
                    reason: format!("invalid regex {normalized_expected:?}: {e}"),
                    normalized_actual,
                    normalized_expected,
                };
            }
        },
    };

    let reason = if passed {
        String::new()
    } else {
        format!("'{}' match failed", expectation.match_mode)
    };

    Comparison {
        passed,
        reason,
        normalized_actual,
        normalized_expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expectation(text: &str, mode: MatchMode, rules: Vec<NormalizeRule>) -> StreamExpectation {
        StreamExpectation {
            text: text.to_string(),
            match_mode: mode,
            normalize: rules,
        }
    }

    #[test]
    fn exact_match() {
        let cmp = compare("abc", &expectation("abc", MatchMode::Exact, vec![]));
        assert!(cmp.passed);
        assert!(cmp.reason.is_empty());
    }

    #[test]
    fn exact_mismatch_reports_mode() {
        let cmp = compare("abc", &expectation("abd", MatchMode::Exact, vec![]));
        assert!(!cmp.passed);
        assert_eq!(cmp.reason, "'exact' match failed");
    }

    #[test]
    fn contains_match() {
        let cmp = compare("abcdef", &expectation("cd", MatchMode::Contains, vec![]));
        assert!(cmp.passed);
    }

    #[test]
    fn regex_match_anywhere() {
        let cmp = compare("abc123", &expectation(r"\d+", MatchMode::Regex, vec![]));
        assert!(cmp.passed);
    }

    #[test]
    fn invalid_regex_is_reported() {
        let cmp = compare("abc", &expectation("[unclosed", MatchMode::Regex, vec![]));
        assert!(!cmp.passed);
        assert!(cmp.reason.contains("invalid regex"));
    }

    #[test]
    fn whitespace_folds_both_sides() {
        let cmp = compare(
            "a   b",
            &expectation("a b", MatchMode::Exact, vec![NormalizeRule::Whitespace]),
        );
        assert!(cmp.passed);
        assert_eq!(cmp.normalized_actual, "a b");
        assert_eq!(cmp.normalized_expected, "a b");
    }

    #[test]
    fn whitespace_trims_edges() {
        assert_eq!(
            normalize("  hello\n  world \n", &[NormalizeRule::Whitespace]),
            "hello world"
        );
    }

    #[test]
    fn ansi_rule_strips_color_codes() {
        let colored = "\x1b[92mok\x1b[0m";
        assert_eq!(normalize(colored, &[NormalizeRule::Ansi]), "ok");
    }

    #[test]
    fn ansi_applies_to_actual_only() {
        // The expected text is literal unless whitespace folding is on.
        let cmp = compare(
            "\x1b[31merror\x1b[0m: bad\n",
            &expectation("error: bad\n", MatchMode::Exact, vec![NormalizeRule::Ansi]),
        );
        assert!(cmp.passed);
    }

    #[test]
    fn expected_spacing_preserved_without_whitespace_rule() {
        let cmp = compare("a b", &expectation("a  b", MatchMode::Contains, vec![]));
        assert!(!cmp.passed);
    }

    #[test]
    fn parse_rule_list() {
        assert_eq!(
            NormalizeRule::parse_list("ansi, whitespace").unwrap(),
            vec![NormalizeRule::Ansi, NormalizeRule::Whitespace]
        );
        assert_eq!(NormalizeRule::parse_list("").unwrap(), vec![]);
        assert_eq!(
            NormalizeRule::parse_list("ansi,ansi").unwrap(),
            vec![NormalizeRule::Ansi]
        );
    }

    #[test]
    fn parse_rule_list_reports_invalid_keywords() {
        let err = NormalizeRule::parse_list("ansi, tabs, unicode").unwrap_err();
        assert_eq!(err, vec!["tabs".to_string(), "unicode".to_string()]);
    }

    #[test]
    fn match_mode_parsing() {
        assert_eq!(MatchMode::parse("exact"), Some(MatchMode::Exact));
        assert_eq!(MatchMode::parse("contains"), Some(MatchMode::Contains));
        assert_eq!(MatchMode::parse("regex"), Some(MatchMode::Regex));
        assert_eq!(MatchMode::parse("fuzzy"), None);
    }
}
