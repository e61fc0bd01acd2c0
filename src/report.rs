//! Result reporters.
//!
//! Each reporter formats the suite results for stdout; per-case log lines and
//! suite-level diagnostics go to stderr so the report body stays parseable.

use crate::runner::{CaseResult, SuiteResult};
use clap::ValueEnum;
use colored::Colorize;

/// Output format for test results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reporter {
    Tap,
    Junit,
    Spec,
    Json,
}

/// Render the results for the selected reporter.
pub fn render(reporter: Reporter, results: &[SuiteResult], quiet: bool) {
    let body = match reporter {
        Reporter::Tap => format_tap(results, quiet),
        Reporter::Junit => format_junit(results),
        Reporter::Spec => format_spec(results, quiet),
        Reporter::Json => format_json(results),
    };
    println!("{body}");
}

/// TAP version 14. A single suite emits a flat plan; multiple suites emit a
/// top-level plan with one indented subtest plan per suite.
fn format_tap(results: &[SuiteResult], quiet: bool) -> String {
    let multi_suite = results.len() > 1;
    let mut out = String::from("TAP version 14\n");
    if multi_suite {
        out.push_str(&format!("1..{}\n", results.len()));
    }

    for (i, suite) in results.iter().enumerate() {
        if !suite.error.is_empty() {
            if multi_suite {
                out.push_str(&format!("not ok {} - {}\n", i + 1, suite.description));
            }
            eprintln!("# {}", suite.error);
            continue;
        }

        let indent = if multi_suite { "    " } else { "" };
        if multi_suite {
            let verdict = if suite.num_failures() == 0 { "ok" } else { "not ok" };
            out.push_str(&format!("{verdict} {} - {}\n", i + 1, suite.description));
            out.push_str(&format!("{indent}1..{}\n", suite.num_tests()));
        } else {
            out.push_str(&format!("1..{}\n", suite.num_tests()));
        }

        for (j, case) in suite.cases.iter().enumerate() {
            let test_num = j + 1;
            for line in &case.log {
                eprintln!("{indent}{line}");
            }
            if case.passed {
                out.push_str(&format!("{indent}ok {test_num} - {}\n", case.description));
                continue;
            }
            out.push_str(&format!("{indent}not ok {test_num} - {}\n", case.description));
            if !quiet {
                out.push_str(&format!("{indent}  ---\n"));
                out.push_str(&format!("{indent}  message: \"{}\"\n", case.message));
                out.push_str(&format!("{indent}  severity: fail\n"));
                if !case.diagnostics.is_empty() {
                    out.push_str(&format!("{indent}  data:\n"));
                    for (key, value) in &case.diagnostics {
                        let value = value.replace('\n', "\\n");
                        out.push_str(&format!("{indent}    {key}: \"{value}\"\n"));
                    }
                }
                out.push_str(&format!("{indent}  ...\n"));
            }
        }

        for line in &suite.log {
            eprintln!("{indent}# {line}");
        }
    }

    out.truncate(out.trim_end_matches('\n').len());
    out
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// JUnit XML for CI systems. Infrastructure problems (timeouts, broken
/// setup/teardown) render as `<error>`; assertion mismatches as `<failure>`.
fn format_junit(results: &[SuiteResult]) -> String {
    let total_tests: usize = results.iter().map(SuiteResult::num_tests).sum();
    let total_failures: usize = results.iter().map(SuiteResult::num_failures).sum();
    let total_duration: f64 = results.iter().map(|s| s.duration.as_secs_f64()).sum();

    let mut xml = String::from("<?xml version='1.0' encoding='utf-8'?>\n");
    xml.push_str(&format!(
        "<testsuites tests=\"{total_tests}\" failures=\"{total_failures}\" \
         time=\"{total_duration:.3}\" name=\"clitest suites\">\n"
    ));

    for suite in results {
        xml.push_str(&format!(
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\" hostname=\"localhost\">\n",
            escape_xml(&suite.description),
            suite.num_tests(),
            suite.num_failures(),
            suite.duration.as_secs_f64()
        ));

        for case in &suite.cases {
            xml.push_str(&format!(
                "    <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\">",
                escape_xml(&case.classname),
                escape_xml(&case.description),
                case.duration.as_secs_f64()
            ));

            let has_children = !case.log.is_empty() || !case.passed;
            if has_children {
                xml.push('\n');
            }
            if !case.log.is_empty() {
                xml.push_str(&format!(
                    "      <system-out>{}</system-out>\n",
                    escape_xml(&case.log.join("\n"))
                ));
            }
            if !case.passed {
                let error_type = case.diagnostics.get("error_type").map(String::as_str);
                let tag = if matches!(error_type, Some("TimeoutExpired" | "ConfigurationError")) {
                    "error"
                } else {
                    "failure"
                };
                let diag_text = case
                    .diagnostics
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                xml.push_str(&format!(
                    "      <{tag} message=\"{}\" type=\"{}\">{}</{tag}>\n",
                    escape_xml(&case.message),
                    error_type.unwrap_or("AssertionError"),
                    escape_xml(&diag_text)
                ));
            }
            if has_children {
                xml.push_str("    </testcase>\n");
            } else {
                xml.push_str("</testcase>\n");
            }
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>");
    xml
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Human-readable spec-style report with a failure summary at the end.
fn format_spec(results: &[SuiteResult], quiet: bool) -> String {
    let mut out = String::new();
    let mut failures: Vec<&CaseResult> = Vec::new();
    let mut total_tests = 0;

    for suite in results {
        out.push_str(&format!("\n  {}\n", suite.description.cyan()));
        if !suite.error.is_empty() {
            out.push_str(&format!("    {} {}\n", "ERROR:".red(), suite.error));
            continue;
        }

        for case in &suite.cases {
            total_tests += 1;
            for line in &case.log {
                eprintln!("    {line}");
            }
            if case.passed {
                out.push_str(&format!("    {} {}\n", "✓".green(), case.description));
            } else {
                failures.push(case);
                let numbered = format!("{}) {}", failures.len(), case.description);
                out.push_str(&format!("    {}\n", numbered.red()));
            }
        }

        for line in &suite.log {
            eprintln!("    {line}");
        }
    }

    out.push_str(&format!(
        "\n\n  {} tests run, {}, {}\n",
        total_tests,
        format!("{} passing", total_tests - failures.len()).green(),
        format!("{} failing", failures.len()).red()
    ));

    if !failures.is_empty() && !quiet {
        out.push_str(&format!("\n  {}\n\n", "Failure Details:".red()));
        for (i, case) in failures.iter().enumerate() {
            out.push_str(&format!("  {}) {}\n", i + 1, case.description.red()));
            out.push_str(&format!("      {} {}\n", "Message:".yellow(), case.message));
            for (key, value) in &case.diagnostics {
                let label = format!("{}:", capitalize(key));
                out.push_str(&format!("      {} {value}\n", label.yellow()));
            }
            out.push('\n');
        }
    }

    out.truncate(out.trim_end_matches('\n').len());
    out
}

#[derive(serde::Serialize)]
struct JsonReport<'a> {
    passed: usize,
    failed: usize,
    suites: &'a [SuiteResult],
}

/// Machine-readable summary wrapping the full result records.
fn format_json(results: &[SuiteResult]) -> String {
    let total: usize = results.iter().map(SuiteResult::num_tests).sum();
    let failed: usize = results.iter().map(SuiteResult::num_failures).sum();
    let report = JsonReport {
        passed: total - failed,
        failed,
        suites: results,
    };
    serde_json::to_string_pretty(&report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
