//! clitest: a declarative, language-agnostic command-line test runner.
//!
//! Suites are XML documents describing commands to run and assertions on
//! their stdout, stderr, and exit code. Exit status: 0 all tests passed,
//! 1 at least one assertion failed, 2 a suite could not be loaded or run.

mod compare;
mod env;
mod loader;
mod report;
mod runner;
mod schema;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_SUCCESS: u8 = 0;
const EXIT_TESTS_FAILED: u8 = 1;
const EXIT_RUNTIME_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "clitest",
    version,
    about = "A generic, language-agnostic command-line test runner."
)]
struct Cli {
    /// One or more paths to test suite XML files.
    #[arg(value_name = "SUITE", required = true)]
    suites: Vec<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, conflicts_with_all = ["quiet", "list_cases"])]
    verbose: bool,

    /// Enable quiet output.
    #[arg(short, long, conflicts_with = "list_cases")]
    quiet: bool,

    /// List all test cases that would be run without executing them.
    #[arg(long)]
    list_cases: bool,

    /// The output format for test results.
    #[arg(long, value_enum, default_value = "spec")]
    reporter: report::Reporter,
}

fn list_cases(suites: &[(String, schema::SuiteDefinition)]) {
    println!("The following tests would be run:");
    for (_, suite) in suites {
        println!("\nSuite: {}", suite.description);
        if suite.cases.is_empty() {
            println!("  (No test cases found)");
            continue;
        }
        for case in &suite.cases {
            println!("  - {}", case.description);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load and validate every suite up front; a single broken suite aborts
    // the whole run before anything executes.
    let mut suites: Vec<(String, schema::SuiteDefinition)> = Vec::new();
    let mut has_errors = false;
    for path in &cli.suites {
        let source = path.display().to_string();
        if !path.exists() {
            eprintln!("Error: File not found: '{source}'");
            has_errors = true;
            continue;
        }
        match loader::load_document(path).and_then(|root| schema::parse_suite(&root, &source)) {
            Ok(suite) => suites.push((source, suite)),
            Err(loader::LoadError::Invalid(errors)) => {
                eprintln!("Error: Validation failed for suite '{source}':");
                for error in &errors {
                    eprintln!("  - {error}");
                }
                has_errors = true;
            }
            Err(e) => {
                eprintln!("Error: Validation failed for suite '{source}':");
                eprintln!("  - {e}");
                has_errors = true;
            }
        }
    }
    if has_errors {
        return ExitCode::from(EXIT_RUNTIME_ERROR);
    }

    if cli.list_cases {
        list_cases(&suites);
        return ExitCode::from(EXIT_SUCCESS);
    }

    let results: Vec<runner::SuiteResult> = suites
        .iter()
        .map(|(path, suite)| runner::run_suite(suite, path, cli.verbose))
        .collect();

    let exit = if results.iter().any(|r| !r.error.is_empty()) {
        EXIT_RUNTIME_ERROR
    } else if results.iter().any(|r| r.num_failures() > 0) {
        EXIT_TESTS_FAILED
    } else {
        EXIT_SUCCESS
    };

    report::render(cli.reporter, &results, cli.quiet);
    ExitCode::from(exit)
}
