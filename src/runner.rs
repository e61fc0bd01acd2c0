//! Test execution engine.
//!
//! Runs validated suites: resolves environments, executes setup/teardown
//! commands and the command under test, and evaluates stream and exit-code
//! assertions into result records consumed by the reporters.

use crate::compare;
use crate::env::{self, ResolvedEnv};
use crate::schema::{SuiteDefinition, TestCase};
use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting on a child process under a timeout.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of executing the command under test.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The process ran to completion (or was signal-terminated; on Unix the
    /// exit code is then reported as the negated signal number).
    Exited {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The timeout elapsed; the process was killed and partial output
    /// discarded.
    TimedOut,
    /// The executable could not be resolved.
    NotFound,
}

/// Result of one case invocation. Never mutated after return.
#[derive(Debug, serde::Serialize)]
pub struct CaseResult {
    pub description: String,
    /// Suite description, used as the JUnit classname.
    pub classname: String,
    pub passed: bool,
    pub message: String,
    pub diagnostics: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub log: Vec<String>,
}

/// Aggregated results for one suite. Either `error` is non-empty and no case
/// was attempted, or `error` is empty and `cases` holds the results in
/// document order.
#[derive(Debug, serde::Serialize)]
pub struct SuiteResult {
    pub description: String,
    pub path: String,
    pub cases: Vec<CaseResult>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub error: String,
    /// Suite-level diagnostics (teardown failures); rendered as comments.
    pub log: Vec<String>,
}

impl SuiteResult {
    pub fn num_tests(&self) -> usize {
        self.cases.len()
    }

    pub fn num_failures(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed).count()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn exit_code_of(status: &ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| status.signal().map(|s| -s))
            .unwrap_or(-1)
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

fn apply_env(cmd: &mut Command, env: &ResolvedEnv) {
    cmd.env_clear();
    cmd.envs(&env.vars);
    if let Some(dir) = &env.working_dir {
        cmd.current_dir(dir);
    }
}

/// Run a shell-interpreted setup/teardown command.
///
/// Succeeds iff the command exits with status 0; the error message carries
/// the exit code and captured stderr.
pub fn run_shell_command(text: &str, env: &ResolvedEnv) -> Result<(), String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(text);
    apply_env(cmd.stdin(Stdio::null()), env);

    match cmd.output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(format!(
            "Command '{text}' failed with exit code {}:\n{}",
            exit_code_of(&output.status),
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let program = text.split_whitespace().next().unwrap_or(text);
            Err(format!("Command not found: '{program}'"))
        }
        Err(e) => Err(format!("Failed to run '{text}': {e}")),
    }
}

/// Drain a child pipe to completion on its own thread, so a full OS pipe
/// buffer can never wedge the child while the parent waits for its exit.
fn drain_pipe<R: std::io::Read + Send + 'static>(pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut pipe = pipe;
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn collect_pipe(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run the command under test: `argv[0]` with the remaining elements as
/// literal arguments, no shell interpretation.
///
/// Blocks until the process exits or the resolved timeout elapses; on expiry
/// the process is killed and the outcome is [`ProcessOutcome::TimedOut`].
pub fn run_command(
    argv: &[String],
    env: &ResolvedEnv,
    stdin: Option<&str>,
) -> Result<ProcessOutcome, String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty argument vector".to_string())?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    apply_env(&mut cmd, env);
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ProcessOutcome::NotFound);
        }
        Err(e) => return Err(format!("Failed to spawn '{program}': {e}")),
    };

    // Feed stdin from its own thread: a child that never reads its input
    // must not block the wait below, and a child that exits without reading
    // everything breaks the pipe, which is not an error.
    let stdin_writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(std::thread::spawn(
                // Dropping the pipe at the end sends EOF.
                move || match pipe.write_all(input.as_bytes()) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    Err(e) => Err(format!("Failed to write stdin: {e}")),
                },
            ))
        }
        _ => None,
    };

    let stdout_reader = child.stdout.take().map(drain_pipe);
    let stderr_reader = child.stderr.take().map(drain_pipe);

    let status = if let Some(limit) = env.timeout {
        let deadline = Instant::now() + Duration::from_secs_f64(limit);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Killing the child closes its pipes; the reader and
                        // writer threads then run to completion and are
                        // discarded along with any partial output.
                        return Ok(ProcessOutcome::TimedOut);
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => return Err(format!("Failed to wait: {e}")),
            }
        }
    } else {
        child.wait().map_err(|e| format!("Failed to wait: {e}"))?
    };

    if let Some(writer) = stdin_writer
        && let Ok(result) = writer.join()
    {
        result?;
    }

    Ok(ProcessOutcome::Exited {
        exit_code: exit_code_of(&status),
        stdout: collect_pipe(stdout_reader),
        stderr: collect_pipe(stderr_reader),
    })
}

fn diagnostics(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Run one test case against the suite-level environment snapshot.
pub fn run_case(
    case: &TestCase,
    suite_env: &ResolvedEnv,
    classname: &str,
    log: Vec<String>,
) -> CaseResult {
    let start = Instant::now();
    let case_env = env::resolve_case(suite_env, case);

    let failed = |message: &str, diags: BTreeMap<String, String>, log: Vec<String>| CaseResult {
        description: case.description.clone(),
        classname: classname.to_string(),
        passed: false,
        message: message.to_string(),
        diagnostics: diags,
        duration: start.elapsed(),
        log,
    };

    if let Some(block) = &case.environment {
        for command in &block.setup {
            if let Err(msg) = run_shell_command(command, &case_env) {
                return failed(
                    "Test case setup command failed",
                    diagnostics(&[("error_type", "ConfigurationError"), ("error", &msg)]),
                    log,
                );
            }
        }
    }

    let mut argv = Vec::with_capacity(1 + case.args.len());
    argv.push(case.command.clone());
    argv.extend(case.args.iter().cloned());

    let outcome = match run_command(&argv, &case_env, case.stdin.as_deref()) {
        Ok(outcome) => outcome,
        Err(e) => {
            return failed(
                &format!("Unexpected error during execution: {e}"),
                BTreeMap::new(),
                log,
            );
        }
    };

    let (exit_code, stdout, stderr) = match outcome {
        ProcessOutcome::TimedOut => {
            let limit = case_env.timeout.unwrap_or_default();
            let details =
                format!("Test case exceeded the specified timeout of {limit} seconds.");
            return failed(
                "Test command timed out",
                diagnostics(&[("error_type", "TimeoutExpired"), ("details", &details)]),
                log,
            );
        }
        ProcessOutcome::NotFound => {
            let suggestion = format!(
                "Ensure <command> '{}' is a valid executable path.",
                case.command
            );
            return failed(
                "Command execution failed",
                diagnostics(&[("suggestion", &suggestion)]),
                log,
            );
        }
        ProcessOutcome::Exited {
            exit_code,
            stdout,
            stderr,
        } => (exit_code, stdout, stderr),
    };

    // Teardown runs before assertions; a failure here fails the case even if
    // the command itself behaved.
    if let Some(block) = &case.environment {
        for command in &block.teardown {
            if let Err(msg) = run_shell_command(command, &case_env) {
                return failed(
                    "Test case teardown command failed",
                    diagnostics(&[("error_type", "ConfigurationError"), ("error", &msg)]),
                    log,
                );
            }
        }
    }

    // Fixed assertion order: stdout, then stderr, then exit code.
    for (name, actual, expectation) in [
        ("stdout", &stdout, &case.expect.stdout),
        ("stderr", &stderr, &case.expect.stderr),
    ] {
        if let Some(expectation) = expectation {
            let cmp = compare::compare(actual, expectation);
            if !cmp.passed {
                return failed(
                    &format!("{name} mismatch"),
                    diagnostics(&[
                        ("reason", &cmp.reason),
                        ("expected", &cmp.normalized_expected),
                        ("got", &cmp.normalized_actual),
                    ]),
                    log,
                );
            }
        }
    }

    // An <expect> block without <exit_code> asserts a clean exit.
    let expected_exit = case.expect.exit_code.unwrap_or(0);
    if exit_code != expected_exit {
        return failed(
            "Exit code mismatch",
            diagnostics(&[
                ("expected", &expected_exit.to_string()),
                ("got", &exit_code.to_string()),
            ]),
            log,
        );
    }

    CaseResult {
        description: case.description.clone(),
        classname: classname.to_string(),
        passed: true,
        message: String::new(),
        diagnostics: BTreeMap::new(),
        duration: start.elapsed(),
        log,
    }
}

/// Run a validated suite: setup, cases in document order, teardown.
pub fn run_suite(suite: &SuiteDefinition, path: &str, verbose: bool) -> SuiteResult {
    let start = Instant::now();
    let mut result = SuiteResult {
        description: suite.description.clone(),
        path: path.to_string(),
        cases: Vec::new(),
        duration: Duration::ZERO,
        error: String::new(),
        log: Vec::new(),
    };

    let ambient = env::ambient_vars();
    let suite_env = env::resolve_suite(&ambient, suite);

    // Suite setup failure short-circuits: no case runs, no teardown.
    if let Some(block) = &suite.environment {
        for command in &block.setup {
            if let Err(msg) = run_shell_command(command, &suite_env) {
                result.error = format!("Suite setup failed: {msg}");
                result.duration = start.elapsed();
                return result;
            }
        }
    }

    for case in &suite.cases {
        let mut log = Vec::new();
        if verbose {
            log.push(format!("# Executing case: {}", case.description));
        }
        result
            .cases
            .push(run_case(case, &suite_env, &suite.description, log));
    }

    // Suite teardown always runs once; failures are logged, not fatal.
    if let Some(block) = &suite.environment {
        for command in &block.teardown {
            if let Err(msg) = run_shell_command(command, &suite_env) {
                result
                    .log
                    .push(format!("Suite teardown command failed: {msg}"));
            }
        }
    }

    result.duration = start.elapsed();
    result
}
