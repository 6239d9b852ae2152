//! Helpers for running child processes with timeouts and bounded output.
//!
//! External scripts (file generators, import scripts, LIMS lookups, sendmail)
//! are always invoked as argv vectors. A non-zero exit is an error value that
//! still carries everything the child printed, so callers can forward it to
//! the operator.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Captured output of a child that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// stdout followed by stderr, for ticket comments and emails.
    pub fn combined_text(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {exit_code:?} after {duration:?}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        duration: Duration,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Whatever the child printed before failing (empty for spawn errors).
    pub fn output_text(&self) -> String {
        match self {
            Self::Failed { stdout, stderr, .. } => combine(stdout, stderr),
            _ => String::new(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(stderr));
    }
    text
}

/// A fully described child-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Build a spec from an argv vector (`argv[0]` is the program).
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: None,
            stdin: None,
            timeout,
        })
    }

    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            stdin: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Shell-like rendering for logs and operator emails.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Abstraction over child-process execution.
///
/// Production code uses [`SystemRunner`]; tests use a scripted runner that
/// records invocations without spawning anything.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    pub output_limit_bytes: usize,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }
        run_command(
            &spec.program,
            cmd,
            spec.stdin.as_deref(),
            spec.timeout,
            self.output_limit_bytes,
        )
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// A non-zero exit status is returned as [`ProcessError::Failed`] with the captured output.
#[instrument(skip_all, fields(program = program, timeout_secs = timeout.as_secs()))]
pub fn run_command(
    program: &str,
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput, ProcessError> {
    let io_err = |source: std::io::Error| ProcessError::Io {
        program: program.to_string(),
        source,
    };

    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(ProcessError::Spawn {
                program: program.to_string(),
                source: e,
            });
        }
    };

    if let Some(input) = stdin
        && let Some(mut child_stdin) = child.stdin.take()
    {
        child_stdin.write_all(input).map_err(io_err)?;
        // Dropping closes the pipe so the child sees EOF.
    }

    let stdout = child.stdout.take().ok_or_else(|| {
        io_err(std::io::Error::other("stdout was not piped"))
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        io_err(std::io::Error::other("stderr was not piped"))
    })?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let status = match child.wait_timeout(timeout).map_err(io_err)? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().map_err(io_err)?;
            child.wait().map_err(io_err)?;
            return Err(ProcessError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
    };
    let duration = start.elapsed();

    let (stdout, stdout_truncated) = join_output(stdout_handle).map_err(io_err)?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).map_err(io_err)?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), duration_ms = duration.as_millis() as u64, "command finished");
    if !status.success() {
        return Err(ProcessError::Failed {
            program: program.to_string(),
            exit_code: status.code(),
            stdout,
            stderr,
            duration,
        });
    }

    Ok(ProcessOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        duration,
    })
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
) -> std::io::Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::other("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", Duration::from_secs(10)).args(["-c", script])
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = SystemRunner::default()
            .run(&sh("printf 'hello'"))
            .expect("run");
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout_text(), "hello");
    }

    #[test]
    fn non_zero_exit_keeps_output() {
        let err = SystemRunner::default()
            .run(&sh("echo partial; echo oops >&2; exit 3"))
            .expect_err("should fail");
        assert_eq!(err.exit_code(), Some(3));
        let text = err.output_text();
        assert!(text.contains("partial"));
        assert!(text.contains("oops"));
    }

    #[test]
    fn feeds_stdin() {
        let spec = CommandSpec::new("cat", Duration::from_secs(10)).stdin("piped input");
        let out = SystemRunner::default().run(&spec).expect("run");
        assert_eq!(out.stdout_text(), "piped input");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let spec = CommandSpec::new("/nonexistent/definitely-missing", Duration::from_secs(1));
        let err = SystemRunner::default().run(&spec).expect_err("spawn");
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn slow_command_times_out() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("5");
        let err = SystemRunner::default().run(&spec).expect_err("timeout");
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[test]
    fn output_is_bounded() {
        let runner = SystemRunner {
            output_limit_bytes: 4,
        };
        let out = runner.run(&sh("printf '0123456789'")).expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }
}
