//! External command helper for units
//!
//! Commands are split on whitespace and executed directly, without a shell.
//! Children stay in the caller's process group, so when a unit is killed at
//! the timeout everything it launched goes with it. Unless input is given,
//! stdin is inherited so terminal queries such as `stty size` still work.

use std::io::Write;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum output length to keep per stream
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Buffered result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Full command that was executed
    pub command: String,
    pub stdout: String,
    /// Whether stdout was cut at the size limit
    pub stdout_truncated: bool,
    pub stderr: String,
    /// `None` when the command was ended by a signal
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// (stdout, stderr, exit code)
    pub fn into_parts(self) -> (String, String, Option<i32>) {
        (self.stdout, self.stderr, self.exit_code)
    }
}

/// A running command whose output is read incrementally
pub struct StreamingCommand {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub child: Child,
}

impl StreamingCommand {
    /// Wait for exit; `None` when ended by a signal
    pub fn wait(mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.wait()?.code())
    }
}

fn build(cmd: &str) -> std::io::Result<Command> {
    let mut parts = cmd.split_whitespace();
    let program = parts.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;
    let mut command = Command::new(program);
    command.args(parts);
    Ok(command)
}

fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let truncated = bytes.len() > MAX_OUTPUT_BYTES;
    let slice = if truncated {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };

    let output = String::from_utf8_lossy(slice).to_string();
    (output, truncated)
}

fn run(cmd: &str, input: Option<&[u8]>) -> std::io::Result<CommandOutput> {
    let start = Instant::now();
    debug!("Executing command: {}", cmd);

    let mut child = build(cmd)?
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Input is written while output is collected, so a child that writes
    // before it finishes reading cannot fill both pipes and stall
    let stdin = child.stdin.take();
    let output = thread::scope(|scope| {
        if let (Some(bytes), Some(mut stdin)) = (input, stdin) {
            scope.spawn(move || {
                // A child that exits without reading its input is not an error here
                if let Err(e) = stdin.write_all(bytes) {
                    debug!("Command {} did not take its input: {}", cmd, e);
                }
            });
        }
        child.wait_with_output()
    })?;
    let (stdout, stdout_truncated) = truncate_output(&output.stdout);
    let (stderr, _) = truncate_output(&output.stderr);

    debug!("Command: {}, had a stdout of: {}", cmd, stdout);
    if !stderr.is_empty() {
        warn!("Command: {}, had a stderr of: {}", cmd, stderr);
    }

    Ok(CommandOutput {
        command: cmd.to_string(),
        stdout,
        stdout_truncated,
        stderr,
        exit_code: output.status.code(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run a command to completion and capture its output
pub fn shell_call(cmd: &str) -> std::io::Result<CommandOutput> {
    run(cmd, None)
}

/// Run a command with `input` on its stdin
pub fn shell_call_with_input(cmd: &str, input: &[u8]) -> std::io::Result<CommandOutput> {
    run(cmd, Some(input))
}

/// Start a command and hand back its output handles
pub fn shell_stream(cmd: &str) -> std::io::Result<StreamingCommand> {
    debug!("Not printing output since command being streamed: {}", cmd);

    let mut child = build(cmd)?
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured")
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stderr not captured")
    })?;

    Ok(StreamingCommand {
        stdout,
        stderr,
        child,
    })
}
