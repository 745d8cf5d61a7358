//! Host command execution
//!
//! Every script is handed to `bash -eo pipefail -c`, so install steps can be
//! written as ordinary shell snippets and the first failing command (or pipe
//! stage) fails the whole script. Use `|| true` for commands allowed to fail.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ExecError;
use crate::models::CommandOutput;

/// Arguments placed between the shell and the script: errexit, pipefail
pub const STRICT_SHELL_ARGS: [&str; 3] = ["-eo", "pipefail", "-c"];

/// Runs shell scripts on the local host
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `script` to completion and capture its combined output
    async fn run(&self, script: &str) -> Result<CommandOutput, ExecError>;

    /// Run `script`, forwarding each stdout/stderr line to `sink` as soon as
    /// it is read. Returns the exit code.
    ///
    /// A closed `sink` does not stop the command; remaining output is drained
    /// and discarded.
    async fn run_streaming(&self, script: &str, sink: mpsc::Sender<String>) -> Result<i32, ExecError>;
}

/// [`CommandExecutor`] backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }

    fn command(&self, script: &str) -> Command {
        let mut command = Command::new(&self.shell);
        command.args(STRICT_SHELL_ARGS).arg(script).stdin(Stdio::null());
        command
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, script: &str) -> Result<CommandOutput, ExecError> {
        debug!(script = %script, "Running command");
        let output = self.command(script).output().await.map_err(ExecError::Spawn)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }

    async fn run_streaming(&self, script: &str, sink: mpsc::Sender<String>) -> Result<i32, ExecError> {
        debug!(script = %script, "Running streaming command");
        let mut child = self
            .command(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecError::Spawn)?;

        let stdout = child.stdout.take().ok_or(ExecError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecError::MissingPipe("stderr"))?;

        let stdout_task = tokio::spawn(forward_lines(stdout, sink.clone()));
        let stderr_task = tokio::spawn(forward_lines(stderr, sink));

        let status = child.wait().await?;
        // Readers finish once the pipes close
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        Ok(status.code().unwrap_or(-1))
    }
}

// Lines are split on raw bytes; tools may print output that is not UTF-8
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, sink: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                // Receiver may be gone; keep draining so the child never blocks on a full pipe
                let _ = sink.send(line).await;
            }
            Err(err) => {
                debug!(error = %err, "Stopped reading command output");
                break;
            }
        }
    }
}

/// Quotes `value` for safe interpolation into a shell script
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/etc/kubernetes/admin.conf"), "'/etc/kubernetes/admin.conf'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_run_captures_exit_code_and_output() {
        let executor = ShellExecutor::new();
        let output = executor.run("echo hello; echo oops >&2; exit 3").await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.output.contains("hello"));
        assert!(output.output.contains("oops"));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_run_streaming_forwards_each_line() {
        let executor = ShellExecutor::new();
        let (tx, mut rx) = mpsc::channel(16);
        let code = executor
            .run_streaming("echo one; echo two; echo three >&2", tx)
            .await
            .unwrap();
        assert_eq!(code, 0);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn test_run_streaming_survives_dropped_receiver() {
        let executor = ShellExecutor::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let code = executor
            .run_streaming("for i in $(seq 1 50); do echo line $i; done; exit 7", tx)
            .await
            .unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn test_run_streaming_keeps_reading_past_invalid_utf8() {
        let executor = ShellExecutor::new();
        let (tx, mut rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            executor
                .run_streaming(
                    "printf 'caf\\xe9\\n'; for i in $(seq 1 20000); do echo line $i; done; echo finished",
                    tx,
                )
                .await
        });

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(handle.await.unwrap().unwrap(), 0);
        assert_eq!(lines.len(), 20002);
        assert_eq!(lines[0], "caf\u{FFFD}");
        assert_eq!(lines.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test]
    async fn test_failing_command_mid_script_fails_the_script() {
        let executor = ShellExecutor::new();
        let (tx, _rx) = mpsc::channel(16);
        let code = executor
            .run_streaming("apt-get-nonexistent install -y kubelet\necho done", tx)
            .await
            .unwrap();
        assert_eq!(code, 127);

        let output = executor.run("false | cat\necho done").await.unwrap();
        assert!(!output.success());
        assert!(!output.output.contains("done"));

        let output = executor.run("false || true\necho done").await.unwrap();
        assert!(output.success());
        assert_eq!(output.output.trim(), "done");
    }
}
