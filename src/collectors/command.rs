use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },
    #[error("failed waiting for `{command}`: {message}")]
    Wait { command: String, message: String },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("`{command}` exited with code {code}: {stderr}")]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Runs a shell command and hands back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, limit: Duration) -> Result<String, CommandError>;
}

#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, limit: Duration) -> Result<String, CommandError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout also reaches the pipeline's children.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|err| CommandError::Spawn {
            command: command.to_string(),
            message: err.to_string(),
        })?;
        let pid = child.id();

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|err| CommandError::Wait {
                command: command.to_string(),
                message: err.to_string(),
            })?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    secs: limit.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(CommandError::Exit {
                command: command.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %err, "failed to kill probe process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
