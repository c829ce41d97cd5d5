use super::AgentInvoker;
use crate::errors::{RefactorError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Runs the Claude CLI in `--print` mode with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    command: String,
    flags: Vec<String>,
    working_dir: PathBuf,
    timeout_secs: u64,
}

impl ClaudeCli {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            command: command.into(),
            flags: Vec::new(),
            working_dir: working_dir.into(),
            timeout_secs,
        }
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// Full argument list: extra words from the configured command, the
    /// configured flags, then `--print`.
    fn args(&self) -> (String, Vec<String>) {
        let mut words = self.command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "claude".to_string());
        let mut args: Vec<String> = words.collect();
        args.extend(self.flags.iter().cloned());
        if !args.iter().any(|a| a == "--print" || a == "-p") {
            args.push("--print".to_string());
        }
        (program, args)
    }
}

#[async_trait]
impl AgentInvoker for ClaudeCli {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let (program, args) = self.args();
        debug!(program = %program, chars = prompt.len(), "Invoking agent");

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RefactorError::AgentFailed(format!("command not found: {}", program))
                } else {
                    RefactorError::AgentFailed(format!("failed to spawn {}: {}", program, e))
                }
            })?;

        // The prompt write shares the deadline: an agent that stops reading
        // would otherwise block us on a full pipe.
        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(prompt.as_bytes()).await {
                    Ok(()) => {}
                    // The agent exited without reading everything; its exit
                    // status tells the rest.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("Agent closed stdin before the whole prompt was written");
                    }
                    Err(e) => {
                        return Err(RefactorError::AgentFailed(format!(
                            "failed to write prompt: {}",
                            e
                        )));
                    }
                }
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| RefactorError::AgentFailed(format!("failed to wait for agent: {}", e)))
        };

        let output = match timeout(Duration::from_secs(self.timeout_secs), run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(secs = self.timeout_secs, "Agent timed out");
                return Err(RefactorError::AgentTimeout {
                    secs: self.timeout_secs,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefactorError::AgentFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(chars = stdout.len(), "Agent response received");
        Ok(stdout)
    }
}
