//! Script execution.
//!
//! Runs the configured shell command with trigger metadata injected
//! through environment variables, bounded by a wall-clock timeout.

use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Values a matched message exposes to the triggered script.
///
/// Built fresh for every execution; never shared between runs.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub text: String,
    pub chat_id: String,
    pub sender_id: String,
    pub message_id: String,
    pub matched_text: String,
}

impl TriggerContext {
    /// Environment variables overlaid on the child process.
    fn env_vars(&self) -> [(&'static str, &str); 5] {
        [
            ("TRIGGER_TEXT", self.text.as_str()),
            ("TRIGGER_CHAT_ID", self.chat_id.as_str()),
            ("TRIGGER_SENDER_ID", self.sender_id.as_str()),
            ("TRIGGER_MESSAGE_ID", self.message_id.as_str()),
            ("TRIGGER_MATCHED_TEXT", self.matched_text.as_str()),
        ]
    }
}

/// Outcome of one script execution. Logged by the caller, not persisted.
#[derive(Debug, Clone)]
pub struct ScriptExecutionResult {
    /// Exit code; `None` when the child was killed or never spawned.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
    /// Set when the command could not be spawned at all.
    pub spawn_error: Option<String>,
}

impl ScriptExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.spawn_error.is_none() && self.exit_code == Some(0)
    }
}

/// Runs the configured command in a `bash -lc` child process.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: String,
    command: String,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: "bash".to_string(),
            command: command.into(),
            timeout,
        }
    }

    #[cfg(test)]
    fn with_shell(shell: &str, command: &str, timeout: Duration) -> Self {
        Self {
            shell: shell.to_string(),
            command: command.to_string(),
            timeout,
        }
    }

    /// Execute the command with the trigger variables overlaid on the
    /// inherited environment.
    ///
    /// Trigger values never reach the command line itself, so matched
    /// text cannot inject into the shell. Waits until the child exits or
    /// the timeout elapses; a timed-out child is killed before this
    /// returns. Spawn failures come back inside the result, never as an
    /// error.
    pub async fn run(&self, ctx: &TriggerContext) -> ScriptExecutionResult {
        let started = Instant::now();

        let mut command = Command::new(&self.shell);
        command.arg("-lc").arg(&self.command);
        command.kill_on_drop(true);
        for (key, value) in ctx.env_vars() {
            command.env(key, value);
        }

        debug!(message_id = %ctx.message_id, "spawning script: {}", self.command);
        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => ScriptExecutionResult {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
                elapsed: started.elapsed(),
                spawn_error: None,
            },
            Ok(Err(error)) => ScriptExecutionResult {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
                elapsed: started.elapsed(),
                spawn_error: Some(error.to_string()),
            },
            // Timeout: dropping the output future drops the child handle,
            // and kill_on_drop delivers SIGKILL.
            Err(_) => ScriptExecutionResult {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
                elapsed: started.elapsed(),
                spawn_error: None,
            },
        }
    }
}
