// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shell-backed command runner
//!
//! Runs `<console-command> <command> <args>` through `sh -c` inside the
//! capsule directory. The child gets the capsule as its working directory;
//! the current process never changes its own.
//!
//! Argument values may hold secrets, so the rendered line is logged at
//! `debug` only and never placed in error messages.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::command::{
    render_invocation, validate_invocation, CommandArgs, CommandContext, CommandOutput, CommandRunner,
};
use crate::domain::error::CapsuleError;

/// Exit code reported when the process was terminated by a signal
pub const SIGNAL_EXIT_CODE: i32 = -1;

pub struct ShellCommandRunner {
    console_command: String,
}

impl ShellCommandRunner {
    pub fn new(console_command: impl Into<String>) -> Self {
        Self {
            console_command: console_command.into(),
        }
    }

    pub fn console_command(&self) -> &str {
        &self.console_command
    }

    /// Full shell line for one invocation
    pub fn command_line(&self, command: &str, args: &CommandArgs) -> String {
        let invocation = render_invocation(command, args);
        if self.console_command.is_empty() {
            invocation
        } else {
            format!("{} {}", self.console_command, invocation)
        }
    }
}

async fn read_lines<R>(stream: Option<R>, capsule_id: &str, label: &str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(stream) = stream else {
        return Ok(collected);
    };

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        debug!("[{}] {}: {}", capsule_id, label, line);
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(
        &self,
        context: &CommandContext,
        command: &str,
        args: &CommandArgs,
    ) -> Result<CommandOutput, CapsuleError> {
        validate_invocation(command, args)?;
        let line = self.command_line(command, args);
        info!("Running '{}' in capsule {}", command, context.capsule_id);
        debug!("Command line: {}", line);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(&context.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapsuleError::Command(format!("Failed to spawn '{}': {}", command, e)))?;

        let capsule_id = context.capsule_id.as_str();
        let (stdout, stderr) = tokio::try_join!(
            read_lines(child.stdout.take(), capsule_id, "stdout"),
            read_lines(child.stderr.take(), capsule_id, "stderr"),
        )
        .map_err(|e| CapsuleError::Command(format!("Failed to read output of '{}': {}", command, e)))?;

        let status = child
            .wait()
            .await
            .map_err(|e| CapsuleError::Command(format!("Failed to wait for '{}': {}", command, e)))?;

        let exit_code = status.code().unwrap_or(SIGNAL_EXIT_CODE);
        debug!("Command '{}' exited with {}", command, exit_code);

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}
