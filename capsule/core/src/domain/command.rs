// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console commands executed inside a capsule
//!
//! Argument rendering is part of the domain because its shape is observable:
//! `--key` options become `--key=value`, positional names become
//! `name value`, and flags render bare. Values are always shell-escaped.
//! The command name and argument keys are emitted verbatim, so they must be
//! plain words; [`validate_invocation`] rejects anything else before a shell
//! ever sees it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::capsule::CapsuleId;
use crate::domain::error::CapsuleError;

/// Value of a single command argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgValue {
    /// Present without a value (`--force`)
    Flag,
    Value(String),
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

/// Ordered command arguments
///
/// Keys are trusted literals such as `--force` or `name`; only values may
/// carry caller-supplied data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    args: Vec<(String, ArgValue)>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.args.push((key.into(), ArgValue::Flag));
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), ArgValue::Value(value.into())));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) {
        self.args.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|(key, _)| key.as_str())
    }

    /// Render each argument as a shell-safe segment
    pub fn render(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|(key, value)| match value {
                ArgValue::Flag => key.clone(),
                ArgValue::Value(v) if key.starts_with("--") => format!("{}={}", key, escape(v)),
                ArgValue::Value(v) => format!("{} {}", key, escape(v)),
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for CommandArgs
where
    K: Into<String>,
    V: Into<ArgValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Self::new();
        for (key, value) in iter {
            args.push(key, value);
        }
        args
    }
}

fn escape(value: &str) -> String {
    // NUL cannot be passed through argv and is the only input try_quote rejects
    let value: String = value.chars().filter(|c| *c != '\0').collect();
    match shlex::try_quote(&value) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => String::new(),
    }
}

fn is_plain_word(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '/'))
}

/// Reject a command name or argument key that is not a plain word
pub fn validate_invocation(command: &str, args: &CommandArgs) -> Result<(), CapsuleError> {
    if !is_plain_word(command) {
        return Err(CapsuleError::Command(format!("Invalid command name {:?}", command)));
    }
    if let Some(key) = args.keys().find(|key| !is_plain_word(key)) {
        return Err(CapsuleError::Command(format!(
            "Invalid argument key {:?} for '{}'",
            key, command
        )));
    }
    Ok(())
}

/// `<command> <args...>`, the part appended to the console prefix
pub fn render_invocation(command: &str, args: &CommandArgs) -> String {
    let mut line = command.to_string();
    for segment in args.render() {
        line.push(' ');
        line.push_str(&segment);
    }
    line
}

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub capsule_id: CapsuleId,
    /// Working directory for the command
    pub working_dir: PathBuf,
}

/// Result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code; -1 when terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes console commands inside a capsule
///
/// A non-zero exit code is reported in [`CommandOutput`], not as an error.
/// Errors mean the command could not be run at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        context: &CommandContext,
        command: &str,
        args: &CommandArgs,
    ) -> Result<CommandOutput, CapsuleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_and_option_rendering() {
        let args = CommandArgs::new().flag("--seed").value("--env", "prod");
        assert_eq!(render_invocation("migrate", &args), "migrate --seed --env=prod");
    }

    #[test]
    fn test_positional_rendering() {
        let args = CommandArgs::new().value("name", "users");
        assert_eq!(render_invocation("make:model", &args), "make:model name users");
    }

    #[test]
    fn test_values_are_escaped() {
        let args = CommandArgs::new()
            .value("--message", "hello world")
            .value("path", "$(rm -rf /)");
        let rendered = args.render();
        assert_eq!(
            shlex::split(&rendered[0]).unwrap(),
            vec!["--message=hello world".to_string()]
        );
        assert_eq!(
            shlex::split(&rendered[1]).unwrap(),
            vec!["path".to_string(), "$(rm -rf /)".to_string()]
        );
    }

    #[test]
    fn test_nul_bytes_are_dropped() {
        let args = CommandArgs::new().value("--name", "a\0b");
        assert_eq!(args.render(), vec!["--name=ab"]);
    }

    #[test]
    fn test_from_iterator_keeps_order() {
        let args: CommandArgs = vec![("--b", ArgValue::Flag), ("--a", ArgValue::from("1"))]
            .into_iter()
            .collect();
        assert_eq!(args.render(), vec!["--b", "--a=1"]);
    }

    #[test]
    fn test_plain_commands_and_keys_validate() {
        let args = CommandArgs::new()
            .flag("--force")
            .value("--path", "x y")
            .value("name", "users")
            .value("--queue_name", "default");
        assert!(validate_invocation("make:model", &args).is_ok());
        assert!(validate_invocation("queue:work", &CommandArgs::new()).is_ok());
    }

    #[test]
    fn test_shell_syntax_in_command_or_key_is_rejected() {
        let plain = CommandArgs::new();
        for command in ["", "migrate; rm -rf /", "$(id)", "list|sh", "a b"] {
            assert!(
                matches!(validate_invocation(command, &plain), Err(CapsuleError::Command(_))),
                "accepted command {:?}",
                command
            );
        }

        for key in ["--x;rm", "--env=prod", "`id`", "", "--a b"] {
            let args = CommandArgs::new().flag(key);
            assert!(
                matches!(validate_invocation("migrate", &args), Err(CapsuleError::Command(_))),
                "accepted key {:?}",
                key
            );
        }
    }

    #[test]
    fn test_no_args() {
        assert!(CommandArgs::new().is_empty());
        assert_eq!(render_invocation("list", &CommandArgs::new()), "list");
    }
}
