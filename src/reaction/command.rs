//! External command reactions.
//!
//! The configured command receives three trailing positional arguments:
//! the event name, the target path and the free-form argument string.

use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::ReactionError;
use crate::rules::{CallArgs, CommandTemplate};

/// Outcome of one command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Exit status was zero.
    pub success: bool,
    /// Trimmed stdout on success, trimmed stderr otherwise.
    pub output: String,
}

impl CommandOutcome {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// A resolved command: program plus its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn from_template(template: &CommandTemplate) -> Result<Self, ReactionError> {
        let mut argv = template
            .argv()
            .map_err(|reason| ReactionError::InvalidCommand { reason })?;
        let program = argv.remove(0);

        Ok(Self {
            program,
            args: argv,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for a call, excluding the program.
    pub fn args_for(&self, call: &CallArgs) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(call.positional());
        args
    }

    /// Run the command to completion. Blocks; run it on the worker pool.
    pub fn invoke(&self, call: &CallArgs) -> Result<CommandOutcome, ReactionError> {
        let output = Command::new(&self.program)
            .args(self.args_for(call))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ReactionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let success = output.status.success();
        let stream = if success {
            &output.stdout
        } else {
            &output.stderr
        };

        Ok(CommandOutcome {
            success,
            output: String::from_utf8_lossy(stream).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Event;

    fn call() -> CallArgs {
        CallArgs::new(Event::FileCreated, "/tmp/with space/a.txt", "extra")
    }

    #[test]
    fn test_positional_arguments_are_appended() {
        let line = CommandLine::from_template(&CommandTemplate::Line(
            "notify --tag 'build watcher'".to_string(),
        ))
        .unwrap();

        assert_eq!(line.program(), "notify");
        assert_eq!(
            line.args_for(&call()),
            vec![
                "--tag",
                "build watcher",
                "fileCreated",
                "/tmp/with space/a.txt",
                "extra"
            ]
        );
    }

    #[test]
    fn test_invalid_template() {
        let err = CommandLine::from_template(&CommandTemplate::Argv(Vec::new())).unwrap_err();
        assert!(matches!(err, ReactionError::InvalidCommand { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_captures_stdout() {
        let line = CommandLine::from_template(&CommandTemplate::Argv(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"$0|$1|$2\"".to_string(),
        ]))
        .unwrap();

        let outcome = line.invoke(&call()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, "fileCreated|/tmp/with space/a.txt|extra");
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_captures_stderr_on_failure() {
        let line = CommandLine::from_template(&CommandTemplate::Line(
            "sh -c 'echo nope >&2; exit 3'".to_string(),
        ))
        .unwrap();

        let outcome = line.invoke(&call()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.output, "nope");
    }

    #[test]
    fn test_missing_program() {
        let line = CommandLine::from_template(&CommandTemplate::Line(
            "/nonexistent/fsreact-hook".to_string(),
        ))
        .unwrap();

        assert!(matches!(
            line.invoke(&call()),
            Err(ReactionError::Spawn { .. })
        ));
    }
}
