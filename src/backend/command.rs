//! Thin wrapper over `std::process::Command` for the CLI-driven transports.

use std::process::Command;
use tracing::trace;

use super::error::BackendError;

/// Exit status and combined stdout/stderr of a finished program.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    program: String,
    args: Vec<String>,
    pub success: bool,
    status: String,
    pub text: String,
}

impl CommandOutput {
    /// The combined output on success, a [`BackendError::Command`] otherwise.
    pub fn into_result(self) -> Result<String, BackendError> {
        if self.success {
            Ok(self.text)
        } else {
            Err(BackendError::Command {
                program: self.program,
                args: self.args.join(" "),
                status: self.status,
                output: self.text.trim().to_string(),
            })
        }
    }
}

/// Run `program` to completion and capture everything it printed.
pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput, BackendError> {
    trace!(program, ?args, "running");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| BackendError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CommandOutput {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        success: output.status.success(),
        status: output.status.to_string(),
        text,
    })
}
