use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Reports the context of the current call.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct CallerCommand {
    /// The 0-based frame to describe.
    #[clap(allow_hyphen_values = true)]
    frame: Option<String>,
}

impl BuiltinCommand for CallerCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if context.session.call_stack.is_empty() {
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let depth = match self.frame.as_deref() {
            None => None,
            Some(text) => match text.parse::<i64>() {
                Ok(n) if n >= 0 => Some(n as usize),
                _ => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: caller: {text}: invalid frame number")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                }
            },
        };

        let source_name = |depth: usize| -> String {
            // The frame's caller is the next frame out, or the main script.
            context
                .session
                .call_stack
                .get(depth + 1)
                .map_or_else(|| String::from("main"), |frame| frame.name.clone())
        };

        let file_name = context
            .session
            .session_name
            .clone()
            .unwrap_or_else(|| String::from("husk"));

        match depth {
            None => {
                let Some(frame) = context.session.call_stack.top() else {
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };
                let mut stdout = context.stdout();
                writeln!(stdout, "{} {file_name}", frame.call_line)?;
            }
            Some(depth) => {
                let Some(frame) = context.session.call_stack.get(depth) else {
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };
                let mut stdout = context.stdout();
                writeln!(
                    stdout,
                    "{} {} {file_name}",
                    frame.call_line,
                    source_name(depth)
                )?;
            }
        }

        Ok(BuiltinResult::success())
    }
}
