use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Exits the current run.
#[derive(Parser)]
pub(crate) struct ExitCommand {
    /// The exit code; defaults to the last command's status.
    #[clap(allow_hyphen_values = true)]
    code: Option<String>,
}

impl BuiltinCommand for ExitCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let code = match &self.code {
            Some(code) => match code.parse::<i64>() {
                #[allow(clippy::cast_sign_loss)]
                Ok(n) => (n.rem_euclid(256)) as u8,
                Err(_) => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: exit: {code}: numeric argument required")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::ExitSession(2)));
                }
            },
            None => context.session.last_exit_status,
        };

        Ok(BuiltinResult::exit(BuiltinExitCode::ExitSession(code)))
    }
}
