use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Returns from the enclosing function or sourced script.
#[derive(Parser)]
pub(crate) struct ReturnCommand {
    /// The return code; defaults to the last command's status.
    #[clap(allow_hyphen_values = true)]
    code: Option<String>,
}

impl BuiltinCommand for ReturnCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if context.session.call_stack.is_empty() {
            let mut stderr = context.stderr();
            writeln!(
                stderr,
                "husk: return: can only `return' from a function or sourced script"
            )?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let code = match &self.code {
            Some(code) => match code.parse::<i64>() {
                #[allow(clippy::cast_sign_loss)]
                Ok(n) => (n.rem_euclid(256)) as u8,
                Err(_) => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: return: {code}: numeric argument required")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                }
            },
            None => context.session.last_exit_status,
        };

        Ok(BuiltinResult::exit(
            BuiltinExitCode::ReturnFromFunctionOrScript(code),
        ))
    }
}
