use std::io::Write;

use clap::Parser;

use crate::arithmetic;
use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Evaluates arithmetic expressions; succeeds when the last is non-zero.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct LetCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    expressions: Vec<String>,
}

impl BuiltinCommand for LetCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut last_value = 0;

        for expression in &self.expressions {
            let params = context.params.clone();
            match arithmetic::expand_and_eval(context.session, &params, expression.as_str()).await
            {
                Ok(value) => last_value = value,
                Err(e) => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: let: {e}")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }
            }
        }

        let exit = if last_value == 0 {
            BuiltinExitCode::Custom(1)
        } else {
            BuiltinExitCode::Success
        };
        Ok(BuiltinResult::exit(exit))
    }
}
