use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, outcome_to_exit};
use crate::error::Error;

/// Concatenates its arguments and executes them as a command.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct EvalCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for EvalCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let script = self.args.join(" ");
        if script.trim().is_empty() {
            return Ok(BuiltinResult::success());
        }

        let params = context.params.clone();
        let outcome = context.session.run_string(script.as_str(), &params).await?;

        Ok(BuiltinResult::exit(outcome_to_exit(outcome)))
    }
}
