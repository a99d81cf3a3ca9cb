use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::commands::CommandArg;
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Runs a built-in directly, bypassing functions of the same name.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct BuiltinCommandCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for BuiltinCommandCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let Some(name) = self.args.first() else {
            return Ok(BuiltinResult::success());
        };

        let Some(registration) = context.session.builtins.get(name.as_str()).cloned() else {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: builtin: {name}: not a shell builtin")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        if registration.disabled {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: builtin: {name}: not a shell builtin")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let inner_context = BuiltinContext {
            session: &mut *context.session,
            command_name: name.clone(),
            params: context.params.clone(),
        };

        let args: Vec<CommandArg> = self
            .args
            .iter()
            .map(|a| CommandArg::String(a.clone()))
            .collect();

        (registration.execute_fn)(inner_context, args).await
    }
}
