use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Returns an unsuccessful status.
#[derive(Parser)]
pub(crate) struct FalseCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    #[allow(dead_code)]
    args: Vec<String>,
}

impl BuiltinCommand for FalseCommand {
    async fn execute(&self, _context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)))
    }
}
