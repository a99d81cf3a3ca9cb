use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;

/// Does nothing, successfully.
#[derive(Parser)]
pub(crate) struct ColonCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    #[allow(dead_code)]
    args: Vec<String>,
}

impl BuiltinCommand for ColonCommand {
    async fn execute(&self, _context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        Ok(BuiltinResult::success())
    }
}
