use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;

/// Returns a successful status.
#[derive(Parser)]
pub(crate) struct TrueCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    #[allow(dead_code)]
    args: Vec<String>,
}

impl BuiltinCommand for TrueCommand {
    async fn execute(&self, _context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        Ok(BuiltinResult::success())
    }
}
