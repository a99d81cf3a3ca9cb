use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, break_};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Resumes the next iteration of an enclosing loop.
#[derive(Parser)]
pub(crate) struct ContinueCommand {
    /// Which enclosing loop to continue.
    #[clap(default_value = "1", allow_hyphen_values = true)]
    count: String,
}

impl BuiltinCommand for ContinueCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        match break_::parse_loop_count(context, self.count.as_str(), "continue")? {
            Some(count) => Ok(BuiltinResult::exit(BuiltinExitCode::ContinueLoop(count))),
            None => Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1))),
        }
    }
}
