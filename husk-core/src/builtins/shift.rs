use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::StateDelta;
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Shifts the positional parameters left.
#[derive(Parser)]
pub(crate) struct ShiftCommand {
    /// How many parameters to discard.
    #[clap(default_value = "1", allow_hyphen_values = true)]
    count: String,
}

impl BuiltinCommand for ShiftCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let Ok(count) = self.count.parse::<i64>() else {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: shift: {}: numeric argument required", self.count)?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        let current = &context.session.positional_params;

        if count < 0 || count as usize > current.len() {
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let mut delta = StateDelta::new();
        #[allow(clippy::cast_sign_loss)]
        let remaining = current[(count as usize)..].to_vec();
        delta.positional = Some(remaining);

        Ok(BuiltinResult::with_delta(delta))
    }
}
