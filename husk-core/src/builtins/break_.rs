use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Breaks out of enclosing loops.
#[derive(Parser)]
pub(crate) struct BreakCommand {
    /// How many nested loops to break out of.
    #[clap(default_value = "1", allow_hyphen_values = true)]
    count: String,
}

impl BuiltinCommand for BreakCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        match parse_loop_count(context, self.count.as_str(), "break")? {
            Some(count) => Ok(BuiltinResult::exit(BuiltinExitCode::BreakLoop(count))),
            None => Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1))),
        }
    }
}

/// Validates a loop count shared by `break` and `continue`; `None` indicates
/// the diagnostic was already written.
pub(super) fn parse_loop_count(
    context: &mut BuiltinContext<'_>,
    count: &str,
    command: &str,
) -> Result<Option<u8>, Error> {
    let Ok(count) = count.parse::<i64>() else {
        let mut stderr = context.stderr();
        writeln!(stderr, "husk: {command}: {count}: numeric argument required")?;
        return Ok(None);
    };

    if count < 1 {
        let mut stderr = context.stderr();
        writeln!(stderr, "husk: {command}: {count}: loop count out of range")?;
        return Ok(None);
    }

    let depth = context.session.loop_depth;
    if depth == 0 {
        let mut stderr = context.stderr();
        writeln!(
            stderr,
            "husk: {command}: only meaningful in a `for', `while', or `until' loop"
        )?;
        return Ok(None);
    }

    // Requests deeper than the nesting clamp to the outermost loop.
    let count = u8::try_from(count).unwrap_or(u8::MAX).min(depth);
    Ok(Some(count))
}
