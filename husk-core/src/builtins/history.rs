use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{HistoryUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Displays or edits the command history.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct HistoryCommand {
    /// Clear the history.
    #[arg(short = 'c')]
    clear: bool,

    /// Delete the entry at this offset (negative counts from the end).
    #[arg(short = 'd', value_name = "OFFSET", allow_hyphen_values = true)]
    delete_offset: Option<i64>,

    /// Append this entry without executing it.
    #[arg(short = 's', value_name = "ENTRY")]
    append: Option<String>,

    /// Show only the last N entries.
    count: Option<usize>,
}

impl BuiltinCommand for HistoryCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();

        if self.clear {
            delta.history.push(HistoryUpdate::Clear);
            return Ok(BuiltinResult::with_delta(delta));
        }

        if let Some(offset) = self.delete_offset {
            // Validate up front so the failure is reported synchronously.
            if context.session.history.clone().delete_at_offset(offset).is_err() {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: history: {offset}: history position out of range")?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
            }

            delta.history.push(HistoryUpdate::Delete(offset));
            return Ok(BuiltinResult::with_delta(delta));
        }

        if let Some(entry) = &self.append {
            delta.history.push(HistoryUpdate::Append(entry.clone()));
            return Ok(BuiltinResult::with_delta(delta));
        }

        let entries: Vec<_> = context.session.history.iter().collect();
        let start = match self.count {
            Some(count) => entries.len().saturating_sub(count),
            None => 0,
        };

        let mut stdout = context.stdout();
        for entry in &entries[start..] {
            writeln!(stdout, "{:5}  {}", entry.number, entry.command)?;
        }

        Ok(BuiltinResult::success())
    }
}
