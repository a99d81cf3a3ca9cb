use std::io::Write;

use clap::Parser;
use itertools::Itertools;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{StateDelta, TrapUpdate};
use crate::error::Error;
use crate::escape;
use crate::results::BuiltinExitCode;
use crate::traps::TrapCondition;

/// Traps signals and other conditions.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct TrapCommand {
    /// List signal names and numbers.
    #[arg(short = 'l')]
    list_signals: bool,

    /// Print registered handlers in a re-evaluable form.
    #[arg(short = 'p')]
    print_handlers: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for TrapCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.list_signals {
            let mut stdout = context.stdout();
            let listed = TrapCondition::iterator()
                .filter_map(|condition| {
                    condition.signal_number().map(|number| (number, condition))
                })
                .sorted_by_key(|(number, _)| *number)
                .map(|(number, condition)| format!("{number}) {condition}"))
                .join("\n");
            writeln!(stdout, "{listed}")?;
            return Ok(BuiltinResult::success());
        }

        if self.print_handlers || self.args.is_empty() {
            let mut stdout = context.stdout();

            if self.args.is_empty() {
                for (condition, handler) in context
                    .session
                    .traps
                    .iter_handlers()
                    .sorted_by_key(|(condition, _)| condition.to_string())
                {
                    writeln!(stdout, "{}", format_handler(condition, handler))?;
                }
            } else {
                for arg in &self.args {
                    let condition: TrapCondition = arg.parse()?;
                    if let Some(handler) = context.session.traps.get_handler(condition) {
                        writeln!(stdout, "{}", format_handler(condition, handler))?;
                    }
                }
            }

            return Ok(BuiltinResult::success());
        }

        let mut delta = StateDelta::new();

        // A single argument resets; `-` resets explicitly; anything else is
        // a handler followed by condition names.
        let (handler, conditions) = if self.args.len() == 1 {
            (None, &self.args[..])
        } else if self.args[0] == "-" {
            (None, &self.args[1..])
        } else {
            (Some(self.args[0].clone()), &self.args[1..])
        };

        for name in conditions {
            let condition: TrapCondition = match name.parse() {
                Ok(condition) => condition,
                Err(e) => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: trap: {e}")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }
            };

            match &handler {
                Some(handler) => {
                    delta
                        .traps
                        .push(TrapUpdate::Register(condition, handler.clone()));
                }
                None => delta.traps.push(TrapUpdate::Reset(condition)),
            }
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}

fn format_handler(condition: TrapCondition, handler: &str) -> String {
    format!(
        "trap -- {} {condition}",
        escape::force_quote(handler, escape::QuoteMode::SingleQuote)
    )
}
