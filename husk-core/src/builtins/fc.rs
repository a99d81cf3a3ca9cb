use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, outcome_to_exit};
use crate::delta::{HistoryUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Lists or re-executes history entries.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct FcCommand {
    /// List entries instead of editing.
    #[arg(short = 'l')]
    list: bool,

    /// Omit entry numbers when listing.
    #[arg(short = 'n')]
    no_numbers: bool,

    /// List in reverse order.
    #[arg(short = 'r')]
    reverse: bool,

    /// Re-execute a command, optionally substituting OLD=NEW.
    #[arg(short = 's')]
    substitute: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for FcCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.list {
            return self.execute_list(context);
        }

        if self.substitute {
            return self.execute_substitute(context).await;
        }

        // Interactive editor mode is not part of an embeddable session.
        let mut stderr = context.stderr();
        writeln!(stderr, "husk: fc: interactive editing is not supported")?;
        Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)))
    }
}

impl FcCommand {
    fn execute_list(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let entries: Vec<(usize, String)> = context
            .session
            .history
            .iter()
            .map(|entry| (entry.number, entry.command.clone()))
            .collect();

        // Default range: the last 16 entries.
        let range_start = self.args.first().and_then(|a| a.parse::<usize>().ok());
        let range_end = self.args.get(1).and_then(|a| a.parse::<usize>().ok());

        let mut selected: Vec<&(usize, String)> = entries
            .iter()
            .filter(|(number, _)| {
                range_start.is_none_or(|start| *number >= start)
                    && range_end.is_none_or(|end| *number <= end)
            })
            .collect();

        if range_start.is_none() && range_end.is_none() {
            let keep = selected.len().saturating_sub(16);
            selected.drain(..keep);
        }

        if self.reverse {
            selected.reverse();
        }

        let mut stdout = context.stdout();
        for (number, command) in selected {
            if self.no_numbers {
                writeln!(stdout, "\t{command}")?;
            } else {
                writeln!(stdout, "{number}\t{command}")?;
            }
        }

        Ok(BuiltinResult::success())
    }

    async fn execute_substitute(
        &self,
        context: &mut BuiltinContext<'_>,
    ) -> Result<BuiltinResult, Error> {
        // Arguments: [OLD=NEW] [command-prefix]
        let mut replacement: Option<(String, String)> = None;
        let mut prefix: Option<String> = None;

        for arg in &self.args {
            if replacement.is_none() && arg.contains('=') && prefix.is_none() {
                if let Some((old, new)) = arg.split_once('=') {
                    replacement = Some((old.to_owned(), new.to_owned()));
                    continue;
                }
            }
            prefix = Some(arg.clone());
        }

        let found = {
            let mut found = None;
            for entry in context.session.history.iter().rev() {
                let matches = match &prefix {
                    Some(prefix) => entry.command.starts_with(prefix.as_str()),
                    None => true,
                };
                if matches {
                    found = Some(entry.command.clone());
                    break;
                }
            }
            found
        };

        let Some(mut command) = found else {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: fc: no command found")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        if let Some((old, new)) = replacement {
            command = command.replacen(old.as_str(), new.as_str(), 1);
        }

        // Echo the command being re-run, the way fc -s does.
        {
            let mut stdout = context.stdout();
            writeln!(stdout, "{command}")?;
        }

        let params = context.params.clone();
        let outcome = context.session.run_string(command.as_str(), &params).await?;

        let mut delta = StateDelta::new();
        delta.history.push(HistoryUpdate::Append(command));

        Ok(BuiltinResult {
            exit: outcome_to_exit(outcome),
            delta,
        })
    }
}
