use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::patterns::Pattern;
use crate::results::BuiltinExitCode;

/// Displays information about built-ins.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct HelpCommand {
    /// Print a short description per built-in.
    #[arg(short = 'd')]
    descriptions: bool,

    /// Print usage synopses only.
    #[arg(short = 's')]
    short_usage: bool,

    /// Glob patterns selecting built-ins.
    patterns: Vec<String>,
}

impl BuiltinCommand for HelpCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut entries: Vec<(String, &'static str)> = context
            .session
            .builtins
            .iter()
            .filter(|(_, registration)| !registration.disabled)
            .map(|(name, registration)| (name.clone(), registration.short_description))
            .collect();
        entries.sort();

        let selected: Vec<(String, &'static str)> = if self.patterns.is_empty() {
            entries
        } else {
            let mut selected = vec![];
            for (name, description) in entries {
                for pattern in &self.patterns {
                    let matches = Pattern::from(pattern.as_str())
                        .exactly_matches(name.as_str())
                        .unwrap_or(false);
                    if matches || pattern == &name {
                        selected.push((name, description));
                        break;
                    }
                }
            }
            selected
        };

        if selected.is_empty() {
            let mut stderr = context.stderr();
            writeln!(
                stderr,
                "husk: help: no help topics match `{}'",
                self.patterns.join(" ")
            )?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let mut stdout = context.stdout();
        for (name, description) in selected {
            if self.short_usage {
                writeln!(stdout, "{name}")?;
            } else if self.descriptions {
                writeln!(stdout, "{name} - {description}")?;
            } else {
                writeln!(stdout, "{name}: {description}")?;
            }
        }

        Ok(BuiltinResult::success())
    }
}
