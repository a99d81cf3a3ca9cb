use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{AliasUpdate, StateDelta};
use crate::error::Error;
use crate::escape;
use crate::results::BuiltinExitCode;

/// Defines or displays aliases.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct AliasCommand {
    /// Print all aliases in a re-evaluable form.
    #[arg(short = 'p')]
    print: bool,

    args: Vec<String>,
}

impl BuiltinCommand for AliasCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();
        let mut any_missing = false;

        if self.print || self.args.is_empty() {
            let mut stdout = context.stdout();
            for (name, replacement) in &context.session.aliases {
                writeln!(stdout, "alias {name}={}", quote_replacement(replacement))?;
            }
            return Ok(BuiltinResult::success());
        }

        for arg in &self.args {
            match arg.split_once('=') {
                Some((name, replacement)) => {
                    delta
                        .aliases
                        .push(AliasUpdate::Set(name.to_owned(), replacement.to_owned()));
                }
                None => match context.session.aliases.get(arg.as_str()) {
                    Some(replacement) => {
                        let mut stdout = context.stdout();
                        writeln!(stdout, "alias {arg}={}", quote_replacement(replacement))?;
                    }
                    None => {
                        let mut stderr = context.stderr();
                        writeln!(stderr, "husk: alias: {arg}: not found")?;
                        any_missing = true;
                    }
                },
            }
        }

        Ok(BuiltinResult {
            exit: if any_missing {
                BuiltinExitCode::Custom(1)
            } else {
                BuiltinExitCode::Success
            },
            delta,
        })
    }
}

fn quote_replacement(replacement: &str) -> String {
    escape::force_quote(replacement, escape::QuoteMode::SingleQuote)
}
