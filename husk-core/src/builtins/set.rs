use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{OptionSetKind, OptionUpdate, StateDelta};
use crate::error::Error;
use crate::escape;
use crate::options::namedoptions;
use crate::results::BuiltinExitCode;

/// Sets option flags and positional parameters.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct SetCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for SetCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.args.is_empty() {
            // With no arguments, print all variables in assignable form.
            let mut entries: Vec<(String, String)> = context
                .session
                .env
                .iter()
                .filter(|(_, var)| !var.is_hidden() && var.value().is_set())
                .map(|(name, var)| (name.clone(), var.value().as_str().into_owned()))
                .collect();
            entries.sort();

            let mut stdout = context.stdout();
            for (name, value) in entries {
                writeln!(
                    stdout,
                    "{name}={}",
                    escape::quote_if_needed(value.as_str(), escape::QuoteMode::SingleQuote)
                )?;
            }
            return Ok(BuiltinResult::success());
        }

        let mut delta = StateDelta::new();
        let mut args = self.args.iter().peekable();
        let mut saw_positional_marker = false;

        while let Some(arg) = args.peek() {
            let arg = arg.as_str();

            match arg {
                "--" => {
                    args.next();
                    saw_positional_marker = true;
                    break;
                }
                "-" => {
                    args.next();
                    saw_positional_marker = true;
                    break;
                }
                "-o" | "+o" => {
                    let enable = arg.starts_with('-');
                    args.next();

                    match args.next() {
                        Some(name) => {
                            if namedoptions::find_set_option(name.as_str()).is_none() {
                                let mut stderr = context.stderr();
                                writeln!(stderr, "husk: set: {name}: invalid option name")?;
                                return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                            }
                            delta.options.push(OptionUpdate {
                                kind: OptionSetKind::Set,
                                name: name.clone(),
                                value: enable,
                            });
                        }
                        None => {
                            // `set -o` alone lists the option settings.
                            let mut stdout = context.stdout();
                            for def in namedoptions::SET_OPTIONS {
                                let state = if (def.get)(&context.session.options) {
                                    "on"
                                } else {
                                    "off"
                                };
                                writeln!(stdout, "{:<15} {state}", def.name)?;
                            }
                            return Ok(BuiltinResult::with_delta(delta));
                        }
                    }
                }
                _ if arg.len() >= 2 && (arg.starts_with('-') || arg.starts_with('+')) => {
                    let enable = arg.starts_with('-');
                    let flags: Vec<char> = arg.chars().skip(1).collect();

                    for flag in flags {
                        let Some(def) = namedoptions::find_set_flag(flag) else {
                            let mut stderr = context.stderr();
                            let sign = if enable { '-' } else { '+' };
                            writeln!(stderr, "husk: set: {sign}{flag}: invalid option")?;
                            return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                        };
                        delta.options.push(OptionUpdate {
                            kind: OptionSetKind::Set,
                            name: def.name.to_owned(),
                            value: enable,
                        });
                    }
                    args.next();
                }
                _ => {
                    saw_positional_marker = true;
                    break;
                }
            }
        }

        let remaining: Vec<String> = args.cloned().collect();
        if saw_positional_marker || !remaining.is_empty() {
            delta.positional = Some(remaining);
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}
