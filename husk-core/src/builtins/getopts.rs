use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{StateDelta, VarUpdate};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Parses positional parameters as single-character options.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct GetoptsCommand {
    /// The option specification.
    optstring: String,

    /// The variable receiving each option character.
    variable_name: String,

    /// Arguments to parse; defaults to the positional parameters.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for GetoptsCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        // Map each option char to whether it takes an argument.
        let mut takes_arg = std::collections::HashMap::new();
        let mut silent_errors = false;
        let mut prev_char: Option<char> = None;

        for c in self.optstring.chars() {
            if c == ':' {
                match prev_char {
                    Some(prev) => {
                        takes_arg.insert(prev, true);
                        continue;
                    }
                    None => {
                        silent_errors = true;
                        continue;
                    }
                }
            }
            takes_arg.insert(c, false);
            prev_char = Some(c);
        }

        let args: Vec<String> = if self.args.is_empty() {
            context.session.positional_params.clone()
        } else {
            self.args.clone()
        };

        let mut next_index: usize = context
            .session
            .env
            .get_str("OPTIND")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        if next_index < 1 {
            return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
        }

        let mut delta = StateDelta::new();

        let finish = |delta: &mut StateDelta,
                          var_value: String,
                          optarg: Option<String>,
                          optind: usize,
                          exit: BuiltinExitCode| {
            delta
                .vars
                .push(VarUpdate::scalar(self.variable_name.clone(), var_value));
            match optarg {
                Some(value) => delta.vars.push(VarUpdate::scalar("OPTARG", value)),
                None => delta.vars.push(VarUpdate::Unset {
                    name: "OPTARG".into(),
                }),
            }
            delta
                .vars
                .push(VarUpdate::scalar("OPTIND", optind.to_string()));
            BuiltinResult {
                exit: exit.into(),
                delta: std::mem::take(delta),
            }
        };

        // Out of arguments, or the next one isn't an option?
        let Some(current) = args.get(next_index - 1) else {
            return Ok(finish(
                &mut delta,
                "?".into(),
                None,
                next_index,
                BuiltinExitCode::Custom(1),
            ));
        };

        if current == "--" {
            return Ok(finish(
                &mut delta,
                "?".into(),
                None,
                next_index + 1,
                BuiltinExitCode::Custom(1),
            ));
        }

        if !current.starts_with('-') || current == "-" {
            return Ok(finish(
                &mut delta,
                "?".into(),
                None,
                next_index,
                BuiltinExitCode::Custom(1),
            ));
        }

        // This implementation consumes one option per argument word.
        let option_char = current.chars().nth(1).unwrap_or('?');
        let inline_arg: Option<String> = if current.len() > 2 {
            Some(current[2..].to_owned())
        } else {
            None
        };

        match takes_arg.get(&option_char).copied() {
            Some(true) => {
                let (optarg, consumed) = match inline_arg {
                    Some(inline) => (Some(inline), 1),
                    None => match args.get(next_index) {
                        Some(next) => (Some(next.clone()), 2),
                        None => {
                            if !silent_errors {
                                let mut stderr = context.stderr();
                                writeln!(
                                    stderr,
                                    "husk: getopts: option requires an argument -- {option_char}"
                                )?;
                            }
                            return Ok(finish(
                                &mut delta,
                                if silent_errors { ":".into() } else { "?".into() },
                                silent_errors.then(|| option_char.to_string()),
                                next_index + 1,
                                BuiltinExitCode::Success,
                            ));
                        }
                    },
                };

                next_index += consumed;
                Ok(finish(
                    &mut delta,
                    option_char.to_string(),
                    optarg,
                    next_index,
                    BuiltinExitCode::Success,
                ))
            }
            Some(false) => {
                next_index += 1;
                Ok(finish(
                    &mut delta,
                    option_char.to_string(),
                    None,
                    next_index,
                    BuiltinExitCode::Success,
                ))
            }
            None => {
                if !silent_errors {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: getopts: illegal option -- {option_char}")?;
                }
                next_index += 1;
                Ok(finish(
                    &mut delta,
                    "?".into(),
                    silent_errors.then(|| option_char.to_string()),
                    next_index,
                    BuiltinExitCode::Success,
                ))
            }
        }
    }
}
