use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{OptionSetKind, OptionUpdate, StateDelta};
use crate::error::Error;
use crate::options::namedoptions;
use crate::results::BuiltinExitCode;

/// Sets and unsets shell options.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct ShoptCommand {
    /// Enable the named options.
    #[arg(short = 's')]
    set: bool,

    /// Disable the named options.
    #[arg(short = 'u')]
    unset: bool,

    /// Suppress output; the exit status reports whether all are enabled.
    #[arg(short = 'q')]
    quiet: bool,

    /// Print options in a re-evaluable form.
    #[arg(short = 'p')]
    print: bool,

    /// Operate on `set -o` options instead.
    #[arg(short = 'o')]
    set_o_options: bool,

    names: Vec<String>,
}

impl ShoptCommand {
    fn lookup(&self, name: &str) -> Option<&'static namedoptions::OptionDefinition> {
        if self.set_o_options {
            namedoptions::find_set_option(name)
        } else {
            namedoptions::find_shopt_option(name)
        }
    }

    fn table(&self) -> &'static [namedoptions::OptionDefinition] {
        if self.set_o_options {
            namedoptions::SET_OPTIONS
        } else {
            namedoptions::SHOPT_OPTIONS
        }
    }
}

impl BuiltinCommand for ShoptCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let kind = if self.set_o_options {
            OptionSetKind::Set
        } else {
            OptionSetKind::Shopt
        };

        // Changing options.
        if self.set || self.unset {
            if self.set && self.unset {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: shopt: cannot set and unset options together")?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
            }

            let mut delta = StateDelta::new();
            for name in &self.names {
                if self.lookup(name.as_str()).is_none() {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: shopt: {name}: invalid shell option name")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }

                delta.options.push(OptionUpdate {
                    kind,
                    name: name.clone(),
                    value: self.set,
                });
            }

            return Ok(BuiltinResult::with_delta(delta));
        }

        // Querying options.
        let mut all_enabled = true;
        let mut any_invalid = false;
        let mut stdout = context.stdout();

        if self.names.is_empty() {
            for def in self.table() {
                let enabled = (def.get)(&context.session.options);
                if !self.quiet {
                    print_option(&mut stdout, self.print, self.set_o_options, def.name, enabled)?;
                }
                all_enabled = all_enabled && enabled;
            }
        } else {
            for name in &self.names {
                match self.lookup(name.as_str()) {
                    Some(def) => {
                        let enabled = (def.get)(&context.session.options);
                        if !self.quiet {
                            print_option(
                                &mut stdout,
                                self.print,
                                self.set_o_options,
                                def.name,
                                enabled,
                            )?;
                        }
                        all_enabled = all_enabled && enabled;
                    }
                    None => {
                        let mut stderr = context.stderr();
                        writeln!(stderr, "husk: shopt: {name}: invalid shell option name")?;
                        any_invalid = true;
                    }
                }
            }
        }

        let exit = if any_invalid || !all_enabled {
            BuiltinExitCode::Custom(1)
        } else {
            BuiltinExitCode::Success
        };

        Ok(BuiltinResult::exit(exit))
    }
}

fn print_option(
    stdout: &mut impl Write,
    reevaluable: bool,
    set_o: bool,
    name: &str,
    enabled: bool,
) -> Result<(), Error> {
    if reevaluable {
        let command = if set_o { "set" } else { "shopt" };
        let flag = match (set_o, enabled) {
            (true, true) => "-o",
            (true, false) => "+o",
            (false, true) => "-s",
            (false, false) => "-u",
        };
        writeln!(stdout, "{command} {flag} {name}")?;
    } else {
        let state = if enabled { "on" } else { "off" };
        writeln!(stdout, "{name}\t{state}")?;
    }

    Ok(())
}
