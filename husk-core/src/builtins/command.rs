use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, type_};
use crate::commands::{self, CommandArg};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Runs a command, bypassing function lookup.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct CommandCommand {
    /// Describe the command instead of running it.
    #[arg(short = 'v')]
    describe: bool,

    /// Describe the command verbosely.
    #[arg(short = 'V')]
    describe_verbosely: bool,

    /// Use a default PATH.
    #[arg(short = 'p')]
    #[allow(dead_code)]
    use_default_path: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for CommandCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let Some(name) = self.args.first().cloned() else {
            return Ok(BuiltinResult::success());
        };

        if self.describe || self.describe_verbosely {
            let mut found_all = true;
            for name in &self.args {
                let description =
                    type_::describe_command(context, name.as_str(), self.describe_verbosely);
                match description {
                    Some(description) => {
                        let mut stdout = context.stdout();
                        writeln!(stdout, "{description}")?;
                    }
                    None => {
                        if self.describe_verbosely {
                            let mut stderr = context.stderr();
                            writeln!(stderr, "husk: command: {name}: not found")?;
                        }
                        found_all = false;
                    }
                }
            }

            let exit = if found_all {
                BuiltinExitCode::Success
            } else {
                BuiltinExitCode::Custom(1)
            };
            return Ok(BuiltinResult::exit(exit));
        }

        let args: Vec<CommandArg> = self
            .args
            .iter()
            .map(|a| CommandArg::String(a.clone()))
            .collect();

        let params = context.params.clone();
        let spawn_result =
            commands::execute(context.session, &params, name, args, false).await?;
        let outcome = spawn_result.wait().await?;

        Ok(BuiltinResult::exit(crate::builtins::outcome_to_exit(
            outcome,
        )))
    }
}
