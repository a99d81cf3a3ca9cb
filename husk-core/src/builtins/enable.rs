use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Enables or disables built-ins.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct EnableCommand {
    /// Disable the named built-ins.
    #[arg(short = 'n')]
    disable: bool,

    /// List every built-in, including disabled ones.
    #[arg(short = 'a')]
    all: bool,

    /// List only enabled built-ins.
    #[arg(short = 'p')]
    print: bool,

    names: Vec<String>,
}

impl BuiltinCommand for EnableCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.names.is_empty() || self.print || self.all {
            let mut names: Vec<(String, bool)> = context
                .session
                .builtins
                .iter()
                .map(|(name, registration)| (name.clone(), registration.disabled))
                .collect();
            names.sort();

            let mut stdout = context.stdout();
            for (name, disabled) in names {
                if disabled && !self.all {
                    continue;
                }
                let prefix = if disabled { "enable -n" } else { "enable" };
                writeln!(stdout, "{prefix} {name}")?;
            }
            return Ok(BuiltinResult::success());
        }

        // The registry is configuration, adjusted in place.
        let mut all_found = true;
        for name in &self.names {
            match context.session.builtins.get_mut(name.as_str()) {
                Some(registration) => registration.disabled = self.disable,
                None => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: enable: {name}: not a shell builtin")?;
                    all_found = false;
                }
            }
        }

        Ok(BuiltinResult::exit(if all_found {
            BuiltinExitCode::Success
        } else {
            BuiltinExitCode::Custom(1)
        }))
    }
}
