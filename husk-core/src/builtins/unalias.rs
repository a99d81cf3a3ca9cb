use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{AliasUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Removes aliases.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct UnaliasCommand {
    /// Remove every alias.
    #[arg(short = 'a')]
    all: bool,

    names: Vec<String>,
}

impl BuiltinCommand for UnaliasCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();

        if self.all {
            delta.aliases.push(AliasUpdate::Clear);
            return Ok(BuiltinResult::with_delta(delta));
        }

        let mut any_missing = false;
        for name in &self.names {
            if context.session.aliases.contains_key(name.as_str()) {
                delta.aliases.push(AliasUpdate::Remove(name.clone()));
            } else {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: unalias: {name}: not found")?;
                any_missing = true;
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
