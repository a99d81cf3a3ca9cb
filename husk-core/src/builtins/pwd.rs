use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;

/// Prints the working directory.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct PwdCommand {
    /// Print the logical path (the default).
    #[arg(short = 'L')]
    #[allow(dead_code)]
    logical: bool,

    /// Print the physical path, with symlinks resolved.
    #[arg(short = 'P')]
    physical: bool,
}

impl BuiltinCommand for PwdCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let dir = if self.physical {
            context
                .session
                .working_dir
                .canonicalize()
                .unwrap_or_else(|_| context.session.working_dir.clone())
        } else {
            context.session.working_dir.clone()
        };

        let mut stdout = context.stdout();
        writeln!(stdout, "{}", dir.to_string_lossy())?;

        Ok(BuiltinResult::success())
    }
}
