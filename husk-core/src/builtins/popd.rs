use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, dirs};
use crate::delta::StateDelta;
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Pops the directory stack (and changes to the new top).
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct PopdCommand {
    /// Manipulate the stack without changing directory.
    #[arg(short = 'n')]
    no_change_dir: bool,

    /// A `+N`/`-N` entry to remove instead of the top.
    #[clap(allow_hyphen_values = true)]
    rotation: Option<String>,
}

impl BuiltinCommand for PopdCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if context.session.dir_stack.is_empty() {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: popd: directory stack empty")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let mut combined: Vec<PathBuf> = vec![context.session.working_dir.clone()];
        combined.extend(context.session.dir_stack.iter().cloned());

        let remove_at = match self.rotation.as_deref() {
            None => 0,
            Some(rotation) => {
                let index = dirs::parse_rotation(rotation)
                    .and_then(|r| dirs::rotation_to_index(r, combined.len()));
                let Some(index) = index else {
                    let mut stderr = context.stderr();
                    writeln!(
                        stderr,
                        "husk: popd: {rotation}: directory stack index out of range"
                    )?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };
                index
            }
        };

        combined.remove(remove_at);

        let mut delta = StateDelta::new();
        if !self.no_change_dir {
            delta.working_dir = Some(combined[0].clone());
        }
        delta.dir_stack = Some(combined[1..].to_vec());

        let mut stdout = context.stdout();
        writeln!(stdout, "{}", dirs::format_stack(&combined, " "))?;

        Ok(BuiltinResult::with_delta(delta))
    }
}
