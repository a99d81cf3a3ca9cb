use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use normalize_path::NormalizePath;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, dirs};
use crate::delta::StateDelta;
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Pushes a directory onto the directory stack (and changes to it).
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct PushdCommand {
    /// Manipulate the stack without changing directory.
    #[arg(short = 'n')]
    no_change_dir: bool,

    /// The directory to push, or a `+N`/`-N` rotation.
    #[clap(allow_hyphen_values = true)]
    target: Option<String>,
}

impl BuiltinCommand for PushdCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();

        // The conceptual stack starts with the working directory.
        let mut combined: Vec<PathBuf> = vec![context.session.working_dir.clone()];
        combined.extend(context.session.dir_stack.iter().cloned());

        match self.target.as_deref() {
            None => {
                // Swap the top two entries.
                if combined.len() < 2 {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: pushd: no other directory")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }
                combined.swap(0, 1);
            }
            Some(rotation) if dirs::parse_rotation(rotation).is_some() => {
                #[allow(clippy::unwrap_used)]
                let index = dirs::rotation_to_index(
                    dirs::parse_rotation(rotation).unwrap(),
                    combined.len(),
                );
                let Some(index) = index else {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: pushd: {rotation}: directory stack index out of range")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };
                combined.rotate_left(index);
            }
            Some(target) => {
                let path = PathBuf::from(target);
                let resolved = if path.is_absolute() {
                    path.normalize()
                } else {
                    context.session.working_dir.join(path).normalize()
                };

                if !resolved.is_dir() {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: pushd: {target}: No such file or directory")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }

                combined.insert(0, resolved);
            }
        }

        if !self.no_change_dir {
            delta.working_dir = Some(combined[0].clone());
        }
        delta.dir_stack = Some(combined[1..].to_vec());

        // Report the resulting stack the way `dirs` does.
        let mut stdout = context.stdout();
        writeln!(stdout, "{}", dirs::format_stack(&combined, " "))?;

        Ok(BuiltinResult::with_delta(delta))
    }
}
