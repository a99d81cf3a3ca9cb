use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;
use crate::sys;

/// Gets or sets the file creation mask.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct UmaskCommand {
    /// Print symbolically.
    #[arg(short = 'S')]
    symbolic: bool,

    /// The new mask, in octal.
    mask: Option<String>,
}

impl BuiltinCommand for UmaskCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        match &self.mask {
            None => {
                let current = sys::get_umask().bits();
                let mut stdout = context.stdout();
                if self.symbolic {
                    writeln!(stdout, "{}", symbolic_umask(current))?;
                } else {
                    writeln!(stdout, "{current:04o}")?;
                }
                Ok(BuiltinResult::success())
            }
            Some(mask) => {
                let Ok(bits) = u32::from_str_radix(mask.as_str(), 8) else {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: umask: {mask}: octal number expected")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };

                let Some(mode) = nix::sys::stat::Mode::from_bits(bits & 0o777) else {
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                };

                sys::set_umask(mode);
                Ok(BuiltinResult::success())
            }
        }
    }
}

fn symbolic_umask(mask: u32) -> String {
    let permitted = |shift: u32| -> String {
        let bits = (!mask >> shift) & 0o7;
        let mut s = String::new();
        if bits & 0o4 != 0 {
            s.push('r');
        }
        if bits & 0o2 != 0 {
            s.push('w');
        }
        if bits & 0o1 != 0 {
            s.push('x');
        }
        s
    };

    format!(
        "u={},g={},o={}",
        permitted(6),
        permitted(3),
        permitted(0)
    )
}
