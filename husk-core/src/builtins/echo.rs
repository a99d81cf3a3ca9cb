use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::escape;

/// Writes arguments to standard output.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct EchoCommand {
    /// Suppress the trailing newline.
    #[arg(short = 'n')]
    no_trailing_newline: bool,

    /// Interpret backslash escapes.
    #[arg(short = 'e')]
    interpret_escapes: bool,

    /// Do not interpret backslash escapes.
    #[arg(short = 'E')]
    no_interpret_escapes: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for EchoCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let interpret_escapes = (self.interpret_escapes
            || context.session.options.xpg_echo)
            && !self.no_interpret_escapes;

        let mut trailing_newline = !self.no_trailing_newline;
        let mut output: Vec<u8> = vec![];

        if interpret_escapes {
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    output.push(b' ');
                }

                let (expanded, keep_going) =
                    escape::expand_backslash_escapes(arg.as_str(), escape::EscapeMode::EchoBuiltin)?;
                output.extend_from_slice(expanded.as_slice());

                if !keep_going {
                    trailing_newline = false;
                    break;
                }
            }
        } else {
            output.extend_from_slice(self.args.join(" ").as_bytes());
        }

        if trailing_newline {
            output.push(b'\n');
        }

        let mut stdout = context.stdout();
        stdout.write_all(output.as_slice())?;
        stdout.flush()?;

        Ok(BuiltinResult::success())
    }
}
