use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;
use crate::testexpr;

/// Evaluates a conditional expression.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct TestCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for TestCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut args = self.args.clone();

        // When invoked as `[`, the final argument must be `]`.
        if context.command_name == "[" {
            match args.pop() {
                Some(last) if last == "]" => (),
                _ => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: [: missing `]'")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                }
            }
        }

        let expr = match husk_parser::test_command::parse(args.as_slice()) {
            Ok(expr) => expr,
            Err(_) => {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: {}: syntax error", context.command_name)?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
            }
        };

        let result = testexpr::eval_test_expr(&expr, context.session)?;
        Ok(BuiltinResult::exit(if result {
            BuiltinExitCode::Success
        } else {
            BuiltinExitCode::Custom(1)
        }))
    }
}
