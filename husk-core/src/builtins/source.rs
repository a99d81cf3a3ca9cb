use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult, outcome_to_exit};
use crate::error::Error;
use crate::results::{BuiltinExitCode, Unwind};

/// Reads and executes a file in the current session.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct SourceCommand {
    /// The file to source.
    path: String,

    /// Positional parameters for the sourced script.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for SourceCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let resolved = self.resolve_path(context);

        let contents = match std::fs::read_to_string(resolved.as_path()) {
            Ok(contents) => contents,
            Err(e) => {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: {}: {}: {e}", context.command_name, self.path)?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
            }
        };

        // Skip a shebang line; the file executes in this session regardless.
        let contents = contents
            .strip_prefix("#!")
            .map_or(contents.as_str(), |rest| {
                rest.split_once('\n').map_or("", |(_, rest)| rest)
            });

        let positional = if self.args.is_empty() {
            None
        } else {
            Some(self.args.clone())
        };

        // A synthetic frame makes `caller`/`FUNCNAME` see the sourced file;
        // variable scoping is untouched.
        context
            .session
            .enter_sourced_script(resolved.clone(), positional);

        let params = context.params.clone();
        let result = context.session.run_string(contents, &params).await;

        context.session.leave_sourced_script(&params).await?;

        let mut outcome = result?;

        // `return` in a sourced file unwinds to the source site.
        if matches!(outcome.unwind, Unwind::Return) {
            outcome.unwind = Unwind::None;
        }

        Ok(BuiltinResult::exit(outcome_to_exit(outcome)))
    }
}

impl SourceCommand {
    fn resolve_path(&self, context: &BuiltinContext<'_>) -> PathBuf {
        let path = PathBuf::from(self.path.as_str());

        if path.is_absolute() || self.path.contains('/') {
            return path;
        }

        // Bare names search $PATH under `sourcepath`, then the working dir.
        if context.session.options.sourcepath {
            if let Some(path_value) = context.session.env.get_str("PATH") {
                if let Some(found) = pathsearch_any(path_value.as_ref(), self.path.as_str()) {
                    return found;
                }
            }
        }

        context.session.working_dir.join(path)
    }
}

// `source` accepts non-executable files, so only existence is checked.
fn pathsearch_any(paths: &str, name: &str) -> Option<PathBuf> {
    for dir in paths.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = std::path::Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}
