use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::pathsearch;
use crate::results::BuiltinExitCode;

/// Manages the command location cache.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct HashCommand {
    /// Forget all cached locations.
    #[arg(short = 'r')]
    reset: bool,

    /// Forget the named commands.
    #[arg(short = 'd')]
    delete: bool,

    /// List cached entries in a re-evaluable form.
    #[arg(short = 'l')]
    list: bool,

    /// Print the cached locations of the named commands.
    #[arg(short = 't')]
    print_paths: bool,

    /// Cache the named commands at this path.
    #[arg(short = 'p', value_name = "PATH")]
    path: Option<PathBuf>,

    names: Vec<String>,
}

impl BuiltinCommand for HashCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        // The location cache is ancillary lookup state, mutated in place.
        if self.reset {
            context.session.program_location_cache.reset();
            return Ok(BuiltinResult::success());
        }

        if self.delete {
            let mut all_found = true;
            for name in &self.names {
                if !context.session.program_location_cache.remove(name.as_str()) {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: hash: {name}: not found")?;
                    all_found = false;
                }
            }
            return Ok(BuiltinResult::exit(if all_found {
                BuiltinExitCode::Success
            } else {
                BuiltinExitCode::Custom(1)
            }));
        }

        if self.names.is_empty() {
            let mut entries: Vec<(String, PathBuf)> = context
                .session
                .program_location_cache
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect();
            entries.sort();

            let mut stdout = context.stdout();
            for (name, path) in entries {
                if self.list {
                    writeln!(stdout, "builtin hash -p {} {name}", path.to_string_lossy())?;
                } else {
                    writeln!(stdout, "{}", path.to_string_lossy())?;
                }
            }
            return Ok(BuiltinResult::success());
        }

        if self.print_paths {
            let mut all_found = true;
            for name in &self.names {
                match context.session.program_location_cache.get(name.as_str()) {
                    Some(path) => {
                        let mut stdout = context.stdout();
                        writeln!(stdout, "{}", path.to_string_lossy())?;
                    }
                    None => {
                        let mut stderr = context.stderr();
                        writeln!(stderr, "husk: hash: {name}: not found")?;
                        all_found = false;
                    }
                }
            }
            return Ok(BuiltinResult::exit(if all_found {
                BuiltinExitCode::Success
            } else {
                BuiltinExitCode::Custom(1)
            }));
        }

        let mut all_found = true;
        for name in &self.names {
            if let Some(path) = &self.path {
                context
                    .session
                    .program_location_cache
                    .set(name.as_str(), path.clone());
                continue;
            }

            let path_value = context
                .session
                .env
                .get_str("PATH")
                .map(|p| p.into_owned())
                .unwrap_or_default();

            match pathsearch::search(path_value.as_str(), name.as_str()) {
                Some(found) => {
                    context
                        .session
                        .program_location_cache
                        .set(name.as_str(), found);
                }
                None => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: hash: {name}: not found")?;
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
