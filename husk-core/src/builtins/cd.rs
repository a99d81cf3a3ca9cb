use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use normalize_path::NormalizePath;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::StateDelta;
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Changes the working directory.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct CdCommand {
    /// Follow symlinks logically (the default).
    #[arg(short = 'L')]
    #[allow(dead_code)]
    logical: bool,

    /// Resolve symlinks physically.
    #[arg(short = 'P')]
    physical: bool,

    /// The target directory; `-` means `$OLDPWD`.
    #[clap(allow_hyphen_values = true)]
    target: Option<String>,
}

impl BuiltinCommand for CdCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut print_target = false;

        let target: PathBuf = match self.target.as_deref() {
            None | Some("~") => match context.session.env.get_str("HOME") {
                Some(home) => PathBuf::from(home.into_owned()),
                None => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: cd: HOME not set")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }
            },
            Some("-") => match context.session.env.get_str("OLDPWD") {
                Some(oldpwd) => {
                    print_target = true;
                    PathBuf::from(oldpwd.into_owned())
                }
                None => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: cd: OLDPWD not set")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }
            },
            Some(target) => {
                match resolve_against_cdpath(context, target) {
                    Some((path, came_from_cdpath)) => {
                        print_target = came_from_cdpath;
                        path
                    }
                    None => PathBuf::from(target),
                }
            }
        };

        let resolved = if target.is_absolute() {
            target.normalize()
        } else {
            context.session.working_dir.join(target).normalize()
        };

        let resolved = if self.physical {
            resolved.canonicalize().unwrap_or(resolved)
        } else {
            resolved
        };

        if !resolved.is_dir() {
            let mut stderr = context.stderr();
            writeln!(
                stderr,
                "husk: cd: {}: No such file or directory",
                self.target.as_deref().unwrap_or("")
            )?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        if print_target {
            let mut stdout = context.stdout();
            writeln!(stdout, "{}", resolved.to_string_lossy())?;
        }

        let mut delta = StateDelta::new();
        delta.working_dir = Some(resolved);

        Ok(BuiltinResult::with_delta(delta))
    }
}

/// Searches `$CDPATH` for a relative target; returns the resolved path and
/// whether it came from a non-empty CDPATH entry (which cd reports).
fn resolve_against_cdpath(
    context: &BuiltinContext<'_>,
    target: &str,
) -> Option<(PathBuf, bool)> {
    if target.starts_with('/') || target.starts_with('.') {
        return None;
    }

    let cdpath = context.session.env.get_str("CDPATH")?.into_owned();

    for entry in cdpath.split(':') {
        if entry.is_empty() {
            continue;
        }

        let candidate = Path::new(entry).join(target);
        if candidate.is_dir() {
            return Some((candidate, true));
        }
    }

    None
}
