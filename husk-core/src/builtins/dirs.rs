use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::StateDelta;
use crate::error::Error;

/// Displays the directory stack.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct DirsCommand {
    /// Clear the stack.
    #[arg(short = 'c')]
    clear: bool,

    /// Print full paths without tilde abbreviation.
    #[arg(short = 'l')]
    long: bool,

    /// Print one entry per line.
    #[arg(short = 'p')]
    per_line: bool,

    /// Print one entry per line, with indices.
    #[arg(short = 'v')]
    verbose: bool,
}

impl BuiltinCommand for DirsCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.clear {
            let mut delta = StateDelta::new();
            delta.dir_stack = Some(vec![]);
            return Ok(BuiltinResult::with_delta(delta));
        }

        let mut combined: Vec<PathBuf> = vec![context.session.working_dir.clone()];
        combined.extend(context.session.dir_stack.iter().cloned());

        let home = context.session.env.get_str("HOME").map(|h| h.into_owned());

        let render = |path: &PathBuf| -> String {
            let text = path.to_string_lossy().to_string();
            if self.long {
                return text;
            }
            match &home {
                Some(home) if text.starts_with(home.as_str()) => {
                    format!("~{}", &text[home.len()..])
                }
                _ => text,
            }
        };

        let mut stdout = context.stdout();
        if self.verbose {
            for (i, path) in combined.iter().enumerate() {
                writeln!(stdout, "{i:>2}  {}", render(path))?;
            }
        } else if self.per_line {
            for path in &combined {
                writeln!(stdout, "{}", render(path))?;
            }
        } else {
            let rendered: Vec<String> = combined.iter().map(render).collect();
            writeln!(stdout, "{}", rendered.join(" "))?;
        }

        Ok(BuiltinResult::success())
    }
}

/// A parsed `+N` / `-N` stack rotation.
#[derive(Clone, Copy, Debug)]
pub(super) enum Rotation {
    /// Counted from the top of the stack.
    FromTop(usize),
    /// Counted from the bottom of the stack.
    FromBottom(usize),
}

pub(super) fn parse_rotation(arg: &str) -> Option<Rotation> {
    if let Some(n) = arg.strip_prefix('+') {
        n.parse().ok().map(Rotation::FromTop)
    } else if let Some(n) = arg.strip_prefix('-') {
        n.parse().ok().map(Rotation::FromBottom)
    } else {
        None
    }
}

/// Translates a rotation to an index into the combined stack (0 = cwd).
pub(super) fn rotation_to_index(rotation: Rotation, len: usize) -> Option<usize> {
    match rotation {
        Rotation::FromTop(n) => (n < len).then_some(n),
        Rotation::FromBottom(n) => len.checked_sub(n + 1),
    }
}

pub(super) fn format_stack(combined: &[PathBuf], separator: &str) -> String {
    combined
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
