use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::pathsearch;
use crate::results::BuiltinExitCode;

const KEYWORDS: &[&str] = &[
    "!", "{", "}", "case", "do", "done", "elif", "else", "esac", "fi", "for", "function", "if",
    "in", "then", "until", "while", "[[", "]]",
];

/// Describes how a name would be interpreted as a command.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct TypeCommand {
    /// Print every interpretation, not just the first.
    #[arg(short = 'a')]
    all: bool,

    /// Print only a single word describing the kind.
    #[arg(short = 't')]
    kind_only: bool,

    /// Print only the path that would be executed.
    #[arg(short = 'p')]
    path_only: bool,

    names: Vec<String>,
}

impl BuiltinCommand for TypeCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut all_found = true;

        for name in &self.names {
            let interpretations = interpret(context, name.as_str(), self.all);

            if interpretations.is_empty() {
                if !self.kind_only && !self.path_only {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: type: {name}: not found")?;
                }
                all_found = false;
                continue;
            }

            let mut stdout = context.stdout();
            for interpretation in interpretations {
                match &interpretation {
                    Interpretation::Alias(replacement) => {
                        if self.kind_only {
                            writeln!(stdout, "alias")?;
                        } else if !self.path_only {
                            writeln!(stdout, "{name} is aliased to `{replacement}'")?;
                        }
                    }
                    Interpretation::Keyword => {
                        if self.kind_only {
                            writeln!(stdout, "keyword")?;
                        } else if !self.path_only {
                            writeln!(stdout, "{name} is a shell keyword")?;
                        }
                    }
                    Interpretation::Function => {
                        if self.kind_only {
                            writeln!(stdout, "function")?;
                        } else if !self.path_only {
                            writeln!(stdout, "{name} is a function")?;
                        }
                    }
                    Interpretation::Builtin => {
                        if self.kind_only {
                            writeln!(stdout, "builtin")?;
                        } else if !self.path_only {
                            writeln!(stdout, "{name} is a shell builtin")?;
                        }
                    }
                    Interpretation::File(path) => {
                        if self.kind_only {
                            writeln!(stdout, "file")?;
                        } else if self.path_only {
                            writeln!(stdout, "{}", path.to_string_lossy())?;
                        } else {
                            writeln!(stdout, "{name} is {}", path.to_string_lossy())?;
                        }
                    }
                }
            }
        }

        let exit = if all_found {
            BuiltinExitCode::Success
        } else {
            BuiltinExitCode::Custom(1)
        };
        Ok(BuiltinResult::exit(exit))
    }
}

enum Interpretation {
    Alias(String),
    Keyword,
    Function,
    Builtin,
    File(std::path::PathBuf),
}

fn interpret(context: &BuiltinContext<'_>, name: &str, all: bool) -> Vec<Interpretation> {
    let mut found = vec![];

    if let Some(replacement) = context.session.aliases.get(name) {
        found.push(Interpretation::Alias(replacement.clone()));
        if !all {
            return found;
        }
    }

    if KEYWORDS.contains(&name) {
        found.push(Interpretation::Keyword);
        if !all {
            return found;
        }
    }

    if context.session.funcs.contains(name) {
        found.push(Interpretation::Function);
        if !all {
            return found;
        }
    }

    if context
        .session
        .builtins
        .get(name)
        .is_some_and(|b| !b.disabled)
    {
        found.push(Interpretation::Builtin);
        if !all {
            return found;
        }
    }

    let path_value = context
        .session
        .env
        .get_str("PATH")
        .map(|p| p.into_owned())
        .unwrap_or_default();

    if all {
        for path in pathsearch::search_all(path_value.as_str(), name) {
            found.push(Interpretation::File(path));
        }
    } else if let Some(path) = pathsearch::search(path_value.as_str(), name) {
        found.push(Interpretation::File(path));
    }

    found
}

/// Renders a one-line description for `command -v` / `command -V`.
pub(super) fn describe_command(
    context: &BuiltinContext<'_>,
    name: &str,
    verbose: bool,
) -> Option<String> {
    let interpretations = interpret(context, name, false);
    let first = interpretations.first()?;

    let description = match first {
        Interpretation::Alias(replacement) => {
            if verbose {
                format!("{name} is aliased to `{replacement}'")
            } else {
                format!("alias {name}='{replacement}'")
            }
        }
        Interpretation::Keyword => {
            if verbose {
                format!("{name} is a shell keyword")
            } else {
                name.to_owned()
            }
        }
        Interpretation::Function => {
            if verbose {
                format!("{name} is a function")
            } else {
                name.to_owned()
            }
        }
        Interpretation::Builtin => {
            if verbose {
                format!("{name} is a shell builtin")
            } else {
                name.to_owned()
            }
        }
        Interpretation::File(path) => {
            if verbose {
                format!("{name} is {}", path.to_string_lossy())
            } else {
                path.to_string_lossy().to_string()
            }
        }
    };

    Some(description)
}
