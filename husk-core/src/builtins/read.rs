use std::io::{Read as _, Write};

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{StateDelta, VarUpdate};
use crate::error::Error;
use crate::openfiles::OpenFile;
use crate::results::BuiltinExitCode;
use crate::variables::{ArrayLiteral, ValueLiteral};

/// Reads a line of input into variables.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct ReadCommand {
    /// Read fields into this indexed array.
    #[arg(short = 'a', value_name = "NAME")]
    array_variable: Option<String>,

    /// Use this delimiter instead of newline.
    #[arg(short = 'd', value_name = "DELIM")]
    delimiter: Option<String>,

    /// Stop after this many characters.
    #[arg(short = 'n', value_name = "N")]
    max_chars: Option<usize>,

    /// Read exactly this many characters, ignoring the delimiter.
    #[arg(short = 'N', value_name = "N")]
    exact_chars: Option<usize>,

    /// Display this prompt before reading.
    #[arg(short = 'p', value_name = "PROMPT")]
    prompt: Option<String>,

    /// Raw mode: backslash is not an escape character.
    #[arg(short = 'r')]
    raw_mode: bool,

    /// Do not echo input (meaningful only on terminals).
    #[arg(short = 's')]
    #[allow(dead_code)]
    silent: bool,

    /// Fail if input does not arrive within this many seconds.
    #[arg(short = 't', value_name = "TIMEOUT")]
    timeout_secs: Option<f64>,

    /// Read from this file descriptor instead of standard input.
    #[arg(short = 'u', value_name = "FD")]
    fd: Option<u32>,

    /// Variables to receive the fields.
    variable_names: Vec<String>,
}

impl BuiltinCommand for ReadCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if let Some(prompt) = &self.prompt {
            let mut stderr = context.stderr();
            write!(stderr, "{prompt}")?;
            stderr.flush()?;
        }

        let fd = self.fd.unwrap_or(0);
        let input = context.params.fd(fd).or_else(|| {
            // FDs registered mid-run (e.g. by coproc) live in the session
            // table rather than this command's snapshot.
            context
                .session
                .open_files
                .get(fd)
                .and_then(|f| f.try_dup().ok())
        });
        let Some(mut input) = input else {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: read: {fd}: invalid file descriptor")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        if let Some(timeout) = self.timeout_secs {
            if !poll_readable(&input, timeout)? {
                // Timed out: bash reports a status greater than 128.
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(142)));
            }
        }

        let delimiter = resolve_delimiter(self.exact_chars, self.delimiter.as_deref());
        let limit = self.exact_chars.or(self.max_chars);

        let (text, saw_eof) = read_until(&mut input, delimiter, limit, self.raw_mode)?;

        if saw_eof && text.is_empty() {
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let mut delta = StateDelta::new();

        if let Some(array_name) = &self.array_variable {
            let fields = split_fields(text.as_str(), context.session.ifs().as_str(), None);
            delta.vars.push(VarUpdate::Set {
                name: array_name.clone(),
                value: Some(ValueLiteral::Array(ArrayLiteral(
                    fields.into_iter().map(|f| (None, f)).collect(),
                ))),
                append: false,
                scope: crate::delta::VarScope::Global,
                add_attrs: vec![],
                remove_attrs: vec![],
                make_indexed: true,
                make_associative: false,
            });
        } else if self.variable_names.is_empty() {
            delta.vars.push(VarUpdate::scalar("REPLY", text));
        } else {
            // The split is capped at the variable count so the last variable
            // receives the raw remainder, intervening separators intact.
            let mut fields = split_fields(
                text.as_str(),
                context.session.ifs().as_str(),
                Some(self.variable_names.len()),
            );

            for name in &self.variable_names {
                let value = if fields.is_empty() {
                    String::new()
                } else {
                    fields.remove(0)
                };

                delta.vars.push(VarUpdate::scalar(name.clone(), value));
            }
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}

/// Resolves the record delimiter: `-N` reads regardless of delimiters, and
/// an explicitly empty `-d` argument means NUL-delimited input.
fn resolve_delimiter(exact_chars: Option<usize>, delimiter: Option<&str>) -> Option<char> {
    match (exact_chars, delimiter) {
        (Some(_), _) => None,
        (None, Some("")) => Some('\0'),
        (None, Some(d)) => d.chars().next(),
        (None, None) => Some('\n'),
    }
}

/// Reads up to the delimiter (or a length limit), handling backslash
/// continuation unless raw mode is on. Returns the text plus whether EOF was
/// reached.
fn read_until(
    input: &mut OpenFile,
    delimiter: Option<char>,
    limit: Option<usize>,
    raw_mode: bool,
) -> Result<(String, bool), Error> {
    let mut text = String::new();
    let mut saw_eof = false;
    let mut escaped = false;

    loop {
        if let Some(limit) = limit {
            if text.chars().count() >= limit {
                break;
            }
        }

        let mut byte = [0u8; 1];
        match input.read(&mut byte) {
            Ok(0) => {
                saw_eof = true;
                break;
            }
            Ok(_) => (),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        let c = byte[0] as char;

        if escaped {
            escaped = false;
            if c != '\n' {
                text.push(c);
            }
            continue;
        }

        if !raw_mode && c == '\\' {
            escaped = true;
            continue;
        }

        if delimiter == Some(c) {
            break;
        }

        text.push(c);
    }

    Ok((text, saw_eof))
}

fn poll_readable(input: &OpenFile, timeout_secs: f64) -> Result<bool, Error> {
    use std::os::fd::AsFd;

    let mut fds = [nix::poll::PollFd::new(
        input.as_fd(),
        nix::poll::PollFlags::POLLIN,
    )];

    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = (timeout_secs * 1000.0).max(0.0) as i32;
    let timeout =
        nix::poll::PollTimeout::try_from(timeout_ms).unwrap_or(nix::poll::PollTimeout::MAX);
    let ready = nix::poll::poll(&mut fds, timeout)?;

    Ok(ready > 0)
}

/// Splits input into fields per IFS, collapsing runs of IFS whitespace. With
/// `max_fields`, splitting stops once all but the last field are filled; the
/// last field is the raw remainder with its internal separators preserved
/// (and trailing IFS whitespace trimmed).
pub(super) fn split_fields(text: &str, ifs: &str, max_fields: Option<usize>) -> Vec<String> {
    if ifs.is_empty() {
        return vec![text.to_owned()];
    }

    let mut fields = vec![];
    let mut current = String::new();

    for (idx, c) in text.char_indices() {
        if let Some(max) = max_fields {
            if fields.len() + 1 == max && !ifs.contains(c) {
                let remainder = text[idx..]
                    .trim_end_matches(|c: char| ifs.contains(c) && c.is_whitespace());
                fields.push(remainder.to_owned());
                return fields;
            }
        }

        if ifs.contains(c) {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        fields.push(current);
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn field_splitting() {
        assert_eq!(split_fields("a b  c", " \t\n", None), ["a", "b", "c"]);
        assert_eq!(split_fields("", " \t\n", None), Vec::<String>::new());
        assert_eq!(split_fields("one", "", None), ["one"]);
    }

    #[test]
    fn bounded_split_keeps_remainder_verbatim() {
        // `read x y` on irregular whitespace: the last variable gets the
        // remainder with its internal separators intact.
        assert_eq!(split_fields("a  b   c", " \t\n", Some(2)), ["a", "b   c"]);
        assert_eq!(split_fields("  a  b  ", " \t\n", Some(1)), ["a  b"]);
        assert_eq!(split_fields("a:b::c", ":", Some(2)), ["a", "b::c"]);

        // Fewer fields than variables leaves the cap unreached.
        assert_eq!(split_fields("a b", " \t\n", Some(3)), ["a", "b"]);
    }

    #[test]
    fn empty_delimiter_means_nul() {
        assert_eq!(resolve_delimiter(None, Some("")), Some('\0'));
        assert_eq!(resolve_delimiter(None, Some(":")), Some(':'));
        assert_eq!(resolve_delimiter(None, None), Some('\n'));
        assert_eq!(resolve_delimiter(Some(3), Some(":")), None);
    }

    #[test]
    fn read_until_honors_nul_delimiter() {
        let (reader, mut writer) = crate::openfiles::pipe().unwrap();
        writer.write_all(b"first\0second\0").unwrap();
        drop(writer);

        let mut input = OpenFile::PipeReader(reader);

        let (text, saw_eof) = read_until(&mut input, Some('\0'), None, true).unwrap();
        assert_eq!(text, "first");
        assert!(!saw_eof);

        let (text, _) = read_until(&mut input, Some('\0'), None, true).unwrap();
        assert_eq!(text, "second");
    }
}
