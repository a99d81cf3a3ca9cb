use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{StateDelta, VarUpdate};
use crate::error::Error;
use crate::escape;
use crate::results::BuiltinExitCode;

/// Formats and prints arguments.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct PrintfCommand {
    /// Store the output in this variable instead of printing it.
    #[arg(short = 'v', value_name = "NAME")]
    output_variable: Option<String>,

    /// The format string.
    format: String,

    /// Arguments consumed by the format's conversions.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for PrintfCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let output = match format_all(self.format.as_str(), self.args.as_slice()) {
            Ok(output) => output,
            Err(message) => {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: printf: {message}")?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
            }
        };

        if let Some(name) = &self.output_variable {
            let mut delta = StateDelta::new();

            // `-v arr[key]` assigns one array element.
            let update = match name
                .find('[')
                .and_then(|open| name.strip_suffix(']').map(|s| (open, s)))
            {
                Some((open, stripped)) => VarUpdate::SetIndex {
                    name: stripped[..open].to_owned(),
                    index: stripped[open + 1..].to_owned(),
                    value: output,
                    append: false,
                },
                None => VarUpdate::scalar(name.clone(), output),
            };

            delta.vars.push(update);
            Ok(BuiltinResult::with_delta(delta))
        } else {
            let mut stdout = context.stdout();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
            Ok(BuiltinResult::success())
        }
    }
}

/// Applies the format to all arguments, re-using it until they're exhausted.
fn format_all(format: &str, args: &[String]) -> Result<String, String> {
    let mut output = String::new();
    let mut remaining = args;

    loop {
        let (chunk, consumed) = format_once(format, remaining)?;
        output.push_str(chunk.as_str());

        if consumed == 0 || remaining.len() <= consumed {
            break;
        }
        remaining = &remaining[consumed..];
    }

    Ok(output)
}

struct ConversionSpec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

fn format_once(format: &str, args: &[String]) -> Result<(String, usize), String> {
    fn next_arg<'a>(args: &'a [String], consumed: &mut usize) -> &'a str {
        let arg = args.get(*consumed).map_or("", |s| s.as_str());
        *consumed += 1;
        arg
    }

    let mut output = String::new();
    let mut consumed = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            // printf formats always process escape sequences.
            let mut escape_text = String::from('\\');
            if let Some(next) = chars.next() {
                escape_text.push(next);
                // Octal/hex escapes may span more characters; collect greedily.
                if matches!(next, '0'..='7' | 'x' | 'u' | 'U') {
                    while let Some(peeked) = chars.peek() {
                        if peeked.is_ascii_hexdigit() {
                            escape_text.push(*peeked);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }

            let (expanded, _) =
                escape::expand_backslash_escapes(escape_text.as_str(), escape::EscapeMode::AnsiCQuotes)
                    .map_err(|e| e.to_string())?;
            output.push_str(String::from_utf8_lossy(expanded.as_slice()).as_ref());
            continue;
        }

        if c != '%' {
            output.push(c);
            continue;
        }

        if matches!(chars.peek(), Some('%')) {
            chars.next();
            output.push('%');
            continue;
        }

        // Parse flags.
        let mut spec = ConversionSpec {
            minus: false,
            plus: false,
            space: false,
            zero: false,
            alternate: false,
            width: None,
            precision: None,
            conversion: 's',
        };

        while let Some(peeked) = chars.peek() {
            match peeked {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }

        // Width.
        let mut width_text = String::new();
        while let Some(peeked) = chars.peek() {
            if peeked.is_ascii_digit() {
                width_text.push(*peeked);
                chars.next();
            } else {
                break;
            }
        }
        if !width_text.is_empty() {
            spec.width = width_text.parse().ok();
        }

        // Precision.
        if matches!(chars.peek(), Some('.')) {
            chars.next();
            let mut precision_text = String::new();
            while let Some(peeked) = chars.peek() {
                if peeked.is_ascii_digit() {
                    precision_text.push(*peeked);
                    chars.next();
                } else {
                    break;
                }
            }
            spec.precision = Some(precision_text.parse().unwrap_or(0));
        }

        spec.conversion = chars
            .next()
            .ok_or_else(|| String::from("missing format character"))?;

        let formatted = match spec.conversion {
            'd' | 'i' => format_integer(&spec, next_arg(args, &mut consumed))?,
            'u' => format_integer(&spec, next_arg(args, &mut consumed))?,
            'o' | 'x' | 'X' => format_radix(&spec, next_arg(args, &mut consumed))?,
            'c' => {
                let arg = next_arg(args, &mut consumed);
                let s: String = arg.chars().take(1).collect();
                pad(&spec, s)
            }
            's' => {
                let arg = next_arg(args, &mut consumed);
                let mut s = arg.to_owned();
                if let Some(precision) = spec.precision {
                    s = s.chars().take(precision).collect();
                }
                pad(&spec, s)
            }
            'b' => {
                let arg = next_arg(args, &mut consumed);
                let (expanded, _) =
                    escape::expand_backslash_escapes(arg, escape::EscapeMode::AnsiCQuotes)
                        .map_err(|e| e.to_string())?;
                pad(&spec, String::from_utf8_lossy(expanded.as_slice()).into_owned())
            }
            'q' => {
                let arg = next_arg(args, &mut consumed);
                pad(
                    &spec,
                    escape::force_quote(arg, escape::QuoteMode::SingleQuote),
                )
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                format_float(&spec, next_arg(args, &mut consumed))?
            }
            other => return Err(format!("`%{other}': invalid format character")),
        };

        output.push_str(formatted.as_str());
    }

    Ok((output, consumed))
}

fn parse_int_arg(arg: &str) -> Result<i64, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(0);
    }

    // A leading quote yields the character's code point.
    if let Some(stripped) = arg.strip_prefix(['\'', '"']) {
        return Ok(stripped.chars().next().map_or(0, |c| c as i64));
    }

    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_err(|_| invalid_number(arg));
    }

    arg.parse::<i64>().map_err(|_| invalid_number(arg))
}

fn invalid_number(arg: &str) -> String {
    format!("{arg}: invalid number")
}

fn format_integer(spec: &ConversionSpec, arg: &str) -> Result<String, String> {
    let value = parse_int_arg(arg)?;

    let mut body = value.abs().to_string();
    let sign = if value < 0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };

    if spec.zero && !spec.minus {
        if let Some(width) = spec.width {
            let total = sign.len() + body.len();
            if total < width {
                body = format!("{}{}", "0".repeat(width - total), body);
            }
        }
    }

    Ok(pad(spec, format!("{sign}{body}")))
}

fn format_radix(spec: &ConversionSpec, arg: &str) -> Result<String, String> {
    let value = parse_int_arg(arg)?;

    #[allow(clippy::cast_sign_loss)]
    let unsigned = value as u64;

    let mut body = match spec.conversion {
        'o' => format!("{unsigned:o}"),
        'x' => format!("{unsigned:x}"),
        'X' => format!("{unsigned:X}"),
        _ => unreachable!("checked by the caller"),
    };

    if spec.alternate && unsigned != 0 {
        body = match spec.conversion {
            'o' => format!("0{body}"),
            'x' => format!("0x{body}"),
            'X' => format!("0X{body}"),
            _ => body,
        };
    }

    if spec.zero && !spec.minus {
        if let Some(width) = spec.width {
            if body.len() < width {
                body = format!("{}{}", "0".repeat(width - body.len()), body);
            }
        }
    }

    Ok(pad(spec, body))
}

fn format_float(spec: &ConversionSpec, arg: &str) -> Result<String, String> {
    let value: f64 = if arg.trim().is_empty() {
        0.0
    } else {
        arg.trim().parse().map_err(|_| invalid_number(arg))?
    };

    let precision = spec.precision.unwrap_or(6);
    let mut body = match spec.conversion {
        'f' | 'F' => format!("{value:.precision$}"),
        'e' => format!("{value:.precision$e}"),
        'E' => format!("{value:.precision$E}"),
        'g' | 'G' => {
            // %g trims trailing zeros and drops the point when integral.
            let mut s = format!("{value:.precision$}");
            if s.contains('.') {
                s = s.trim_end_matches('0').trim_end_matches('.').to_owned();
            }
            s
        }
        _ => unreachable!("checked by the caller"),
    };

    if value >= 0.0 {
        if spec.plus {
            body.insert(0, '+');
        } else if spec.space {
            body.insert(0, ' ');
        }
    }

    if spec.zero && !spec.minus {
        if let Some(width) = spec.width {
            if body.len() < width {
                let insert_at = usize::from(body.starts_with(['-', '+', ' ']));
                let zeros = "0".repeat(width - body.len());
                body.insert_str(insert_at, zeros.as_str());
            }
        }
    }

    Ok(pad(spec, body))
}

fn pad(spec: &ConversionSpec, s: String) -> String {
    let Some(width) = spec.width else {
        return s;
    };

    let len = s.chars().count();
    if len >= width {
        return s;
    }

    let padding = " ".repeat(width - len);
    if spec.minus {
        format!("{s}{padding}")
    } else {
        format!("{padding}{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fmt(format: &str, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        format_all(format, args.as_slice()).unwrap()
    }

    #[test]
    fn plain_specifiers() {
        assert_eq!(fmt("%s\n", &["hello"]), "hello\n");
        assert_eq!(fmt("%d\n", &["42"]), "42\n");
        assert_eq!(fmt("%x", &["255"]), "ff");
        assert_eq!(fmt("%o", &["8"]), "10");
        assert_eq!(fmt("%c", &["abc"]), "a");
        assert_eq!(fmt_noargs("%%"), "%");
    }

    fn fmt_noargs(format: &str) -> String {
        format_all(format, &[]).unwrap()
    }

    #[test]
    fn widths_and_flags() {
        assert_eq!(fmt("%05d\n", &["42"]), "00042\n");
        assert_eq!(fmt("%5d", &["42"]), "   42");
        assert_eq!(fmt("%-5d|", &["42"]), "42   |");
        assert_eq!(fmt("%+d", &["42"]), "+42");
        assert_eq!(fmt("%.2s", &["hello"]), "he");
        assert_eq!(fmt("%08.3f", &["3.14159"]), "0003.142");
    }

    #[test]
    fn format_reuses_for_extra_args() {
        assert_eq!(fmt("%s\n", &["a", "b"]), "a\nb\n");
        assert_eq!(fmt("%s-%s ", &["1", "2", "3"]), "1-2 3- ");
    }

    #[test]
    fn escapes_in_format() {
        assert_eq!(fmt_noargs("a\\tb"), "a\tb");
        assert_eq!(fmt_noargs("line\\n"), "line\n");
    }

    #[test]
    fn b_conversion_expands_escapes() {
        assert_eq!(fmt("%b", &["a\\tb"]), "a\tb");
    }

    #[test]
    fn q_conversion_quotes() {
        assert_eq!(fmt("%q", &["a b"]), "'a b'");
    }

    #[test]
    fn character_literals_as_integers() {
        assert_eq!(fmt("%d", &["'A"]), "65");
    }

    #[test]
    fn invalid_numbers_error() {
        let args = vec![String::from("xyz")];
        assert!(format_all("%d", args.as_slice()).is_err());
    }
}
