//! Backslash-escape expansion (ANSI-C quoting, `echo -e`) and re-quoting for
//! display (`declare -p`, `printf %q`, trace output).

use std::borrow::Cow;

use itertools::Itertools;

use crate::error::Error;

/// What dialect of escape sequences to expand.
#[derive(Clone, Copy)]
pub enum EscapeMode {
    /// The sequences understood by `echo -e`.
    EchoBuiltin,
    /// The sequences understood inside `$'...'`.
    AnsiCQuotes,
}

/// Expands backslash escapes in the given string, returning the expanded
/// bytes and whether output should continue (false when `\c` was seen in
/// echo mode).
pub fn expand_backslash_escapes(s: &str, mode: EscapeMode) -> Result<(Vec<u8>, bool), Error> {
    let mut result: Vec<u8> = vec![];
    let mut it = s.chars();

    while let Some(c) = it.next() {
        if c != '\\' {
            result.extend_from_slice(c.to_string().as_bytes());
            continue;
        }

        match it.next() {
            Some('a') => result.push(b'\x07'),
            Some('b') => result.push(b'\x08'),
            Some('c') => match mode {
                EscapeMode::EchoBuiltin => {
                    // Truncate all further output.
                    return Ok((result, false));
                }
                EscapeMode::AnsiCQuotes => {
                    // \cX is a control character.
                    if let Some(ctrl) = it.next() {
                        let byte = (ctrl.to_ascii_uppercase() as u8) ^ 0x40;
                        result.push(byte);
                    } else {
                        result.extend_from_slice(b"\\c");
                    }
                }
            },
            Some('e' | 'E') => result.push(b'\x1b'),
            Some('f') => result.push(b'\x0c'),
            Some('n') => result.push(b'\n'),
            Some('r') => result.push(b'\r'),
            Some('t') => result.push(b'\t'),
            Some('v') => result.push(b'\x0b'),
            Some('\\') => result.push(b'\\'),
            Some('\'') if matches!(mode, EscapeMode::AnsiCQuotes) => result.push(b'\''),
            Some('"') if matches!(mode, EscapeMode::AnsiCQuotes) => result.push(b'"'),
            Some('?') if matches!(mode, EscapeMode::AnsiCQuotes) => result.push(b'?'),
            Some('0') => {
                // Up to 3 octal digits.
                let mut taken = 0;
                let mut octal: String = it
                    .take_while_ref(|c| {
                        if taken < 3 && matches!(*c, '0'..='7') {
                            taken += 1;
                            true
                        } else {
                            false
                        }
                    })
                    .collect();

                if octal.is_empty() {
                    octal.push('0');
                }

                result.push(u8::from_str_radix(octal.as_str(), 8)?);
            }
            Some('x') => {
                // Up to 2 hex digits.
                let mut taken = 0;
                let hex: String = it
                    .take_while_ref(|c| {
                        if taken < 2 && c.is_ascii_hexdigit() {
                            taken += 1;
                            true
                        } else {
                            false
                        }
                    })
                    .collect();

                if hex.is_empty() {
                    result.extend_from_slice(b"\\x");
                } else {
                    result.push(u8::from_str_radix(hex.as_str(), 16)?);
                }
            }
            Some('u') => push_unicode_escape(&mut result, &mut it, 4, "\\u")?,
            Some('U') => push_unicode_escape(&mut result, &mut it, 8, "\\U")?,
            Some(c) => {
                // Not a recognized sequence; keep it verbatim.
                result.push(b'\\');
                result.extend_from_slice(c.to_string().as_bytes());
            }
            None => result.push(b'\\'),
        }
    }

    Ok((result, true))
}

fn push_unicode_escape(
    result: &mut Vec<u8>,
    it: &mut std::str::Chars<'_>,
    max_digits: usize,
    prefix: &str,
) -> Result<(), Error> {
    let mut taken = 0;
    let hex: String = it
        .take_while_ref(|c| {
            if taken < max_digits && c.is_ascii_hexdigit() {
                taken += 1;
                true
            } else {
                false
            }
        })
        .collect();

    if hex.is_empty() {
        result.extend_from_slice(prefix.as_bytes());
        return Ok(());
    }

    let value = u32::from_str_radix(hex.as_str(), 16)?;
    if let Some(decoded) = char::from_u32(value) {
        result.extend_from_slice(decoded.to_string().as_bytes());
    } else {
        result.extend_from_slice(prefix.as_bytes());
        result.extend_from_slice(hex.as_bytes());
    }

    Ok(())
}

/// Preferred style when quoting a string.
#[derive(Clone, Copy, Default)]
pub enum QuoteMode {
    /// Single quotes.
    #[default]
    SingleQuote,
    /// Double quotes.
    DoubleQuote,
    /// Per-character backslash escapes.
    #[allow(dead_code)]
    BackslashEscape,
}

/// Quotes the string unconditionally.
pub fn force_quote(s: &str, mode: QuoteMode) -> String {
    quote(s, mode, true).into_owned()
}

/// Quotes the string only if it contains characters that require it.
pub fn quote_if_needed(s: &str, mode: QuoteMode) -> Cow<'_, str> {
    quote(s, mode, false)
}

fn quote(s: &str, mode: QuoteMode, always: bool) -> Cow<'_, str> {
    // Control characters force ANSI-C quoting regardless of preference.
    if s.contains(|c: char| c.is_ascii_control()) {
        return ansi_c_quote(s).into();
    }

    if !always && !s.is_empty() && !s.contains(needs_escaping) {
        return s.into();
    }

    match mode {
        QuoteMode::BackslashEscape => backslash_escape(s).into(),
        QuoteMode::SingleQuote => single_quote(s).into(),
        QuoteMode::DoubleQuote => double_quote(s).into(),
    }
}

fn backslash_escape(s: &str) -> String {
    let mut result = String::new();
    for c in s.chars() {
        if needs_escaping(c) {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

fn single_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".into();
    }

    // Single quotes can't contain a single quote; escape those outside.
    let mut result = String::new();
    let mut first = true;
    for part in s.split('\'') {
        if !first {
            result.push_str("\\'");
        } else {
            first = false;
        }

        if !part.is_empty() {
            result.push('\'');
            result.push_str(part);
            result.push('\'');
        }
    }

    result
}

fn double_quote(s: &str) -> String {
    let mut result = String::from('"');
    for c in s.chars() {
        if matches!(c, '$' | '`' | '"' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result.push('"');
    result
}

fn ansi_c_quote(s: &str) -> String {
    let mut result = String::from("$'");

    for c in s.chars() {
        match c {
            '\x07' => result.push_str("\\a"),
            '\x08' => result.push_str("\\b"),
            '\x1b' => result.push_str("\\E"),
            '\x0c' => result.push_str("\\f"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\x0b' => result.push_str("\\v"),
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            c if c.is_ascii_control() => {
                result.push_str(format!("\\{:03o}", c as u8).as_str());
            }
            c => result.push(c),
        }
    }

    result.push('\'');
    result
}

const fn needs_escaping(c: char) -> bool {
    matches!(
        c,
        '(' | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '$'
            | '*'
            | '?'
            | '|'
            | '&'
            | ';'
            | '<'
            | '>'
            | '`'
            | '\\'
            | '"'
            | '!'
            | '^'
            | ','
            | ' '
            | '\t'
            | '\''
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn echo_expand(s: &str) -> String {
        let (bytes, _) = expand_backslash_escapes(s, EscapeMode::EchoBuiltin).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn expand_simple_escapes() {
        assert_eq!(echo_expand(r"a\nb"), "a\nb");
        assert_eq!(echo_expand(r"\t"), "\t");
        assert_eq!(echo_expand(r"\a"), "\x07");
        assert_eq!(echo_expand(r"\e"), "\x1b");
        assert_eq!(echo_expand(r"\\"), "\\");
        assert_eq!(echo_expand(r"\M"), "\\M");
        assert_eq!(echo_expand(r"trailing\"), "trailing\\");
    }

    #[test]
    fn expand_numeric_escapes() {
        assert_eq!(echo_expand(r"\0101"), "A");
        assert_eq!(echo_expand(r"\x41"), "A");
        assert_eq!(echo_expand(r"\u2620"), "\u{2620}");
        assert_eq!(echo_expand(r"\U0001F4A9"), "\u{1F4A9}");
    }

    #[test]
    fn echo_c_truncates() {
        let (bytes, keep_going) =
            expand_backslash_escapes(r"ab\cdef", EscapeMode::EchoBuiltin).unwrap();
        assert_eq!(bytes, b"ab");
        assert!(!keep_going);
    }

    #[test]
    fn quoting_styles() {
        assert_eq!(quote_if_needed("plain", QuoteMode::SingleQuote), "plain");
        assert_eq!(quote_if_needed("a b", QuoteMode::SingleQuote), "'a b'");
        assert_eq!(quote_if_needed("", QuoteMode::SingleQuote), "''");
        assert_eq!(quote_if_needed("'", QuoteMode::SingleQuote), "\\'");
        assert_eq!(
            quote_if_needed("a b", QuoteMode::BackslashEscape),
            r"a\ b"
        );
        assert_eq!(force_quote("x", QuoteMode::DoubleQuote), "\"x\"");
        assert_eq!(force_quote("a\nb", QuoteMode::SingleQuote), "$'a\\nb'");
    }
}
