//! Translation of shell glob (and extglob) patterns into regular-expression
//! strings compatible with `fancy-regex`.

use crate::error;

enum ExtglobKind {
    /// `+(...)`: one or more occurrences.
    Plus,
    /// `@(...)`: exactly one of the alternatives.
    At,
    /// `!(...)`: anything except the alternatives.
    Exclamation,
    /// `?(...)`: zero or one occurrence.
    Question,
    /// `*(...)`: zero or more occurrences.
    Star,
}

/// Converts a shell pattern to a regular-expression string.
pub fn pattern_to_regex_str(
    pattern: &str,
    enable_extended_globbing: bool,
) -> Result<String, error::WordParseError> {
    translator::pattern(pattern, enable_extended_globbing)
        .map_err(|e| error::WordParseError::Pattern(e.into()))
}

/// Returns whether a pattern contains any unescaped glob metacharacters.
pub fn pattern_has_glob_metachars(pattern: &str, enable_extended_globbing: bool) -> bool {
    translator::has_glob_metachars(pattern, enable_extended_globbing).unwrap_or(false)
}

/// Returns whether the given character must be escaped in a regular
/// expression to match literally.
pub const fn regex_char_needs_escaping(c: char) -> bool {
    matches!(
        c,
        '[' | ']' | '(' | ')' | '{' | '}' | '*' | '?' | '.' | '+' | '^' | '$' | '|' | '\\' | '-'
    )
}

peg::parser! {
    grammar translator(enable_extended_globbing: bool) for str {
        pub(crate) rule pattern() -> String =
            pieces:(pattern_piece()*) {
                pieces.join("")
            }

        rule pattern_piece() -> String =
            escape_sequence() /
            bracket_expression() /
            extglob_enabled() s:extglob_pattern() { s } /
            wildcard() /
            [c if regex_char_needs_escaping(c)] {
                let mut s = '\\'.to_string();
                s.push(c);
                s
            } /
            [c] { c.to_string() }

        rule escape_sequence() -> String =
            sequence:$(['\\'] [c if regex_char_needs_escaping(c)]) { sequence.to_owned() } /
            ['\\'] [c] { c.to_string() }

        rule bracket_expression() -> String =
            "[" invert:(invert_char()?) members:bracket_member()+ "]" {
                let mut members = members.into_iter().flatten().collect::<Vec<_>>();

                // A bracket expression whose members all failed to translate
                // (e.g. an inverted range) matches nothing.
                if members.is_empty() {
                    if invert.is_some() {
                        String::from(".")
                    } else {
                        String::from("(?!)")
                    }
                } else {
                    if invert.is_some() {
                        members.insert(0, String::from("^"));
                    }

                    format!("[{}]", members.join(""))
                }
            }

        rule invert_char() -> bool =
            ['!' | '^'] { true }

        rule bracket_member() -> Option<String> =
            e:char_class() { Some(e) } /
            r:char_range() { r } /
            m:single_bracket_member() {
                let (s, _) = m;
                Some(s)
            }

        rule char_class() -> String =
            e:$("[:" char_class_name() ":]") { e.to_owned() }

        rule char_class_name() =
            "alnum" / "alpha" / "blank" / "cntrl" / "digit" / "graph" / "lower" / "print" / "punct" / "space" / "upper" / "xdigit"

        rule char_range() -> Option<String> =
            from:single_bracket_member() "-" to:single_bracket_member() {
                let (from_str, from_c) = from;
                let (to_str, to_c) = to;

                if from_c <= to_c {
                    Some(format!("{from_str}-{to_str}"))
                } else {
                    None
                }
            }

        rule single_bracket_member() -> (String, char) =
            ['\\'] [c] { (format!("\\{c}"), c) } /
            ['['] { (String::from(r"\["), '[') } /
            [c if c != ']'] { (c.to_string(), c) }

        rule wildcard() -> String =
            "?" { String::from(".") } /
            "*" { String::from(".*") }

        rule extglob_enabled() -> () =
            &[_] {? if enable_extended_globbing { Ok(()) } else { Err("extglob disabled") } }

        pub(crate) rule extglob_pattern() -> String =
            kind:extglob_prefix() "(" branches:extglob_body() ")" {
                let mut s = String::new();

                // Negation needs a lookahead; fancy-regex supports them.
                if matches!(kind, ExtglobKind::Exclamation) {
                    if !branches.is_empty() {
                        s.push_str("(?:(?!");
                        s.push_str(&branches.join("|"));
                        s.push_str(").*|(?>");
                        s.push_str(&branches.join("|"));
                        s.push_str(").+?|)");
                    } else {
                        s.push_str("(?:.+)");
                    }
                } else {
                    s.push('(');
                    s.push_str(&branches.join("|"));
                    s.push(')');

                    match kind {
                        ExtglobKind::Plus => s.push('+'),
                        ExtglobKind::Question => s.push('?'),
                        ExtglobKind::Star => s.push('*'),
                        ExtglobKind::At | ExtglobKind::Exclamation => (),
                    }
                }

                s
            }

        rule extglob_prefix() -> ExtglobKind =
            "+" { ExtglobKind::Plus } /
            "@" { ExtglobKind::At } /
            "!" { ExtglobKind::Exclamation } /
            "?" { ExtglobKind::Question } /
            "*" { ExtglobKind::Star }

        pub(crate) rule extglob_body() -> Vec<String> =
            &[')'] { vec![] } /
            extglob_branch() ** "|"

        rule extglob_branch() -> String =
            &['|' | ')'] { String::new() } /
            pieces:(!['|' | ')'] piece:pattern_piece() { piece })+ {
                pieces.join("")
            }

        rule glob_piece() =
            bracket_expression() {} /
            extglob_enabled() extglob_pattern() {} /
            wildcard() {}

        rule non_glob_piece() =
            escape_sequence() {} /
            !glob_piece() [_]

        pub(crate) rule has_glob_metachars() -> bool =
            non_glob_piece()* glob_piece() [_]* { true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn translate_wildcards() -> Result<()> {
        assert_eq!(pattern_to_regex_str("a*b", true)?, "a.*b");
        assert_eq!(pattern_to_regex_str("a?b", true)?, "a.b");
        assert_eq!(pattern_to_regex_str("a.b", true)?, r"a\.b");
        Ok(())
    }

    #[test]
    fn translate_bracket_expressions() -> Result<()> {
        assert_eq!(pattern_to_regex_str("[a-z]", true)?, "[a-z]");
        assert_eq!(pattern_to_regex_str("[z-a]", true)?, "(?!)");
        assert_eq!(pattern_to_regex_str("[!a]", true)?, "[^a]");
        assert_eq!(pattern_to_regex_str("[[:digit:]]", true)?, "[[:digit:]]");
        Ok(())
    }

    #[test]
    fn translate_extglobs() -> Result<()> {
        assert_eq!(pattern_to_regex_str("@(a|b)", true)?, "(a|b)");
        assert_eq!(pattern_to_regex_str("+(ab)", true)?, "(ab)+");
        assert_eq!(pattern_to_regex_str("?(a)", true)?, "(a)?");
        assert_eq!(pattern_to_regex_str("*(ab|ac)", true)?, "(ab|ac)*");
        Ok(())
    }

    #[test]
    fn extglob_disabled_is_literal() -> Result<()> {
        assert_eq!(pattern_to_regex_str("@(a)", false)?, r"@\(a\)");
        Ok(())
    }

    #[test]
    fn detect_glob_metachars() {
        assert!(pattern_has_glob_metachars("*", false));
        assert!(pattern_has_glob_metachars("a?b", false));
        assert!(pattern_has_glob_metachars("[abc]", false));
        assert!(!pattern_has_glob_metachars("plain", false));
        assert!(!pattern_has_glob_metachars(r"\*", false));
        assert!(!pattern_has_glob_metachars("a[b", false));
        assert!(pattern_has_glob_metachars("@(a)", true));
        assert!(!pattern_has_glob_metachars("@(a)", false));
    }
}
