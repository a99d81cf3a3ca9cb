//! Regular-expression support for `[[ =~ ]]` and pattern-derived regexes.

use crate::error::Error;

/// One piece of a regex assembled from expansion pieces.
#[derive(Clone, Debug)]
pub(crate) enum RegexPiece {
    /// Text to interpret as regex syntax.
    Pattern(String),
    /// Text that must match literally (it came from a quoted region).
    Literal(String),
}

/// A regex built from expansion pieces.
#[derive(Clone, Debug, Default)]
pub(crate) struct RegexWord {
    pieces: Vec<RegexPiece>,
}

impl From<Vec<RegexPiece>> for RegexWord {
    fn from(pieces: Vec<RegexPiece>) -> Self {
        Self { pieces }
    }
}

impl RegexWord {
    /// Compiles the assembled regex.
    pub fn compile(&self) -> Result<fancy_regex::Regex, Error> {
        let mut regex_str = String::new();

        for piece in &self.pieces {
            match piece {
                RegexPiece::Pattern(s) => regex_str.push_str(s),
                RegexPiece::Literal(s) => {
                    for c in s.chars() {
                        if husk_parser::pattern::regex_char_needs_escaping(c) {
                            regex_str.push('\\');
                        }
                        regex_str.push(c);
                    }
                }
            }
        }

        compile(regex_str.as_str())
    }
}

/// Compiles a regex string with the crate's standard settings.
pub(crate) fn compile(regex_str: &str) -> Result<fancy_regex::Regex, Error> {
    let regex = fancy_regex::RegexBuilder::new(regex_str).build()?;
    Ok(regex)
}

/// Matches `value` against the regex; on a match, returns the capture groups
/// (index 0 is the whole match) for populating `BASH_REMATCH`.
pub(crate) fn match_and_capture(
    regex: &fancy_regex::Regex,
    value: &str,
) -> Result<Option<Vec<String>>, Error> {
    let Some(captures) = regex.captures(value)? else {
        return Ok(None);
    };

    let groups = (0..captures.len())
        .map(|i| {
            captures
                .get(i)
                .map_or_else(String::new, |m| m.as_str().to_owned())
        })
        .collect();

    Ok(Some(groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn capture_groups_populate() {
        let regex = compile("(a+)(b*)").unwrap();
        let groups = match_and_capture(&regex, "xxaab").unwrap().unwrap();
        assert_eq!(groups, ["aab", "aa", "b"]);
    }

    #[test]
    fn quoted_pieces_match_literally() {
        let word = RegexWord::from(vec![
            RegexPiece::Pattern("^".into()),
            RegexPiece::Literal("a.b".into()),
        ]);
        let regex = word.compile().unwrap();
        assert!(regex.is_match("a.b").unwrap());
        assert!(!regex.is_match("axb").unwrap());
    }
}
