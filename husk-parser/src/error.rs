//! Error types surfaced by the tokenizer and parsers.

use crate::lexer::{self, Token};

/// An error produced while parsing a token stream into a syntax tree.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The parse failed near the given token.
    #[error("syntax error near unexpected token `{}'", .0.to_str())]
    NearToken(Token),

    /// The parse failed at the end of the input.
    #[error("syntax error: unexpected end of file")]
    AtEndOfInput,

    /// The input could not be tokenized.
    #[error("{inner}")]
    Lexing {
        /// The underlying lexer error.
        inner: lexer::LexerError,
        /// Position at which tokenization stopped, when known.
        position: Option<crate::SourcePosition>,
    },
}

impl ParseError {
    /// Returns true if the error may be the result of an incomplete input
    /// stream (e.g. an unterminated quote) rather than a malformed one.
    pub const fn is_incomplete(&self) -> bool {
        match self {
            Self::AtEndOfInput => true,
            Self::Lexing { inner, .. } => inner.is_incomplete(),
            Self::NearToken(_) => false,
        }
    }
}

pub(crate) fn convert_peg_parse_error(
    err: &peg::error::ParseError<usize>,
    tokens: &[Token],
) -> ParseError {
    match tokens.get(err.location) {
        Some(token) => ParseError::NearToken(token.clone()),
        None => ParseError::AtEndOfInput,
    }
}

/// A parse error annotated with where in the input it occurred.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct InnerParseError {
    #[from]
    inner: peg::error::ParseError<peg::str::LineCol>,
}

/// An error produced while parsing a word into its constituent pieces.
#[derive(Debug, thiserror::Error)]
pub enum WordParseError {
    /// The word could not be parsed.
    #[error("failed to parse word `{0}'")]
    Word(String, InnerParseError),

    /// A parameter reference could not be parsed.
    #[error("bad substitution: `{0}'")]
    Parameter(String, InnerParseError),

    /// An arithmetic expression could not be parsed.
    #[error("failed to parse arithmetic expression")]
    ArithmeticExpression(InnerParseError),

    /// A glob pattern could not be translated.
    #[error("failed to parse pattern")]
    Pattern(InnerParseError),

    /// A brace expression could not be parsed.
    #[error("failed to parse brace expression: `{0}'")]
    BraceExpansion(String, InnerParseError),
}

/// An error produced while parsing the arguments of a `test`/`[` command.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct TestCommandParseError(#[from] pub(crate) peg::error::ParseError<usize>);
