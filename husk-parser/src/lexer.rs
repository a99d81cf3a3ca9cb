//! The lexer: turns a byte stream into shell tokens, tracking quoting state
//! and collecting here-document bodies lazily.

use std::borrow::Cow;

use utf8_chars::BufReadCharsExt;

use crate::{SourcePosition, SourceSpan};

/// A token extracted from a shell script.
#[derive(Clone, Debug)]
pub enum Token {
    /// An operator (e.g. `&&`, `|`, `;;`, `<<`, a newline).
    Operator(String, SourceSpan),
    /// Any other word, with quoting preserved.
    Word(String, SourceSpan),
}

impl Token {
    /// Returns the raw text of the token.
    pub fn to_str(&self) -> &str {
        match self {
            Self::Operator(s, _) | Self::Word(s, _) => s,
        }
    }

    /// Returns the token's location in the source script.
    pub const fn span(&self) -> &SourceSpan {
        match self {
            Self::Operator(_, span) | Self::Word(_, span) => span,
        }
    }
}

/// Why the lexer stopped accumulating the current token.
#[derive(Clone, Copy, Debug)]
enum FlushReason {
    EndOfInput,
    Newline,
    TerminatorChar,
    Blank,
    HereDocBodyStart,
    HereDocBodyEnd,
    HereDocEndTag,
    OperatorStart,
    OperatorEnd,
    Other,
}

#[derive(Clone, Debug)]
pub(crate) struct ScannedToken {
    reason: FlushReason,
    token: Option<Token>,
}

/// An error encountered while tokenizing.
#[derive(thiserror::Error, Debug)]
pub enum LexerError {
    /// The input ended in the middle of an escape sequence.
    #[error("unterminated escape sequence")]
    UnterminatedEscape,

    /// The input ended inside a single-quoted string.
    #[error("unterminated single quote at {0}")]
    UnterminatedSingleQuote(SourcePosition),

    /// The input ended inside an ANSI-C quoted string.
    #[error("unterminated ANSI-C quote at {0}")]
    UnterminatedAnsiCQuote(SourcePosition),

    /// The input ended inside a double-quoted string.
    #[error("unterminated double quote at {0}")]
    UnterminatedDoubleQuote(SourcePosition),

    /// The input ended inside a backquoted command substitution.
    #[error("unterminated backquote near {0}")]
    UnterminatedBackquote(SourcePosition),

    /// The input ended inside an extended glob group.
    #[error("unterminated extended glob near {0}")]
    UnterminatedExtglob(SourcePosition),

    /// The input ended inside a `${...}` expression.
    #[error("unterminated parameter expression")]
    UnterminatedParameterExpression,

    /// The input ended inside a `$(...)` expression.
    #[error("unterminated command substitution")]
    UnterminatedCommandSubstitution,

    /// A here-document operator was not followed by a delimiter word.
    #[error("missing here-document delimiter")]
    MissingHereDocDelimiter,

    /// The input ended before a here-document body was terminated.
    #[error("here-document at {1} delimited by end-of-file (wanted `{0}')")]
    UnterminatedHereDoc(String, SourcePosition),

    /// The input could not be decoded as UTF-8.
    #[error("failed to decode input as UTF-8")]
    InvalidUtf8,

    /// Reading the underlying stream failed.
    #[error("failed to read input")]
    Read(#[from] std::io::Error),
}

impl LexerError {
    /// Returns true if the error could be cured by appending more input.
    pub const fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Self::UnterminatedEscape
                | Self::UnterminatedSingleQuote(..)
                | Self::UnterminatedAnsiCQuote(..)
                | Self::UnterminatedDoubleQuote(..)
                | Self::UnterminatedBackquote(..)
                | Self::UnterminatedExtglob(..)
                | Self::UnterminatedParameterExpression
                | Self::UnterminatedCommandSubstitution
                | Self::UnterminatedHereDoc(..)
        )
    }
}

/// Options controlling tokenization.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct LexerOptions {
    /// Whether extended glob groups (e.g. `@(...)`) are swallowed into words.
    pub enable_extended_globbing: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            enable_extended_globbing: true,
        }
    }
}

#[derive(Clone, Debug)]
enum QuoteState {
    None,
    Single(SourcePosition),
    Double(SourcePosition),
    AnsiC(SourcePosition),
}

/// Tracks a here-document whose body is still pending collection.
#[derive(Clone, Debug)]
struct PendingHereDoc {
    delimiter: String,
    delimiter_was_quoted: bool,
    strip_tabs: bool,
    position: SourcePosition,
    /// The `<<` operator and delimiter tokens, held until the body is seen.
    held_tokens: Vec<ScannedToken>,
    /// Tokens that appeared after the delimiter but before the body.
    trailing_tokens: Vec<ScannedToken>,
}

#[derive(Clone, Debug, Default)]
enum HereDocPhase {
    /// No here-document is in flight.
    #[default]
    Inactive,
    /// The next flushed token is a here-doc delimiter.
    DelimiterNext { strip_tabs: bool },
    /// A delimiter has been recorded; waiting for the end of the line.
    AwaitingBody,
    /// Consuming body lines for one or more queued here-documents.
    InBody,
}

struct CrossTokenState {
    cursor: SourcePosition,
    phase: HereDocPhase,
    pending_here_docs: Vec<PendingHereDoc>,
    queued: Vec<ScannedToken>,
    arithmetic_depth: u32,
    /// Set while a `<<` operator token is being held back by the here-doc
    /// machinery.
    held_operator: Option<ScannedToken>,
}

/// In-progress state for a single token.
struct TokenBuilder {
    start: SourcePosition,
    text: String,
    is_operator: bool,
    in_escape: bool,
    quote: QuoteState,
}

impl TokenBuilder {
    fn new(start: &SourcePosition) -> Self {
        Self {
            start: start.clone(),
            text: String::new(),
            is_operator: false,
            in_escape: false,
            quote: QuoteState::None,
        }
    }

    fn take(&mut self, end: &SourcePosition) -> Token {
        let span = SourceSpan {
            start: std::mem::replace(&mut self.start, end.clone()),
            end: end.clone(),
        };

        let token = if std::mem::take(&mut self.is_operator) {
            Token::Operator(std::mem::take(&mut self.text), span)
        } else {
            Token::Word(std::mem::take(&mut self.text), span)
        };

        self.in_escape = false;
        self.quote = QuoteState::None;

        token
    }

    fn push(&mut self, c: char) {
        self.text.push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    const fn started(&self) -> bool {
        !self.text.is_empty()
    }

    const fn unquoted(&self) -> bool {
        !self.in_escape && matches!(self.quote, QuoteState::None)
    }

    fn is_operator_str(&self, operator: &str) -> bool {
        self.is_operator && self.text == operator
    }

    fn is_newline(&self) -> bool {
        self.text == "\n"
    }
}

/// Tokenizes the given script with default options.
pub fn lex_str(input: &str) -> Result<Vec<Token>, LexerError> {
    lex_str_with_options(input, &LexerOptions::default())
}

/// Tokenizes the given script.
pub fn lex_str_with_options(
    input: &str,
    options: &LexerOptions,
) -> Result<Vec<Token>, LexerError> {
    cacheable_lex(input.to_owned(), options.clone())
}

#[cached::proc_macro::cached(name = "LEX_CACHE", size = 64, result = true)]
fn cacheable_lex(input: String, options: LexerOptions) -> Result<Vec<Token>, LexerError> {
    let mut reader = std::io::BufReader::new(input.as_bytes());
    let mut lexer = Lexer::new(&mut reader, &options);

    let mut tokens = vec![];
    loop {
        let scanned = lexer.next_token()?;
        if let Some(token) = scanned.token {
            tracing::debug!(target: "tokenize", "token {}: {token:?}", tokens.len());
            tokens.push(token);
        }
        if matches!(scanned.reason, FlushReason::EndOfInput) {
            break;
        }
    }

    Ok(tokens)
}

/// The lexer itself; incrementally consumes characters from a reader.
pub(crate) struct Lexer<'a, R: ?Sized + std::io::BufRead> {
    chars: std::iter::Peekable<utf8_chars::Chars<'a, R>>,
    state: CrossTokenState,
    options: LexerOptions,
}

impl<'a, R: ?Sized + std::io::BufRead> Lexer<'a, R> {
    pub fn new(reader: &'a mut R, options: &LexerOptions) -> Self {
        Self {
            chars: reader.chars().peekable(),
            options: options.clone(),
            state: CrossTokenState {
                cursor: SourcePosition {
                    index: 0,
                    line: 1,
                    column: 1,
                },
                phase: HereDocPhase::Inactive,
                pending_here_docs: vec![],
                queued: vec![],
                arithmetic_depth: 0,
                held_operator: None,
            },
        }
    }

    fn next_char(&mut self) -> Result<Option<char>, LexerError> {
        let c = self.chars.next().transpose().map_err(LexerError::Read)?;

        if let Some(c) = c {
            if c == '\n' {
                self.state.cursor.line += 1;
                self.state.cursor.column = 1;
            } else {
                self.state.cursor.column += 1;
            }
            self.state.cursor.index += u32::try_from(c.len_utf8()).unwrap_or(1);
        }

        Ok(c)
    }

    fn consume_char(&mut self) -> Result<(), LexerError> {
        let _ = self.next_char()?;
        Ok(())
    }

    fn peek_char(&mut self) -> Result<Option<char>, LexerError> {
        match self.chars.peek() {
            Some(Ok(c)) => Ok(Some(*c)),
            Some(Err(_)) => Err(LexerError::InvalidUtf8),
            None => Ok(None),
        }
    }

    pub fn next_token(&mut self) -> Result<ScannedToken, LexerError> {
        self.next_token_until(None, false)
    }

    /// Scans the next token, optionally stopping at an (unquoted) terminating
    /// character. When `keep_blanks` is set, blanks are preserved in the token
    /// text; this is used to preserve the original source of command
    /// substitutions.
    fn next_token_until(
        &mut self,
        terminator: Option<char>,
        keep_blanks: bool,
    ) -> Result<ScannedToken, LexerError> {
        let mut token = TokenBuilder::new(&self.state.cursor);

        loop {
            // Serve anything previously queued (e.g. here-document pieces).
            if !self.state.queued.is_empty() {
                return Ok(self.state.queued.remove(0));
            }

            let next = self.peek_char()?;

            let Some(c) = next else {
                if let Some(result) = self.handle_end_of_input(&mut token)? {
                    return Ok(result);
                }
                continue;
            };

            if token.unquoted() && terminator == Some(c) {
                if let Some(result) = self.flush(&mut token, FlushReason::TerminatorChar)? {
                    return Ok(result);
                }
                continue;
            }

            if matches!(self.state.phase, HereDocPhase::InBody) {
                if let Some(result) = self.consume_here_doc_char(&mut token, c)? {
                    return Ok(result);
                }
                continue;
            }

            if token.is_operator {
                if let Some(result) = self.continue_operator(&mut token, c)? {
                    return Ok(result);
                }
                continue;
            }

            if self.char_starts_quoting(&token, c) {
                self.enter_quoting(&mut token, c)?;
                continue;
            }

            // Close out single/double/ANSI-C quoting.
            if !token.in_escape
                && matches!(token.quote, QuoteState::Single(..) | QuoteState::AnsiC(..))
                && c == '\''
            {
                token.quote = QuoteState::None;
                self.consume_char()?;
                token.push(c);
                continue;
            }
            if !token.in_escape && matches!(token.quote, QuoteState::Double(..)) && c == '"' {
                token.quote = QuoteState::None;
                self.consume_char()?;
                token.push(c);
                continue;
            }

            if token.in_escape {
                token.in_escape = false;
                self.consume_char()?;
                token.push(c);
                continue;
            }

            let double_quoted = matches!(token.quote, QuoteState::Double(_));
            if (token.unquoted() || double_quoted) && (c == '$' || c == '`') {
                if c == '$' {
                    self.scan_dollar_construct(&mut token)?;
                } else {
                    self.scan_backquoted(&mut token)?;
                }
                continue;
            }

            // An unquoted extglob prefix followed by `(` swallows the group.
            if c == '('
                && self.options.enable_extended_globbing
                && token.unquoted()
                && !token.is_operator
                && token.text.ends_with(['@', '!', '?', '+', '*'])
            {
                self.scan_extglob_group(&mut token)?;
                continue;
            }

            if token.unquoted() && can_start_operator(c) {
                if token.started() {
                    if let Some(result) = self.flush(&mut token, FlushReason::OperatorStart)? {
                        return Ok(result);
                    }
                } else {
                    token.is_operator = true;
                    self.consume_char()?;
                    token.push(c);
                }
                continue;
            }

            if token.unquoted() && is_blank(c) {
                if token.started() {
                    // Flush without consuming; the blank is picked up (and
                    // discarded or kept) on the next scan.
                    if let Some(result) = self.flush(&mut token, FlushReason::Blank)? {
                        return Ok(result);
                    }
                } else {
                    self.consume_char()?;
                    if keep_blanks {
                        token.push(c);
                    } else {
                        // Keep the blank out of the token's span.
                        token.start.column += 1;
                        token.start.index += 1;
                    }
                }
                continue;
            }

            // When recursing inside `${...}` we may be mid-token without text.
            if !token.is_operator && (token.started() || matches!(terminator, Some('}'))) {
                self.consume_char()?;
                token.push(c);
                continue;
            }

            if c == '#' {
                // Comment through end of line.
                self.consume_char()?;
                while !matches!(self.peek_char()?, Some('\n') | None) {
                    self.consume_char()?;
                }
                continue;
            }

            if token.started() {
                if let Some(result) = self.flush(&mut token, FlushReason::Other)? {
                    return Ok(result);
                }
            } else {
                self.consume_char()?;
                token.push(c);
            }
        }
    }

    fn handle_end_of_input(
        &mut self,
        token: &mut TokenBuilder,
    ) -> Result<Option<ScannedToken>, LexerError> {
        if token.in_escape {
            return Err(LexerError::UnterminatedEscape);
        }

        match &token.quote {
            QuoteState::None => (),
            QuoteState::Single(pos) => {
                return Err(LexerError::UnterminatedSingleQuote(pos.clone()));
            }
            QuoteState::Double(pos) => {
                return Err(LexerError::UnterminatedDoubleQuote(pos.clone()));
            }
            QuoteState::AnsiC(pos) => {
                return Err(LexerError::UnterminatedAnsiCQuote(pos.clone()));
            }
        }

        if !matches!(self.state.phase, HereDocPhase::Inactive) {
            // Allow a here-document delimited by end-of-input without a final
            // newline.
            if self.try_finish_here_doc(token, false)? {
                return Ok(None);
            }

            if let Some(pending) = self.state.pending_here_docs.first() {
                return Err(LexerError::UnterminatedHereDoc(
                    pending.delimiter.trim().to_owned(),
                    pending.position.clone(),
                ));
            }
        }

        self.flush(token, FlushReason::EndOfInput)
    }

    fn consume_here_doc_char(
        &mut self,
        token: &mut TokenBuilder,
        c: char,
    ) -> Result<Option<ScannedToken>, LexerError> {
        let strip_tabs = self
            .state
            .pending_here_docs
            .first()
            .is_some_and(|h| h.strip_tabs);

        if strip_tabs && c == '\t' && (!token.started() || token.text.ends_with('\n')) {
            // Leading tab on a body line; consumed but not kept.
            self.consume_char()?;
            return Ok(None);
        }

        self.consume_char()?;
        token.push(c);

        if c == '\n' {
            self.try_finish_here_doc(token, true)?;
        }

        Ok(None)
    }

    /// Checks whether the accumulated here-document body ends with the current
    /// delimiter; if so, queues up the held tokens plus the body.
    fn try_finish_here_doc(
        &mut self,
        token: &mut TokenBuilder,
        ends_with_newline: bool,
    ) -> Result<bool, LexerError> {
        let Some(here_doc) = self.state.pending_here_docs.first() else {
            return Ok(false);
        };

        let delimiter: Cow<'_, str> = if here_doc.delimiter_was_quoted {
            unquote_str(here_doc.delimiter.as_str()).into()
        } else {
            here_doc.delimiter.as_str().into()
        };

        let delimiter = if ends_with_newline {
            delimiter.as_ref()
        } else {
            delimiter.strip_suffix('\n').unwrap_or(delimiter.as_ref())
        };

        let Some(body) = token.text.strip_suffix(delimiter) else {
            return Ok(false);
        };

        // The delimiter must sit on its own line.
        if !body.is_empty() && !body.ends_with('\n') {
            return Ok(false);
        }

        token.text = body.to_owned();

        let finished = self.state.pending_here_docs.remove(0);

        // Queue: operator + delimiter tokens, a body-start marker, the body
        // itself, the end delimiter, then anything that trailed the delimiter
        // on its original line.
        for held in finished.held_tokens {
            self.state.queued.push(held);
        }
        self.state.queued.push(ScannedToken {
            reason: FlushReason::HereDocBodyStart,
            token: None,
        });

        let body_token = token.take(&self.state.cursor);
        self.state.queued.push(ScannedToken {
            reason: FlushReason::HereDocBodyEnd,
            token: Some(body_token),
        });

        token.push_str(finished.delimiter.trim_end_matches('\n'));
        let end_tag_token = token.take(&self.state.cursor);
        self.state.queued.push(ScannedToken {
            reason: FlushReason::HereDocEndTag,
            token: Some(end_tag_token),
        });

        for trailing in finished.trailing_tokens {
            self.state.queued.push(trailing);
        }

        self.state.phase = if self.state.pending_here_docs.is_empty() {
            HereDocPhase::Inactive
        } else {
            HereDocPhase::InBody
        };

        Ok(true)
    }

    fn continue_operator(
        &mut self,
        token: &mut TokenBuilder,
        c: char,
    ) -> Result<Option<ScannedToken>, LexerError> {
        let mut extended = token.text.clone();
        extended.push(c);

        if token.unquoted() && is_operator(extended.as_str()) {
            self.consume_char()?;
            token.push(c);
            return Ok(None);
        }

        // The operator is complete. Inside arithmetic parentheses `<<` is a
        // shift, not a here-document.
        if self.state.arithmetic_depth > 0 {
            if token.is_operator_str(")") && c == ')' {
                self.state.arithmetic_depth -= 1;
            }
        } else if token.is_operator_str("<<") {
            self.state.phase = HereDocPhase::DelimiterNext { strip_tabs: false };
        } else if token.is_operator_str("<<-") {
            self.state.phase = HereDocPhase::DelimiterNext { strip_tabs: true };
        } else if token.is_operator_str("(") && c == '(' {
            self.state.arithmetic_depth += 1;
        }

        let reason = if token.is_newline() {
            FlushReason::Newline
        } else {
            FlushReason::OperatorEnd
        };

        self.flush(token, reason)
    }

    fn char_starts_quoting(&self, token: &TokenBuilder, c: char) -> bool {
        if token.in_escape {
            return false;
        }

        match token.quote {
            QuoteState::Single(_) => false,
            QuoteState::Double(_) | QuoteState::AnsiC(_) => c == '\\',
            QuoteState::None => matches!(c, '\\' | '\'' | '"'),
        }
    }

    fn enter_quoting(&mut self, token: &mut TokenBuilder, c: char) -> Result<(), LexerError> {
        match c {
            '\\' => {
                self.consume_char()?;
                if matches!(self.peek_char()?, Some('\n')) {
                    // Line continuation: neither character is kept.
                    self.consume_char()?;
                } else {
                    token.in_escape = true;
                    token.push(c);
                }
            }
            '\'' => {
                if token.text.ends_with('$') {
                    token.quote = QuoteState::AnsiC(self.state.cursor.clone());
                } else {
                    token.quote = QuoteState::Single(self.state.cursor.clone());
                }
                self.consume_char()?;
                token.push(c);
            }
            '"' => {
                token.quote = QuoteState::Double(self.state.cursor.clone());
                self.consume_char()?;
                token.push(c);
            }
            _ => (),
        }

        Ok(())
    }

    /// Scans a `$`-introduced construct (`$(...)`, `$((...))`, `${...}`, or a
    /// bare `$`) into the current token.
    fn scan_dollar_construct(&mut self, token: &mut TokenBuilder) -> Result<(), LexerError> {
        // Consume the '$' so we can peek past it.
        self.consume_char()?;

        match self.peek_char()? {
            Some('(') => {
                token.push('$');
                self.consume_and_push(token)?;

                let mut wanted_parens = 1;
                if matches!(self.peek_char()?, Some('(')) {
                    self.consume_and_push(token)?;
                    wanted_parens = 2;
                    self.state.arithmetic_depth += 1;
                }

                self.scan_nested_until(token, ')', true, &mut wanted_parens)?;
                self.state.arithmetic_depth = 0;
                self.consume_and_push(token)?;
            }
            Some('{') => {
                token.push('$');
                self.consume_and_push(token)?;

                let mut wanted = 1;
                self.scan_nested_until(token, '}', false, &mut wanted)?;
                self.consume_and_push(token)?;
            }
            _ => {
                token.push('$');
            }
        }

        Ok(())
    }

    fn consume_and_push(&mut self, token: &mut TokenBuilder) -> Result<(), LexerError> {
        if let Some(c) = self.next_char()? {
            token.push(c);
        }
        Ok(())
    }

    /// Recursively scans tokens until the closing character is found,
    /// appending their raw text to `token`. Here-document pieces emitted by
    /// nested commands are re-ordered so the body follows its full line.
    fn scan_nested_until(
        &mut self,
        token: &mut TokenBuilder,
        closer: char,
        keep_blanks: bool,
        wanted_closers: &mut u32,
    ) -> Result<(), LexerError> {
        let mut held_here_doc_tokens: Vec<ScannedToken> = vec![];
        let mut draining = false;

        loop {
            let scanned = if draining && !held_here_doc_tokens.is_empty() {
                if held_here_doc_tokens.len() == 1 {
                    draining = false;
                }
                held_here_doc_tokens.remove(0)
            } else {
                let scanned = self.next_token_until(Some(closer), keep_blanks)?;

                if matches!(
                    scanned.reason,
                    FlushReason::HereDocBodyStart
                        | FlushReason::HereDocBodyEnd
                        | FlushReason::HereDocEndTag
                ) {
                    held_here_doc_tokens.push(scanned);
                    continue;
                }

                scanned
            };

            if matches!(scanned.reason, FlushReason::Newline) && !held_here_doc_tokens.is_empty() {
                held_here_doc_tokens.push(scanned);
                draining = true;
                continue;
            }

            if let Some(scanned_token) = &scanned.token {
                token.push_str(scanned_token.to_str());

                if matches!(scanned_token, Token::Operator(o, _) if o == "(") {
                    *wanted_closers += 1;
                }
            }

            match scanned.reason {
                FlushReason::HereDocBodyStart => token.push('\n'),
                FlushReason::Blank => {
                    // With keep_blanks the blank lands in the next token's
                    // text; otherwise reconstruct it here.
                    if !keep_blanks {
                        token.push(' ');
                    }
                }
                FlushReason::TerminatorChar => {
                    *wanted_closers -= 1;
                    if *wanted_closers == 0 {
                        return Ok(());
                    }
                    self.consume_and_push(token)?;
                }
                FlushReason::EndOfInput => {
                    return if closer == '}' {
                        Err(LexerError::UnterminatedParameterExpression)
                    } else {
                        Err(LexerError::UnterminatedCommandSubstitution)
                    };
                }
                _ => (),
            }
        }
    }

    fn scan_backquoted(&mut self, token: &mut TokenBuilder) -> Result<(), LexerError> {
        let start = self.state.cursor.clone();

        // Consume and keep the opening backquote.
        self.consume_and_push(token)?;

        let mut escaped = false;
        loop {
            match self.next_char()? {
                Some(c) => {
                    token.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '`' {
                        return Ok(());
                    }
                }
                None => return Err(LexerError::UnterminatedBackquote(start)),
            }
        }
    }

    fn scan_extglob_group(&mut self, token: &mut TokenBuilder) -> Result<(), LexerError> {
        // Consume and keep the '('.
        self.consume_and_push(token)?;

        let mut depth = 1;
        while depth > 0 {
            match self.next_char()? {
                Some(c) => {
                    token.push(c);
                    if c == '(' {
                        depth += 1;
                    } else if c == ')' {
                        depth -= 1;
                    }
                }
                None => {
                    return Err(LexerError::UnterminatedExtglob(self.state.cursor.clone()));
                }
            }
        }

        Ok(())
    }

    /// Closes out the current token (if non-empty), applying the here-document
    /// bookkeeping that decides whether the token is yielded now or held.
    fn flush(
        &mut self,
        token: &mut TokenBuilder,
        reason: FlushReason,
    ) -> Result<Option<ScannedToken>, LexerError> {
        if !token.started() && !matches!(reason, FlushReason::HereDocBodyEnd) {
            return Ok(Some(ScannedToken {
                reason,
                token: None,
            }));
        }

        match std::mem::take(&mut self.state.phase) {
            HereDocPhase::Inactive => (),
            HereDocPhase::DelimiterNext { strip_tabs } => {
                let Some(operator) = self.state.held_operator.take() else {
                    // Hold the `<<` operator; it is emitted with the body
                    // later. The next flushed token is the delimiter.
                    self.state.held_operator = Some(ScannedToken {
                        reason,
                        token: Some(token.take(&self.state.cursor)),
                    });
                    self.state.phase = HereDocPhase::DelimiterNext { strip_tabs };
                    return Ok(None);
                };

                // This token is the delimiter itself.
                if token.is_newline() {
                    return Err(LexerError::MissingHereDocDelimiter);
                }

                let delimiter = format!("{}\n", token.text.trim_ascii_start());
                let delimiter_was_quoted = delimiter.contains(['\\', '\'', '"']);

                let delimiter_token = ScannedToken {
                    reason,
                    token: Some(token.take(&self.state.cursor)),
                };

                self.state.pending_here_docs.push(PendingHereDoc {
                    delimiter,
                    delimiter_was_quoted,
                    strip_tabs,
                    position: self.state.cursor.clone(),
                    held_tokens: vec![operator, delimiter_token],
                    trailing_tokens: vec![],
                });

                self.state.phase = HereDocPhase::AwaitingBody;
                return Ok(None);
            }
            HereDocPhase::AwaitingBody => {
                let entering_body = token.is_newline();

                let scanned = ScannedToken {
                    reason,
                    token: Some(token.take(&self.state.cursor)),
                };

                if let Some(here_doc) = self.state.pending_here_docs.last_mut() {
                    here_doc.trailing_tokens.push(scanned);
                } else {
                    return Err(LexerError::MissingHereDocDelimiter);
                }

                self.state.phase = if entering_body {
                    HereDocPhase::InBody
                } else {
                    HereDocPhase::AwaitingBody
                };

                return Ok(None);
            }
            HereDocPhase::InBody => {
                // Flushes inside the body only happen via try_finish_here_doc.
                self.state.phase = HereDocPhase::InBody;
            }
        }

        Ok(Some(ScannedToken {
            reason,
            token: Some(token.take(&self.state.cursor)),
        }))
    }
}

const fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

const fn can_start_operator(c: char) -> bool {
    matches!(c, '&' | '(' | ')' | ';' | '\n' | '|' | '<' | '>')
}

fn is_operator(s: &str) -> bool {
    matches!(
        s,
        "&" | "&&"
            | "("
            | ")"
            | ";"
            | ";;"
            | ";&"
            | ";;&"
            | "\n"
            | "|"
            | "|&"
            | "||"
            | "<"
            | ">"
            | ">|"
            | "<<"
            | ">>"
            | "<&"
            | ">&"
            | "<<-"
            | "<<<"
            | "<>"
            | "&>"
            | "&>>"
    )
}

const fn is_quoting_char(c: char) -> bool {
    matches!(c, '\\' | '\'' | '"')
}

/// Returns the given string with shell quoting removed.
pub fn unquote_str(s: &str) -> String {
    let mut result = String::new();

    let mut in_escape = false;
    for c in s.chars() {
        match c {
            c if in_escape => {
                result.push(c);
                in_escape = false;
            }
            '\\' => in_escape = true,
            c if is_quoting_char(c) => (),
            c => result.push(c),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn token_texts(input: &str) -> Result<Vec<String>> {
        Ok(lex_str(input)?
            .into_iter()
            .map(|t| t.to_str().to_owned())
            .collect())
    }

    #[test]
    fn lex_empty() -> Result<()> {
        assert_eq!(lex_str("")?.len(), 0);
        Ok(())
    }

    #[test]
    fn lex_simple_words() -> Result<()> {
        assert_eq!(token_texts("echo hello world")?, ["echo", "hello", "world"]);
        Ok(())
    }

    #[test]
    fn lex_operators() -> Result<()> {
        assert_eq!(token_texts("a&&b")?, ["a", "&&", "b"]);
        assert_eq!(token_texts("a | b")?, ["a", "|", "b"]);
        assert_eq!(token_texts("a>>b")?, ["a", ">>", "b"]);
        assert_eq!(token_texts("a;;b")?, ["a", ";;", "b"]);
        assert_eq!(token_texts("a ;& b")?, ["a", ";&", "b"]);
        assert_eq!(token_texts("a ;;& b")?, ["a", ";;&", "b"]);
        Ok(())
    }

    #[test]
    fn lex_line_continuation() -> Result<()> {
        assert_eq!(token_texts("ab\\\ncd")?, ["abcd"]);
        Ok(())
    }

    #[test]
    fn lex_comment() -> Result<()> {
        assert_eq!(token_texts("a # rest is comment\n")?, ["a", "\n"]);
        assert_eq!(token_texts("a # comment at eof")?, ["a"]);
        Ok(())
    }

    #[test]
    fn lex_quoting() -> Result<()> {
        assert_eq!(token_texts("x'a b'y")?, ["x'a b'y"]);
        assert_eq!(token_texts(r#"x"a b"y"#)?, [r#"x"a b"y"#]);
        assert_eq!(token_texts(r"1\ 2 3")?, [r"1\ 2", "3"]);
        Ok(())
    }

    #[test]
    fn lex_unterminated_quotes() {
        assert!(matches!(
            lex_str("'abc"),
            Err(LexerError::UnterminatedSingleQuote(_))
        ));
        assert!(matches!(
            lex_str("\"abc"),
            Err(LexerError::UnterminatedDoubleQuote(_))
        ));
        assert!(lex_str("'abc").unwrap_err().is_incomplete());
    }

    #[test]
    fn lex_command_substitution() -> Result<()> {
        assert_eq!(token_texts("a$(echo hi)b c")?, ["a$(echo hi)b", "c"]);
        assert_eq!(token_texts("$( (:) )")?, ["$( (:) )"]);
        Ok(())
    }

    #[test]
    fn lex_unterminated_command_substitution() {
        assert!(matches!(
            lex_str("$(echo"),
            Err(LexerError::UnterminatedCommandSubstitution)
        ));
    }

    #[test]
    fn lex_arithmetic_expansion() -> Result<()> {
        assert_eq!(token_texts("a$((1+2))b c")?, ["a$((1+2))b", "c"]);
        assert_eq!(token_texts("$((1<<2))")?, ["$((1<<2))"]);
        Ok(())
    }

    #[test]
    fn lex_parameter_expansion() -> Result<()> {
        assert_eq!(token_texts("${x}")?, ["${x}"]);
        assert_eq!(token_texts("a${x:-y}b")?, ["a${x:-y}b"]);
        assert_eq!(token_texts("$x a$x")?, ["$x", "a$x"]);
        Ok(())
    }

    #[test]
    fn lex_unterminated_parameter_expansion() {
        assert!(matches!(
            lex_str("${x"),
            Err(LexerError::UnterminatedParameterExpression)
        ));
    }

    #[test]
    fn lex_backquotes() -> Result<()> {
        assert_eq!(token_texts("echo `echo hi`")?, ["echo", "`echo hi`"]);
        assert!(matches!(
            lex_str("`x"),
            Err(LexerError::UnterminatedBackquote(_))
        ));
        Ok(())
    }

    #[test]
    fn lex_extglob() -> Result<()> {
        assert_eq!(token_texts("ls !(a|b) c")?, ["ls", "!(a|b)", "c"]);
        assert_eq!(token_texts("echo $(echo !(x))")?, ["echo", "$(echo !(x))"]);
        Ok(())
    }

    #[test]
    fn lex_here_doc() -> Result<()> {
        assert_eq!(
            token_texts("cat <<EOF\nline 1\nline 2\nEOF\n")?,
            ["cat", "<<", "EOF", "line 1\nline 2\n", "EOF", "\n"]
        );
        Ok(())
    }

    #[test]
    fn lex_here_doc_at_eof_without_newline() -> Result<()> {
        // The newline ending the tag's own line still yields a token.
        assert_eq!(
            token_texts("cat <<EOF\nbody\nEOF")?,
            ["cat", "<<", "EOF", "body\n", "EOF", "\n"]
        );
        Ok(())
    }

    #[test]
    fn lex_here_doc_with_tab_stripping() -> Result<()> {
        assert_eq!(
            token_texts("cat <<-EOF\n\tbody\n\tEOF\n")?,
            ["cat", "<<-", "EOF", "body\n", "EOF", "\n"]
        );
        Ok(())
    }

    #[test]
    fn lex_here_doc_with_trailing_pipeline() -> Result<()> {
        assert_eq!(
            token_texts("cat <<EOF | wc -l\na b\nEOF\n")?,
            ["cat", "<<", "EOF", "a b\n", "EOF", "|", "wc", "-l", "\n"]
        );
        Ok(())
    }

    #[test]
    fn lex_multiple_here_docs() -> Result<()> {
        assert_eq!(
            token_texts("cat <<A <<B\none\nA\ntwo\nB\n")?,
            ["cat", "<<", "A", "one\n", "A", "<<", "B", "two\n", "B", "\n"]
        );
        Ok(())
    }

    #[test]
    fn lex_unterminated_here_doc() {
        assert!(matches!(
            lex_str("cat <<EOF\nbody\n"),
            Err(LexerError::UnterminatedHereDoc(..))
        ));
    }

    #[test]
    fn lex_here_doc_in_command_substitution() -> Result<()> {
        assert_eq!(
            token_texts("echo $(cat <<EOF\nTEXT\nEOF\n)")?,
            ["echo", "$(cat <<EOF\nTEXT\nEOF\n)"]
        );
        Ok(())
    }

    #[test]
    fn lex_missing_here_doc_delimiter() {
        assert!(matches!(
            lex_str("cat <<\n"),
            Err(LexerError::MissingHereDocDelimiter)
        ));
    }

    #[test]
    fn test_unquote_str() {
        assert_eq!(unquote_str(r#""hello""#), "hello");
        assert_eq!(unquote_str("'hello'"), "hello");
        assert_eq!(unquote_str(r#""hel\"lo""#), "hel\"lo");
        assert_eq!(unquote_str(r"a\ b"), "a b");
    }
}
