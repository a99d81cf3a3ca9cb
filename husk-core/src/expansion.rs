//! The word-expansion engine: tilde, parameter, arithmetic, and command
//! substitution, field splitting, and pathname expansion, with the quoting
//! discipline those phases require.

use std::borrow::Cow;
use std::cmp::min;

use husk_parser::ast;
use husk_parser::word::{
    self, Parameter, ParameterExpr, ParameterTestType, SpecialParameter, SubstringMatchKind,
    TransformOp, WordPiece,
};
use itertools::Itertools;

use crate::arithmetic::{self, ExpandAndEvaluate};
use crate::commands;
use crate::env::{self, EnvironmentLookup, EnvironmentScope};
use crate::error::{Error, ErrorKind};
use crate::escape;
use crate::interp::ExecutionParameters;
use crate::patterns::{self, FilenameExpansionOptions};
use crate::session::Session;
use crate::sys;
use crate::variables::{UnsetKind, ValueLiteral, VariableValue};

/// The result of basic-expanding a word: one or more fields, each made of
/// splittable (unquoted) and unsplittable (quoted) pieces.
#[derive(Debug)]
struct Expansion {
    fields: Vec<WordField>,
    concatenate: bool,
    from_array: bool,
    undefined: bool,
}

impl Default for Expansion {
    fn default() -> Self {
        Self {
            fields: vec![],
            concatenate: true,
            from_array: false,
            undefined: false,
        }
    }
}

impl From<Expansion> for String {
    fn from(value: Expansion) -> Self {
        value.fields.into_iter().map(Self::from).join(" ")
    }
}

impl From<String> for Expansion {
    fn from(value: String) -> Self {
        Self {
            fields: vec![WordField::from(value)],
            ..Self::default()
        }
    }
}

impl From<ExpansionPiece> for Expansion {
    fn from(piece: ExpansionPiece) -> Self {
        Self {
            fields: vec![WordField::from(piece)],
            ..Self::default()
        }
    }
}

enum ParameterState {
    Undefined,
    DefinedEmptyString,
    NonZeroLength,
}

impl Expansion {
    fn classify(&self) -> ParameterState {
        let non_empty = self
            .fields
            .iter()
            .any(|field| field.0.iter().any(|piece| !piece.as_str().is_empty()));

        if self.undefined {
            ParameterState::Undefined
        } else if non_empty {
            ParameterState::NonZeroLength
        } else {
            ParameterState::DefinedEmptyString
        }
    }

    fn undefined() -> Self {
        Self {
            fields: vec![WordField::from(String::new())],
            concatenate: true,
            from_array: false,
            undefined: true,
        }
    }

    /// Array-backed expansions measure their element count; strings measure
    /// characters.
    fn polymorphic_len(&self) -> usize {
        if self.from_array {
            self.fields.len()
        } else {
            self.fields
                .iter()
                .map(|field| {
                    field
                        .0
                        .iter()
                        .map(|piece| piece.as_str().chars().count())
                        .sum::<usize>()
                })
                .sum()
        }
    }

    fn polymorphic_subslice(&self, start: usize, end: usize) -> Self {
        if self.from_array {
            let len = min(end.saturating_sub(start), self.fields.len().saturating_sub(start));
            let fields = self.fields[start..(start + len)].to_vec();

            Self {
                fields,
                concatenate: self.concatenate,
                from_array: self.from_array,
                undefined: self.undefined,
            }
        } else {
            let mut remaining_skip = start;
            let mut remaining_take = end.saturating_sub(start);
            let mut fields = vec![];

            for field in &self.fields {
                let mut pieces = vec![];

                for piece in &field.0 {
                    if remaining_take == 0 {
                        break;
                    }

                    let char_count = piece.as_str().chars().count();
                    if remaining_skip >= char_count {
                        remaining_skip -= char_count;
                        continue;
                    }

                    let skip_here = remaining_skip;
                    let take_here = min(remaining_take, char_count - skip_here);
                    remaining_skip = 0;
                    remaining_take -= take_here;

                    let taken: String = piece
                        .as_str()
                        .chars()
                        .skip(skip_here)
                        .take(take_here)
                        .collect();

                    pieces.push(match piece {
                        ExpansionPiece::Splittable(_) => ExpansionPiece::Splittable(taken),
                        ExpansionPiece::Unsplittable(_) => ExpansionPiece::Unsplittable(taken),
                    });
                }

                if !pieces.is_empty() {
                    fields.push(WordField(pieces));
                }
            }

            Self {
                fields,
                concatenate: self.concatenate,
                from_array: self.from_array,
                undefined: self.undefined,
            }
        }
    }
}

/// One field of an expansion.
#[derive(Clone, Debug, Default, PartialEq)]
struct WordField(Vec<ExpansionPiece>);

impl WordField {
    const fn new() -> Self {
        Self(vec![])
    }
}

impl From<WordField> for String {
    fn from(field: WordField) -> Self {
        field.0.into_iter().map(Self::from).collect()
    }
}

impl From<WordField> for patterns::Pattern {
    fn from(field: WordField) -> Self {
        let pieces: Vec<_> = field
            .0
            .into_iter()
            .map(crate::patterns::PatternPiece::from)
            .collect();
        Self::from(pieces)
    }
}

impl From<ExpansionPiece> for WordField {
    fn from(piece: ExpansionPiece) -> Self {
        Self(vec![piece])
    }
}

impl From<String> for WordField {
    fn from(value: String) -> Self {
        Self(vec![ExpansionPiece::Splittable(value)])
    }
}

/// One piece of a field: subject to word splitting, or protected from it.
#[derive(Clone, Debug, PartialEq)]
enum ExpansionPiece {
    Unsplittable(String),
    Splittable(String),
}

impl From<ExpansionPiece> for String {
    fn from(piece: ExpansionPiece) -> Self {
        match piece {
            ExpansionPiece::Unsplittable(s) | ExpansionPiece::Splittable(s) => s,
        }
    }
}

impl From<ExpansionPiece> for crate::patterns::PatternPiece {
    fn from(piece: ExpansionPiece) -> Self {
        match piece {
            ExpansionPiece::Unsplittable(s) => Self::Literal(s),
            ExpansionPiece::Splittable(s) => Self::Pattern(s),
        }
    }
}

impl From<ExpansionPiece> for crate::regexes::RegexPiece {
    fn from(piece: ExpansionPiece) -> Self {
        match piece {
            ExpansionPiece::Unsplittable(s) => Self::Literal(s),
            ExpansionPiece::Splittable(s) => Self::Pattern(s),
        }
    }
}

impl ExpansionPiece {
    fn as_str(&self) -> &str {
        match self {
            Self::Unsplittable(s) | Self::Splittable(s) => s.as_str(),
        }
    }

    fn make_unsplittable(self) -> Self {
        match self {
            Self::Splittable(s) => Self::Unsplittable(s),
            piece => piece,
        }
    }
}

//
// Crate-facing entry points.
//

pub(crate) async fn basic_expand_word(
    session: &mut Session,
    params: &ExecutionParameters,
    word: &ast::Word,
) -> Result<String, Error> {
    basic_expand_str(session, params, word.text.as_str()).await
}

pub(crate) async fn basic_expand_str(
    session: &mut Session,
    params: &ExecutionParameters,
    s: &str,
) -> Result<String, Error> {
    let mut expander = WordExpander::new(session, params);
    expander.basic_expand_to_str(s).await
}

pub(crate) async fn basic_expand_str_without_tilde(
    session: &mut Session,
    params: &ExecutionParameters,
    s: &str,
) -> Result<String, Error> {
    let mut expander = WordExpander::new(session, params);
    expander.parser_options.tilde_expansion = false;
    expander.basic_expand_to_str(s).await
}

pub(crate) async fn basic_expand_pattern(
    session: &mut Session,
    params: &ExecutionParameters,
    word: &ast::Word,
) -> Result<patterns::Pattern, Error> {
    let mut expander = WordExpander::new(session, params);
    expander.basic_expand_pattern(word.text.as_str()).await
}

pub(crate) async fn basic_expand_regex(
    session: &mut Session,
    params: &ExecutionParameters,
    word: &ast::Word,
) -> Result<crate::regexes::RegexWord, Error> {
    let mut expander = WordExpander::new(session, params);
    expander.basic_expand_regex(word.text.as_str()).await
}

pub(crate) async fn full_expand_and_split_word(
    session: &mut Session,
    params: &ExecutionParameters,
    word: &ast::Word,
) -> Result<Vec<String>, Error> {
    full_expand_and_split_str(session, params, word.text.as_str()).await
}

pub(crate) async fn full_expand_and_split_str(
    session: &mut Session,
    params: &ExecutionParameters,
    s: &str,
) -> Result<Vec<String>, Error> {
    let mut expander = WordExpander::new(session, params);
    expander.full_expand_with_splitting(s).await
}

/// Assigns a value to a named parameter (a variable name or an array-element
/// reference such as `arr[3]`).
pub async fn assign_to_named_parameter(
    session: &mut Session,
    params: &ExecutionParameters,
    name: &str,
    value: String,
) -> Result<(), Error> {
    let parser_options = session.parser_options();
    let parameter = word::parse_parameter(name, &parser_options)?;
    let mut expander = WordExpander::new(session, params);
    expander.assign_to_parameter(&parameter, value).await
}

struct WordExpander<'a> {
    session: &'a mut Session,
    params: &'a ExecutionParameters,
    parser_options: husk_parser::ParserOptions,
    in_double_quotes: bool,
}

impl<'a> WordExpander<'a> {
    fn new(session: &'a mut Session, params: &'a ExecutionParameters) -> Self {
        let parser_options = session.parser_options();
        Self {
            session,
            params,
            parser_options,
            in_double_quotes: false,
        }
    }

    /// Applies tilde, parameter, arithmetic, and command substitution,
    /// yielding a single string.
    async fn basic_expand_to_str(&mut self, word: &str) -> Result<String, Error> {
        Ok(String::from(self.basic_expand(word).await?))
    }

    async fn basic_expand(&mut self, word: &str) -> Result<Expansion, Error> {
        tracing::debug!(target: "expansion", "basic expanding: '{word}'");

        // Words with none of the marker characters can't require expansion.
        if !word.contains(['$', '`', '\\', '\'', '"', '~', '{']) {
            return Ok(Expansion::from(ExpansionPiece::Splittable(word.to_owned())));
        }

        // Brace expansion runs before everything else.
        let brace_expanded: String = self.brace_expand_if_needed(word)?.into_iter().join(" ");

        let mut expansions = vec![];
        for piece in word::parse(brace_expanded.as_str(), &self.parser_options)? {
            let piece_expansion = self.expand_word_piece(piece).await?;
            expansions.push(piece_expansion);
        }

        Ok(coalesce_expansions(expansions))
    }

    fn brace_expand_if_needed<'w>(&self, word: &'w str) -> Result<Vec<Cow<'w, str>>, Error> {
        // Cheap pre-check; false positives are fine.
        if !may_contain_braces_to_expand(word) {
            return Ok(vec![word.into()]);
        }

        let Ok(parsed) = word::parse_brace_expansions(word, &self.parser_options) else {
            return Ok(vec![word.into()]);
        };

        if let Some(pieces) = parsed {
            let generated = generate_brace_expansions(pieces)
                .into_iter()
                .map(|s| if s.is_empty() { Cow::Borrowed("\"\"") } else { Cow::Owned(s) })
                .collect();
            Ok(generated)
        } else {
            Ok(vec![word.into()])
        }
    }

    /// Full expansion: basic expansion, field splitting, pathname expansion.
    async fn full_expand_with_splitting(&mut self, word: &str) -> Result<Vec<String>, Error> {
        let basic = self.basic_expand(word).await?;
        let fields = self.split_fields(basic);

        let result = fields
            .into_iter()
            .map(|field| {
                if self.session.options.noglob {
                    Ok(vec![String::from(field)])
                } else {
                    self.expand_pathnames_in_field(field)
                }
            })
            .collect::<Result<Vec<_>, Error>>()?
            .into_iter()
            .flatten()
            .collect();

        Ok(result)
    }

    fn split_fields(&self, expansion: Expansion) -> Vec<WordField> {
        let ifs = self.session.ifs();

        let mut fields: Vec<WordField> = vec![];
        let mut current = WordField::new();

        for existing_field in expansion.fields {
            for piece in existing_field.0 {
                match piece {
                    ExpansionPiece::Unsplittable(_) => current.0.push(piece),
                    ExpansionPiece::Splittable(s) => {
                        if ifs.is_empty() {
                            current.0.push(ExpansionPiece::Splittable(s));
                            continue;
                        }

                        for c in s.chars() {
                            if ifs.contains(c) {
                                if !current.0.is_empty() {
                                    fields.push(std::mem::take(&mut current));
                                }
                            } else {
                                match current.0.last_mut() {
                                    Some(ExpansionPiece::Splittable(last)) => last.push(c),
                                    _ => current
                                        .0
                                        .push(ExpansionPiece::Splittable(c.to_string())),
                                }
                            }
                        }
                    }
                }
            }

            if !current.0.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        }

        fields
    }

    fn expand_pathnames_in_field(&self, field: WordField) -> Result<Vec<String>, Error> {
        let pattern = patterns::Pattern::from(field.clone())
            .set_extended_globbing(self.session.options.extglob);

        let options = FilenameExpansionOptions {
            require_dot_in_pattern_to_match_dot_files: !self.session.options.dotglob,
            enable_globstar: self.session.options.globstar,
        };

        let expansions = pattern
            .expand(self.session.working_dir.as_path(), &options)
            .unwrap_or_default();

        if expansions.is_empty() {
            if self.session.options.nullglob && pattern.requires_expansion() {
                Ok(vec![])
            } else {
                Ok(vec![String::from(field)])
            }
        } else {
            Ok(expansions)
        }
    }

    async fn basic_expand_pattern(&mut self, word: &str) -> Result<patterns::Pattern, Error> {
        let expansion = self.basic_expand(word).await?;

        #[allow(unstable_name_collisions)]
        let pieces: Vec<_> = expansion
            .fields
            .into_iter()
            .map(|field| {
                field
                    .0
                    .into_iter()
                    .map(crate::patterns::PatternPiece::from)
                    .collect::<Vec<_>>()
            })
            .intersperse(vec![crate::patterns::PatternPiece::Literal(" ".into())])
            .flatten()
            .collect();

        Ok(patterns::Pattern::from(pieces))
    }

    async fn basic_expand_regex(&mut self, word: &str) -> Result<crate::regexes::RegexWord, Error> {
        let expansion = self.basic_expand(word).await?;

        #[allow(unstable_name_collisions)]
        let pieces: Vec<_> = expansion
            .fields
            .into_iter()
            .map(|field| {
                field
                    .0
                    .into_iter()
                    .map(crate::regexes::RegexPiece::from)
                    .collect::<Vec<_>>()
            })
            .intersperse(vec![crate::regexes::RegexPiece::Literal(" ".into())])
            .flatten()
            .collect();

        Ok(crate::regexes::RegexWord::from(pieces))
    }

    #[async_recursion::async_recursion]
    async fn expand_word_piece(&mut self, piece: WordPiece) -> Result<Expansion, Error> {
        let expansion = match piece {
            WordPiece::Text(s) => Expansion::from(ExpansionPiece::Splittable(s)),
            WordPiece::SingleQuotedText(s) => Expansion::from(ExpansionPiece::Unsplittable(s)),
            WordPiece::AnsiCQuotedText(s) => {
                let (expanded, _) =
                    escape::expand_backslash_escapes(s.as_str(), escape::EscapeMode::AnsiCQuotes)?;
                Expansion::from(ExpansionPiece::Unsplittable(
                    String::from_utf8_lossy(expanded.as_slice()).into_owned(),
                ))
            }
            WordPiece::DoubleQuotedSequence(pieces) => {
                let was_empty = pieces.is_empty();

                let previously_in_double_quotes = self.in_double_quotes;
                self.in_double_quotes = true;
                let result = self.expand_double_quoted_pieces(pieces).await;
                self.in_double_quotes = previously_in_double_quotes;

                let mut fields = result?;

                // `""` must survive as an empty (unsplittable) field.
                if was_empty {
                    fields.push(WordField::from(ExpansionPiece::Unsplittable(String::new())));
                }

                Expansion {
                    fields,
                    concatenate: false,
                    from_array: false,
                    undefined: false,
                }
            }
            WordPiece::TildePrefix(prefix) => Expansion::from(ExpansionPiece::Unsplittable(
                self.expand_tilde(prefix.as_str())?,
            )),
            WordPiece::ParameterExpansion(expr) => self.expand_parameter_expr(expr).await?,
            WordPiece::CommandSubstitution(s) | WordPiece::BackquotedCommandSubstitution(s) => {
                let output = commands::run_in_subshell_and_capture_output(
                    self.session,
                    self.params,
                    s.as_str(),
                )
                .await?;

                // Trailing newlines are stripped from substituted output.
                let trimmed = output.trim_end_matches('\n');
                Expansion::from(ExpansionPiece::Splittable(trimmed.to_owned()))
            }
            WordPiece::EscapeSequence(s) => {
                let unescaped = s.strip_prefix('\\').unwrap_or(s.as_str());
                Expansion::from(ExpansionPiece::Unsplittable(unescaped.to_owned()))
            }
            WordPiece::ArithmeticExpression(expr) => {
                let value = expr.eval(self.session, self.params).await?;
                Expansion::from(ExpansionPiece::Splittable(value.to_string()))
            }
        };

        Ok(expansion)
    }

    async fn expand_double_quoted_pieces(
        &mut self,
        pieces: Vec<WordPiece>,
    ) -> Result<Vec<WordField>, Error> {
        let mut fields: Vec<WordField> = vec![];
        let joiner = self.session.ifs_first_char();

        for piece in pieces {
            let Expansion {
                fields: this_fields,
                concatenate,
                ..
            } = self.expand_word_piece(piece).await?;

            let fields_to_append = if concatenate {
                // `"$*"`-style joining: one field, joined on IFS[0].
                #[allow(unstable_name_collisions)]
                let mut joined: Vec<ExpansionPiece> = this_fields
                    .into_iter()
                    .map(|WordField(pieces)| {
                        pieces
                            .into_iter()
                            .map(ExpansionPiece::make_unsplittable)
                            .collect::<Vec<_>>()
                    })
                    .intersperse(vec![ExpansionPiece::Unsplittable(joiner.to_string())])
                    .flatten()
                    .collect();

                if joined.is_empty() {
                    joined.push(ExpansionPiece::Splittable(String::new()));
                }

                vec![WordField(joined)]
            } else {
                this_fields
            };

            for (i, WordField(next_pieces)) in fields_to_append.into_iter().enumerate() {
                let mut next_pieces: Vec<_> = next_pieces
                    .into_iter()
                    .map(ExpansionPiece::make_unsplittable)
                    .collect();

                // The first new field continues the last existing one.
                if i == 0 {
                    if let Some(WordField(last_pieces)) = fields.last_mut() {
                        last_pieces.append(&mut next_pieces);
                        continue;
                    }
                }

                fields.push(WordField(next_pieces));
            }
        }

        Ok(fields)
    }

    fn expand_tilde(&self, prefix: &str) -> Result<String, Error> {
        if !prefix.is_empty() {
            Ok(sys::user_home_dir(prefix).map_or_else(
                || format!("~{prefix}"),
                |p| p.to_string_lossy().to_string(),
            ))
        } else if let Some(home) = self.session.env.get_str("HOME") {
            Ok(home.to_string())
        } else {
            Err(ErrorKind::TildeWithoutHome.into())
        }
    }

    /// Expands a word appearing inside a parameter expression (like the
    /// default in `${x:-word}`), respecting the surrounding quoting.
    async fn expand_parameter_word(&mut self, word: &str) -> Result<Expansion, Error> {
        if self.in_double_quotes {
            if let Some(stripped) = word.strip_prefix('"') {
                if let Some(inner) = stripped.strip_suffix('"') {
                    // An explicitly re-quoted word resets to normal semantics.
                    let previously = self.in_double_quotes;
                    self.in_double_quotes = false;
                    let result = self.basic_expand(inner).await;
                    self.in_double_quotes = previously;
                    return result;
                }
            }

            let wrapped = format!("\"{word}\"");
            self.basic_expand(wrapped.as_str()).await
        } else {
            self.basic_expand(word).await
        }
    }

    async fn basic_expand_opt_pattern(
        &mut self,
        pattern: Option<&String>,
    ) -> Result<Option<patterns::Pattern>, Error> {
        if let Some(pattern) = pattern {
            let expanded = self
                .basic_expand_pattern(pattern.as_str())
                .await?
                .set_extended_globbing(self.session.options.extglob);
            Ok(Some(expanded))
        } else {
            Ok(None)
        }
    }

    async fn expand_parameter_expr(&mut self, expr: ParameterExpr) -> Result<Expansion, Error> {
        match expr {
            ParameterExpr::Parameter {
                parameter,
                indirect,
            } => self.expand_parameter(&parameter, indirect).await,
            ParameterExpr::UseDefault {
                parameter,
                indirect,
                test_type,
                default_value,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let default_value = default_value.as_deref().unwrap_or("");

                match (test_type, expanded.classify()) {
                    (_, ParameterState::NonZeroLength)
                    | (ParameterTestType::Unset, ParameterState::DefinedEmptyString) => {
                        Ok(expanded)
                    }
                    _ => self.expand_parameter_word(default_value).await,
                }
            }
            ParameterExpr::AssignDefault {
                parameter,
                indirect,
                test_type,
                default_value,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let default_value = default_value.as_deref().unwrap_or("");

                match (test_type, expanded.classify()) {
                    (_, ParameterState::NonZeroLength)
                    | (ParameterTestType::Unset, ParameterState::DefinedEmptyString) => {
                        Ok(expanded)
                    }
                    _ => {
                        let expanded_default =
                            String::from(self.expand_parameter_word(default_value).await?);
                        self.assign_to_parameter(&parameter, expanded_default.clone())
                            .await?;
                        Ok(Expansion::from(expanded_default))
                    }
                }
            }
            ParameterExpr::ErrorIfUnset {
                parameter,
                indirect,
                test_type,
                error_message,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let message = error_message.as_deref().unwrap_or("parameter null or not set");

                match (test_type, expanded.classify()) {
                    (_, ParameterState::NonZeroLength)
                    | (ParameterTestType::Unset, ParameterState::DefinedEmptyString) => {
                        Ok(expanded)
                    }
                    _ => {
                        let message = self.basic_expand_to_str(message).await?;
                        Err(ErrorKind::CheckedExpansionError(format!(
                            "{parameter_name}: {message}",
                            parameter_name = parameter_to_name(&parameter)
                        ))
                        .into())
                    }
                }
            }
            ParameterExpr::UseAlternative {
                parameter,
                indirect,
                test_type,
                alternative_value,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let alternative = alternative_value.as_deref().unwrap_or("");

                match (test_type, expanded.classify()) {
                    (_, ParameterState::NonZeroLength)
                    | (ParameterTestType::Unset, ParameterState::DefinedEmptyString) => {
                        self.expand_parameter_word(alternative).await
                    }
                    _ => Ok(Expansion::from(String::new())),
                }
            }
            ParameterExpr::Length { parameter } => {
                let expanded = self.expand_parameter(&parameter, false).await?;
                Ok(Expansion::from(expanded.polymorphic_len().to_string()))
            }
            ParameterExpr::RemoveSmallestSuffix {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| {
                    patterns::remove_smallest_matching_suffix(s.as_str(), &pattern)
                        .map(|s| s.to_owned())
                })
            }
            ParameterExpr::RemoveLargestSuffix {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| {
                    patterns::remove_largest_matching_suffix(s.as_str(), &pattern)
                        .map(|s| s.to_owned())
                })
            }
            ParameterExpr::RemoveSmallestPrefix {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| {
                    patterns::remove_smallest_matching_prefix(s.as_str(), &pattern)
                        .map(|s| s.to_owned())
                })
            }
            ParameterExpr::RemoveLargestPrefix {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| {
                    patterns::remove_largest_matching_prefix(s.as_str(), &pattern)
                        .map(|s| s.to_owned())
                })
            }
            ParameterExpr::Substring {
                parameter,
                indirect,
                offset,
                length,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;

                #[allow(clippy::cast_possible_wrap)]
                let expanded_len = expanded.polymorphic_len() as i64;

                let mut offset = offset.eval(self.session, self.params).await?;
                if offset < 0 {
                    if expanded.from_array {
                        // Negative array offsets count back from the end.
                        offset += expanded_len;
                        if offset < 0 {
                            offset = expanded_len;
                        }
                    } else {
                        offset = 0;
                    }
                }
                let offset = min(offset, expanded_len);

                let end = if let Some(length) = length {
                    let mut length = length.eval(self.session, self.params).await?;
                    if length < 0 {
                        length += expanded_len;
                    }
                    let length = min(length.max(0), expanded_len - offset);
                    offset + length
                } else {
                    expanded_len
                };

                #[allow(clippy::cast_sign_loss)]
                Ok(expanded.polymorphic_subslice(offset as usize, end as usize))
            }
            ParameterExpr::Transform {
                parameter,
                indirect,
                op: TransformOp::ToAttributeFlags,
            } => {
                let name = if indirect {
                    String::from(self.expand_parameter(&parameter, false).await?)
                } else {
                    parameter_to_name(&parameter)
                };

                if let Some((_, var)) = self.session.env.get(name.as_str()) {
                    Ok(Expansion::from(var.attribute_flags()))
                } else {
                    Ok(Expansion::from(String::new()))
                }
            }
            ParameterExpr::Transform {
                parameter,
                indirect,
                op,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let undefined = expanded.undefined;

                let mut transformed_fields = vec![];
                for field in expanded.fields {
                    let s = String::from(field);
                    let transformed = apply_transform(op, s, undefined)?;
                    transformed_fields.push(WordField::from(transformed));
                }

                Ok(Expansion {
                    fields: transformed_fields,
                    concatenate: expanded.concatenate,
                    from_array: expanded.from_array,
                    undefined: expanded.undefined,
                })
            }
            ParameterExpr::UppercaseFirst {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| case_convert_first(s, &pattern, true))
            }
            ParameterExpr::UppercasePattern {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| case_convert_pattern(s.as_str(), &pattern, true))
            }
            ParameterExpr::LowercaseFirst {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| case_convert_first(s, &pattern, false))
            }
            ParameterExpr::LowercasePattern {
                parameter,
                indirect,
                pattern,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self.basic_expand_opt_pattern(pattern.as_ref()).await?;
                transform_expansion(expanded, |s| {
                    case_convert_pattern(s.as_str(), &pattern, false)
                })
            }
            ParameterExpr::Replace {
                parameter,
                indirect,
                pattern,
                replacement,
                match_kind,
            } => {
                let expanded = self.expand_parameter(&parameter, indirect).await?;
                let pattern = self
                    .basic_expand_pattern(pattern.as_str())
                    .await?
                    .set_extended_globbing(self.session.options.extglob);

                let replacement = replacement.unwrap_or_default();
                let replacement = self.basic_expand_to_str(replacement.as_str()).await?;

                let regex = pattern.to_regex(
                    matches!(match_kind, SubstringMatchKind::Prefix),
                    matches!(match_kind, SubstringMatchKind::Suffix),
                )?;

                transform_expansion(expanded, |s| {
                    let result = match match_kind {
                        SubstringMatchKind::Anywhere => {
                            regex.replace_all(s.as_str(), replacement.as_str())
                        }
                        _ => regex.replace(s.as_str(), replacement.as_str()),
                    };
                    Ok(result.into_owned())
                })
            }
            ParameterExpr::VariableNames {
                prefix,
                concatenate,
            } => {
                if prefix.is_empty() {
                    return Ok(Expansion::from(String::new()));
                }

                let names = self
                    .session
                    .env
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix.as_str()))
                    .map(|(name, _)| name.clone())
                    .sorted();

                Ok(Expansion {
                    fields: names
                        .into_iter()
                        .map(|name| WordField(vec![ExpansionPiece::Splittable(name)]))
                        .collect(),
                    concatenate,
                    from_array: true,
                    undefined: false,
                })
            }
            ParameterExpr::MemberKeys {
                variable_name,
                concatenate,
            } => {
                let keys = self
                    .session
                    .env
                    .get_resolving(variable_name.as_str())?
                    .map(|(_, var)| var.value().element_keys())
                    .unwrap_or_default();

                Ok(Expansion {
                    fields: keys
                        .into_iter()
                        .map(|key| WordField(vec![ExpansionPiece::Splittable(key)]))
                        .collect(),
                    concatenate,
                    from_array: true,
                    undefined: false,
                })
            }
        }
    }

    async fn assign_to_parameter(
        &mut self,
        parameter: &Parameter,
        value: String,
    ) -> Result<(), Error> {
        let (name, index) = match parameter {
            Parameter::Named(name) => (name, None),
            Parameter::NamedWithIndex { name, index } => {
                let is_assoc = self
                    .session
                    .env
                    .get_resolving(name.as_str())?
                    .is_some_and(|(_, var)| {
                        matches!(
                            var.value(),
                            VariableValue::Associative(_)
                                | VariableValue::Unset(UnsetKind::AssociativeArray)
                        )
                    });

                let index = self.expand_array_index(index.as_str(), is_assoc).await?;
                (name, Some(index))
            }
            Parameter::Positional(_)
            | Parameter::NamedWithAllIndices { .. }
            | Parameter::Special(_) => {
                return Err(ErrorKind::CannotAssignToSpecialParameter.into());
            }
        };

        if let Some(index) = index {
            self.session.env.update_or_add_array_element(
                name.as_str(),
                index,
                value,
                false,
                EnvironmentLookup::Anywhere,
                EnvironmentScope::Global,
            )
        } else {
            self.session.env.update_or_add(
                name.as_str(),
                ValueLiteral::Scalar(value),
                |_| Ok(()),
                EnvironmentLookup::Anywhere,
                EnvironmentScope::Global,
            )
        }
    }

    async fn expand_array_index(
        &mut self,
        index: &str,
        for_associative: bool,
    ) -> Result<String, Error> {
        if for_associative {
            self.basic_expand_to_str(index).await
        } else {
            Ok(arithmetic::expand_and_eval(self.session, self.params, index)
                .await?
                .to_string())
        }
    }

    async fn expand_parameter(
        &mut self,
        parameter: &Parameter,
        indirect: bool,
    ) -> Result<Expansion, Error> {
        let expansion = self.expand_parameter_without_indirect(parameter).await?;
        if !indirect {
            Ok(expansion)
        } else {
            let name: String = expansion.into();
            let inner = word::parse_parameter(name.as_str(), &self.parser_options)?;
            self.expand_parameter_without_indirect(&inner).await
        }
    }

    async fn expand_parameter_without_indirect(
        &mut self,
        parameter: &Parameter,
    ) -> Result<Expansion, Error> {
        match parameter {
            Parameter::Positional(p) => {
                if *p == 0 {
                    Ok(self.expand_special_parameter(SpecialParameter::ShellName))
                } else if let Some(value) =
                    self.session.positional_params.get((*p - 1) as usize)
                {
                    Ok(Expansion::from(value.clone()))
                } else {
                    self.undefined_or_error(format!("${p}").as_str())
                }
            }
            Parameter::Special(special) => Ok(self.expand_special_parameter(*special)),
            Parameter::Named(name) => {
                if !env::valid_variable_name(name.as_str()) {
                    return Err(ErrorKind::BadSubstitution(name.clone()).into());
                }

                match self.session.env.get_resolving(name.as_str())? {
                    Some((_, var)) if var.value().is_set() => {
                        let value = var.resolve_value(self.session);
                        match value.try_as_str() {
                            Some(value) => Ok(Expansion::from(value.to_string())),
                            None => self.undefined_or_error(name.as_str()),
                        }
                    }
                    _ => self.undefined_or_error(name.as_str()),
                }
            }
            Parameter::NamedWithIndex { name, index } => {
                let is_assoc = self
                    .session
                    .env
                    .get_resolving(name.as_str())?
                    .is_some_and(|(_, var)| {
                        matches!(
                            var.value(),
                            VariableValue::Associative(_)
                                | VariableValue::Unset(UnsetKind::AssociativeArray)
                        )
                    });

                let index = self.expand_array_index(index.as_str(), is_assoc).await?;

                match self.session.env.get_resolving(name.as_str())? {
                    Some((_, var)) => {
                        let resolved = var.resolve_value(self.session);
                        if let Ok(Some(value)) = resolved.get_at(index.as_str()) {
                            Ok(Expansion::from(value.to_string()))
                        } else {
                            self.undefined_or_error(name.as_str())
                        }
                    }
                    None => self.undefined_or_error(name.as_str()),
                }
            }
            Parameter::NamedWithAllIndices { name, concatenate } => {
                match self.session.env.get_resolving(name.as_str())? {
                    Some((_, var)) => {
                        let values = var.resolve_value(self.session).element_values();
                        Ok(Expansion {
                            fields: values
                                .into_iter()
                                .map(|v| WordField(vec![ExpansionPiece::Splittable(v)]))
                                .collect(),
                            concatenate: *concatenate,
                            from_array: true,
                            undefined: false,
                        })
                    }
                    None => Ok(Expansion {
                        fields: vec![],
                        concatenate: *concatenate,
                        from_array: true,
                        undefined: false,
                    }),
                }
            }
        }
    }

    /// Yields an undefined expansion, or fails under `set -u`.
    fn undefined_or_error(&self, name: &str) -> Result<Expansion, Error> {
        if self.session.options.nounset {
            Err(ErrorKind::UnboundVariable(name.to_owned()).into())
        } else {
            Ok(Expansion::undefined())
        }
    }

    fn expand_special_parameter(&self, parameter: SpecialParameter) -> Expansion {
        match parameter {
            SpecialParameter::AllPositionalParameters { concatenate } => Expansion {
                fields: self
                    .session
                    .positional_params
                    .iter()
                    .map(|p| WordField(vec![ExpansionPiece::Splittable(p.clone())]))
                    .collect(),
                concatenate,
                from_array: true,
                undefined: false,
            },
            SpecialParameter::PositionalParameterCount => {
                Expansion::from(self.session.positional_params.len().to_string())
            }
            SpecialParameter::LastExitStatus => {
                Expansion::from(self.session.last_exit_status.to_string())
            }
            SpecialParameter::CurrentOptionFlags => {
                Expansion::from(self.session.options.flag_string())
            }
            SpecialParameter::ProcessId => Expansion::from(std::process::id().to_string()),
            SpecialParameter::LastBackgroundProcessId => Expansion::from(
                self.session
                    .last_bg_pid
                    .map_or_else(String::new, |pid| pid.to_string()),
            ),
            SpecialParameter::ShellName => Expansion::from(
                self.session
                    .session_name
                    .clone()
                    .unwrap_or_else(|| String::from("husk")),
            ),
        }
    }
}

fn parameter_to_name(parameter: &Parameter) -> String {
    match parameter {
        Parameter::Positional(p) => p.to_string(),
        Parameter::Special(_) => String::new(),
        Parameter::Named(name) => name.clone(),
        Parameter::NamedWithIndex { name, index } => format!("{name}[{index}]"),
        Parameter::NamedWithAllIndices { name, .. } => name.clone(),
    }
}

fn apply_transform(op: TransformOp, s: String, undefined: bool) -> Result<String, Error> {
    match op {
        TransformOp::ToUpperCase => Ok(s.to_uppercase()),
        TransformOp::ToLowerCase => Ok(s.to_lowercase()),
        TransformOp::CapitalizeInitial => Ok(to_initial_capitals(s.as_str())),
        TransformOp::Quoted => {
            if undefined {
                Ok(String::new())
            } else {
                Ok(escape::force_quote(s.as_str(), escape::QuoteMode::SingleQuote))
            }
        }
        TransformOp::ExpandEscapes => {
            let (expanded, _) =
                escape::expand_backslash_escapes(s.as_str(), escape::EscapeMode::AnsiCQuotes)?;
            Ok(String::from_utf8_lossy(expanded.as_slice()).into_owned())
        }
        TransformOp::ToAttributeFlags => unreachable!("handled by the caller"),
    }
}

fn case_convert_first(
    s: String,
    pattern: &Option<patterns::Pattern>,
    upper: bool,
) -> Result<String, Error> {
    let Some(first) = s.chars().next() else {
        return Ok(s);
    };

    let applicable = match pattern {
        Some(pattern) => {
            pattern.is_empty() || pattern.exactly_matches(first.to_string().as_str())?
        }
        None => true,
    };

    if !applicable {
        return Ok(s);
    }

    let converted: String = if upper {
        first.to_uppercase().collect()
    } else {
        first.to_lowercase().collect()
    };

    let mut result = converted;
    result.push_str(&s[first.len_utf8()..]);
    Ok(result)
}

fn case_convert_pattern(
    s: &str,
    pattern: &Option<patterns::Pattern>,
    upper: bool,
) -> Result<String, Error> {
    match pattern {
        Some(pattern) if !pattern.is_empty() => {
            let regex = pattern.to_regex(false, false)?;
            let result = regex.replace_all(s, |caps: &fancy_regex::Captures<'_>| {
                if upper {
                    caps[0].to_uppercase()
                } else {
                    caps[0].to_lowercase()
                }
            });
            Ok(result.into_owned())
        }
        _ => {
            if upper {
                Ok(s.to_uppercase())
            } else {
                Ok(s.to_lowercase())
            }
        }
    }
}

fn to_initial_capitals(s: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = true;

    for c in s.chars() {
        if c.is_whitespace() {
            capitalize_next = true;
            result.push(c);
        } else if capitalize_next {
            result.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

fn coalesce_expansions(expansions: Vec<Expansion>) -> Expansion {
    expansions
        .into_iter()
        .fold(Expansion::default(), |mut acc, expansion| {
            for (i, mut field) in expansion.fields.into_iter().enumerate() {
                match acc.fields.last_mut() {
                    Some(last) if i == 0 => {
                        last.0.append(&mut field.0);
                    }
                    _ => acc.fields.push(field),
                }
            }

            acc.concatenate = expansion.concatenate;
            acc.from_array = expansion.from_array;

            acc
        })
}

fn transform_expansion(
    expansion: Expansion,
    mut f: impl FnMut(String) -> Result<String, Error>,
) -> Result<Expansion, Error> {
    let mut transformed_fields = vec![];
    for field in expansion.fields {
        transformed_fields.push(WordField::from(f(String::from(field))?));
    }

    Ok(Expansion {
        fields: transformed_fields,
        concatenate: expansion.concatenate,
        from_array: expansion.from_array,
        undefined: expansion.undefined,
    })
}

/// Generates the cross-product of text for the given brace-expansion pieces.
fn generate_brace_expansions(pieces: Vec<word::BraceExpressionOrText>) -> Vec<String> {
    let mut results = vec![String::new()];

    for piece in pieces {
        let alternatives: Vec<String> = match piece {
            word::BraceExpressionOrText::Text(text) => vec![text],
            word::BraceExpressionOrText::Expr(members) => members
                .into_iter()
                .flat_map(generate_brace_member)
                .collect(),
        };

        let mut next_results = Vec::with_capacity(results.len() * alternatives.len());
        for result in &results {
            for alternative in &alternatives {
                let mut combined = result.clone();
                combined.push_str(alternative);
                next_results.push(combined);
            }
        }
        results = next_results;
    }

    results
}

fn generate_brace_member(member: word::BraceExpressionMember) -> Vec<String> {
    match member {
        word::BraceExpressionMember::NumberSequence {
            start,
            end,
            increment,
        } => {
            let step = increment.unsigned_abs().max(1);
            if start <= end {
                (start..=end).step_by(step as usize).map(|n| n.to_string()).collect()
            } else {
                let mut values = vec![];
                let mut current = start;
                while current >= end {
                    values.push(current.to_string());
                    current -= step as i64;
                }
                values
            }
        }
        word::BraceExpressionMember::CharSequence {
            start,
            end,
            increment,
        } => {
            let step = increment.unsigned_abs().max(1) as usize;
            if start <= end {
                (start..=end).step_by(step).map(|c| c.to_string()).collect()
            } else {
                let mut values: Vec<String> =
                    (end..=start).map(|c| c.to_string()).collect();
                values.reverse();
                values.into_iter().step_by(step).collect()
            }
        }
        word::BraceExpressionMember::Child(pieces) => generate_brace_expansions(pieces),
    }
}

fn may_contain_braces_to_expand(s: &str) -> bool {
    // Imprecise pre-check: an unescaped, non-parameter `{` followed by a `}`.
    let mut last_was_dollar = false;
    let mut last_was_escape = false;
    let mut saw_opening = false;

    for c in s.chars() {
        if !last_was_dollar {
            if c == '{' {
                saw_opening = true;
            } else if c == '}' && saw_opening {
                return true;
            }
        }

        last_was_dollar = !last_was_escape && c == '$';
        last_was_escape = c == '\\';
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    async fn expand_in(session: &mut Session, s: &str) -> Result<Vec<String>> {
        let params = session.default_exec_params();
        Ok(full_expand_and_split_str(session, &params, s).await?)
    }

    #[tokio::test]
    async fn basic_field_splitting() -> Result<()> {
        let mut session = Session::new()?;

        assert_eq!(expand_in(&mut session, "a b").await?, ["a", "b"]);
        assert_eq!(expand_in(&mut session, "ab").await?, ["ab"]);
        assert_eq!(expand_in(&mut session, "\"a b\"").await?, ["a b"]);
        assert_eq!(expand_in(&mut session, "\"\"").await?, [""]);
        assert_eq!(expand_in(&mut session, "").await?, Vec::<String>::new());

        Ok(())
    }

    #[tokio::test]
    async fn parameter_expansion_basics() -> Result<()> {
        let mut session = Session::new()?;
        session.env.set_global("x", "hello world")?;

        assert_eq!(
            expand_in(&mut session, "$x").await?,
            ["hello", "world"]
        );
        assert_eq!(expand_in(&mut session, "\"$x\"").await?, ["hello world"]);
        assert_eq!(expand_in(&mut session, "${#x}").await?, ["11"]);
        assert_eq!(expand_in(&mut session, "${x:0:5}").await?, ["hello"]);
        assert_eq!(expand_in(&mut session, "${x^^}").await?, ["HELLO", "WORLD"]);
        assert_eq!(
            expand_in(&mut session, "${x/world/there}").await?,
            ["hello", "there"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn default_and_alternative_values() -> Result<()> {
        let mut session = Session::new()?;
        session.env.set_global("set_var", "value")?;
        session.env.set_global("empty_var", "")?;

        assert_eq!(expand_in(&mut session, "${unset_var:-dflt}").await?, ["dflt"]);
        assert_eq!(expand_in(&mut session, "${empty_var:-dflt}").await?, ["dflt"]);
        assert_eq!(
            expand_in(&mut session, "${empty_var-dflt}").await?,
            Vec::<String>::new()
        );
        assert_eq!(expand_in(&mut session, "${set_var:+alt}").await?, ["alt"]);
        assert_eq!(
            expand_in(&mut session, "${unset_var:+alt}").await?,
            Vec::<String>::new()
        );

        // := assigns.
        assert_eq!(expand_in(&mut session, "${assigned:=now}").await?, ["now"]);
        assert_eq!(session.env.get_str("assigned").unwrap(), "now");

        Ok(())
    }

    #[tokio::test]
    async fn positional_parameters_expand() -> Result<()> {
        let mut session = Session::new()?;
        session.positional_params = vec!["one".into(), "two words".into()];

        assert_eq!(expand_in(&mut session, "$1").await?, ["one"]);
        assert_eq!(expand_in(&mut session, "$#").await?, ["2"]);
        assert_eq!(
            expand_in(&mut session, "\"$@\"").await?,
            ["one", "two words"]
        );
        assert_eq!(
            expand_in(&mut session, "\"$*\"").await?,
            ["one two words"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn array_expansion() -> Result<()> {
        let mut session = Session::new()?;
        session.env.update_or_add(
            "arr",
            ValueLiteral::Array(crate::variables::ArrayLiteral(vec![
                (None, "a".into()),
                (None, "b c".into()),
            ])),
            |_| Ok(()),
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )?;

        assert_eq!(expand_in(&mut session, "${arr[0]}").await?, ["a"]);
        assert_eq!(expand_in(&mut session, "\"${arr[@]}\"").await?, ["a", "b c"]);
        assert_eq!(expand_in(&mut session, "${#arr[@]}").await?, ["2"]);
        assert_eq!(expand_in(&mut session, "${!arr[@]}").await?, ["0", "1"]);

        Ok(())
    }

    #[tokio::test]
    async fn tilde_expansion_uses_home() -> Result<()> {
        let mut session = Session::new()?;
        session.env.set_global("HOME", "/home/test")?;

        assert_eq!(expand_in(&mut session, "~").await?, ["/home/test"]);
        assert_eq!(expand_in(&mut session, "~/docs").await?, ["/home/test/docs"]);

        Ok(())
    }

    #[tokio::test]
    async fn arithmetic_expansion() -> Result<()> {
        let mut session = Session::new()?;

        assert_eq!(expand_in(&mut session, "$((2 + 3 * 4))").await?, ["14"]);
        assert_eq!(expand_in(&mut session, "$((2 ** 10))").await?, ["1024"]);

        Ok(())
    }

    #[tokio::test]
    async fn nounset_reports_unset() -> Result<()> {
        let mut session = Session::new()?;
        session.options.nounset = true;

        assert!(expand_in(&mut session, "$does_not_exist").await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn brace_expansion_products() -> Result<()> {
        let mut session = Session::new()?;

        assert_eq!(
            expand_in(&mut session, "a{b,c}d").await?,
            ["abd", "acd"]
        );
        assert_eq!(
            expand_in(&mut session, "{1..3}").await?,
            ["1", "2", "3"]
        );
        assert_eq!(
            expand_in(&mut session, "{a..c}x").await?,
            ["ax", "bx", "cx"]
        );

        Ok(())
    }

    #[test]
    fn initial_capitals() {
        assert_eq!(to_initial_capitals("ab bc cd"), "Ab Bc Cd");
        assert_eq!(to_initial_capitals(" a "), " A ");
        assert_eq!(to_initial_capitals(""), "");
    }
}
