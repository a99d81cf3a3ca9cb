//! Parser for the internal structure of shell words: quoting, tilde prefixes,
//! parameter expansion expressions, command/arithmetic substitution, and brace
//! expressions. Used by the expansion engine.

use crate::ParserOptions;
use crate::ast;
use crate::error;

/// One piece of a word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WordPiece {
    /// Unquoted, unescaped text.
    Text(String),
    /// Text inside single quotes.
    SingleQuotedText(String),
    /// Text inside `$'...'` quotes, with escapes not yet decoded.
    AnsiCQuotedText(String),
    /// A sequence of pieces inside double quotes. `$"..."` sequences are
    /// treated identically (no translation catalogs).
    DoubleQuotedSequence(Vec<WordPiece>),
    /// A tilde prefix (without the tilde).
    TildePrefix(String),
    /// A parameter expansion.
    ParameterExpansion(ParameterExpr),
    /// A `$(...)` command substitution, holding the command source.
    CommandSubstitution(String),
    /// A backquoted command substitution.
    BackquotedCommandSubstitution(String),
    /// A backslash escape sequence.
    EscapeSequence(String),
    /// An arithmetic expansion.
    ArithmeticExpression(ast::UnexpandedArithmeticExpr),
}

/// The kind of test applied by conditional parameter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterTestType {
    /// `:`-prefixed operators: test for unset or null.
    UnsetOrNull,
    /// Test for unset only.
    Unset,
}

/// A parameter that can be expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parameter {
    /// A positional parameter (`$1` and up).
    Positional(u32),
    /// A special parameter.
    Special(SpecialParameter),
    /// A named variable.
    Named(String),
    /// An indexed element of a named variable.
    NamedWithIndex {
        /// The variable name.
        name: String,
        /// The unexpanded index text.
        index: String,
    },
    /// All elements of a named array.
    NamedWithAllIndices {
        /// The variable name.
        name: String,
        /// Whether elements join into one word (`[*]`) or stay separate (`[@]`).
        concatenate: bool,
    },
}

/// A special (non-named, non-positional) parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialParameter {
    /// `$@` / `$*`
    AllPositionalParameters {
        /// Whether the parameters join into one word.
        concatenate: bool,
    },
    /// `$#`
    PositionalParameterCount,
    /// `$?`
    LastExitStatus,
    /// `$-`
    CurrentOptionFlags,
    /// `$$`
    ProcessId,
    /// `$!`
    LastBackgroundProcessId,
    /// `$0`
    ShellName,
}

/// A parameter expansion expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterExpr {
    /// `${name}` / `${!name}`.
    Parameter {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is dereferenced a second time (`${!name}`).
        indirect: bool,
    },
    /// `${name:-word}` / `${name-word}`.
    UseDefault {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The test applied to decide whether the default is used.
        test_type: ParameterTestType,
        /// The default value.
        default_value: Option<String>,
    },
    /// `${name:=word}` / `${name=word}`.
    AssignDefault {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The test applied to decide whether the default is assigned.
        test_type: ParameterTestType,
        /// The default value.
        default_value: Option<String>,
    },
    /// `${name:?word}` / `${name?word}`.
    ErrorIfUnset {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The test applied to decide whether to error.
        test_type: ParameterTestType,
        /// The error message.
        error_message: Option<String>,
    },
    /// `${name:+word}` / `${name+word}`.
    UseAlternative {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The test applied to decide whether the alternative is used.
        test_type: ParameterTestType,
        /// The alternative value.
        alternative_value: Option<String>,
    },
    /// `${#name}`.
    Length {
        /// The parameter.
        parameter: Parameter,
    },
    /// `${name%pattern}`.
    RemoveSmallestSuffix {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern to remove.
        pattern: Option<String>,
    },
    /// `${name%%pattern}`.
    RemoveLargestSuffix {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern to remove.
        pattern: Option<String>,
    },
    /// `${name#pattern}`.
    RemoveSmallestPrefix {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern to remove.
        pattern: Option<String>,
    },
    /// `${name##pattern}`.
    RemoveLargestPrefix {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern to remove.
        pattern: Option<String>,
    },
    /// `${name:offset[:length]}`.
    Substring {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The offset expression.
        offset: ast::UnexpandedArithmeticExpr,
        /// The optional length expression.
        length: Option<ast::UnexpandedArithmeticExpr>,
    },
    /// `${name@op}`.
    Transform {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The transformation to apply.
        op: TransformOp,
    },
    /// `${name^pattern}`.
    UppercaseFirst {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern the first character must match.
        pattern: Option<String>,
    },
    /// `${name^^pattern}`.
    UppercasePattern {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern matched characters must match.
        pattern: Option<String>,
    },
    /// `${name,pattern}`.
    LowercaseFirst {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern the first character must match.
        pattern: Option<String>,
    },
    /// `${name,,pattern}`.
    LowercasePattern {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern matched characters must match.
        pattern: Option<String>,
    },
    /// `${name/pattern/replacement}` and variants.
    Replace {
        /// The parameter.
        parameter: Parameter,
        /// Whether the expansion is indirect.
        indirect: bool,
        /// The pattern to replace.
        pattern: String,
        /// The replacement text.
        replacement: Option<String>,
        /// Where within the value the pattern must match.
        match_kind: SubstringMatchKind,
    },
    /// `${!prefix*}` / `${!prefix@}`.
    VariableNames {
        /// The prefix to match.
        prefix: String,
        /// Whether the names join into one word.
        concatenate: bool,
    },
    /// `${!name[*]}` / `${!name[@]}`.
    MemberKeys {
        /// The array variable name.
        variable_name: String,
        /// Whether the keys join into one word.
        concatenate: bool,
    },
}

/// Where a replacement pattern is anchored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubstringMatchKind {
    /// `${name/#pattern/...}`: anchored at the start.
    Prefix,
    /// `${name/%pattern/...}`: anchored at the end.
    Suffix,
    /// `${name/pattern/...}`: first occurrence.
    FirstOccurrence,
    /// `${name//pattern/...}`: every occurrence.
    Anywhere,
}

/// A `${name@op}` transformation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformOp {
    /// `@U`
    ToUpperCase,
    /// `@u`
    CapitalizeInitial,
    /// `@L`
    ToLowerCase,
    /// `@Q`
    Quoted,
    /// `@E`
    ExpandEscapes,
    /// `@a`
    ToAttributeFlags,
}

/// A sub-word that is either a brace expression or plain text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BraceExpressionOrText {
    /// A brace expression.
    Expr(BraceExpression),
    /// Plain text.
    Text(String),
}

/// A brace expression to be expanded.
pub type BraceExpression = Vec<BraceExpressionMember>;

/// One member of a brace expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BraceExpressionMember {
    /// An inclusive numeric sequence.
    NumberSequence {
        /// First value.
        start: i64,
        /// Last value (inclusive).
        end: i64,
        /// Step.
        increment: i64,
    },
    /// An inclusive character sequence.
    CharSequence {
        /// First character.
        start: char,
        /// Last character (inclusive).
        end: char,
        /// Step.
        increment: i64,
    },
    /// Nested text and/or brace expressions.
    Child(Vec<BraceExpressionOrText>),
}

/// Parses a word into its constituent pieces.
pub fn parse(word: &str, options: &ParserOptions) -> Result<Vec<WordPiece>, error::WordParseError> {
    cacheable_parse(word.to_owned(), options.clone())
}

#[cached::proc_macro::cached(size = 64, result = true)]
fn cacheable_parse(
    word: String,
    options: ParserOptions,
) -> Result<Vec<WordPiece>, error::WordParseError> {
    tracing::debug!(target: "expansion", "parsing word '{word}'");

    expansion_parser::unexpanded_word(word.as_str(), &options)
        .map_err(|err| error::WordParseError::Word(word.clone(), err.into()))
}

/// Parses a string as a parameter reference (e.g. the argument of `printf -v`).
pub fn parse_parameter(
    word: &str,
    options: &ParserOptions,
) -> Result<Parameter, error::WordParseError> {
    expansion_parser::parameter(word, options)
        .map_err(|err| error::WordParseError::Parameter(word.to_owned(), err.into()))
}

/// Parses any brace expansions present in the given word; `None` if the word
/// contains none.
pub fn parse_brace_expansions(
    word: &str,
    options: &ParserOptions,
) -> Result<Option<Vec<BraceExpressionOrText>>, error::WordParseError> {
    expansion_parser::brace_expansions(word, options)
        .map_err(|err| error::WordParseError::BraceExpansion(word.to_owned(), err.into()))
}

peg::parser! {
    grammar expansion_parser(parser_options: &ParserOptions) for str {
        pub(crate) rule unexpanded_word() -> Vec<WordPiece> = word(<![_]>)

        rule word<T>(stop_condition: rule<T>) -> Vec<WordPiece> =
            tilde:tilde_prefix()? pieces:word_piece(<stop_condition()>, false)* {
                let mut all_pieces = Vec::new();
                if let Some(tilde) = tilde {
                    all_pieces.push(tilde);
                }
                all_pieces.extend(pieces);
                all_pieces
            }

        pub(crate) rule brace_expansions() -> Option<Vec<BraceExpressionOrText>> =
            pieces:(brace_expansion_piece(<![_]>)+) { Some(pieces) } /
            [_]* { None }

        rule brace_expansion_piece<T>(stop_condition: rule<T>) -> BraceExpressionOrText =
            expr:brace_expr() { BraceExpressionOrText::Expr(expr) } /
            text:$(non_brace_expr_text(<stop_condition()>)+) { BraceExpressionOrText::Text(text.to_owned()) }

        rule non_brace_expr_text<T>(stop_condition: rule<T>) -> () =
            !"{" word_piece(<['{'] {} / stop_condition() {}>, false) {} /
            !brace_expr() !stop_condition() "{" {}

        pub(crate) rule brace_expr() -> BraceExpression =
            "{" inner:brace_expr_inner() "}" { inner }

        rule brace_expr_inner() -> BraceExpression =
            brace_text_list_expr() /
            seq:brace_sequence_expr() { vec![seq] }

        rule brace_text_list_expr() -> BraceExpression =
            brace_text_list_member() **<2,> ","

        rule brace_text_list_member() -> BraceExpressionMember =
            // An empty member, delimited by the comma or closing brace.
            &[',' | '}'] { BraceExpressionMember::Child(vec![BraceExpressionOrText::Text(String::new())]) } /
            child_pieces:(brace_expansion_piece(<[',' | '}']>)+) {
                BraceExpressionMember::Child(child_pieces)
            }

        rule brace_sequence_expr() -> BraceExpressionMember =
            start:number() ".." end:number() increment:(".." n:number() { n })? {
                BraceExpressionMember::NumberSequence { start, end, increment: increment.unwrap_or(1) }
            } /
            start:character() ".." end:character() increment:(".." n:number() { n })? {
                BraceExpressionMember::CharSequence { start, end, increment: increment.unwrap_or(1) }
            }

        rule number() -> i64 =
            sign:number_sign()? n:$(['0'..='9']+) {?
                let n: i64 = n.parse().or(Err("i64"))?;
                Ok(n * sign.unwrap_or(1))
            }

        rule number_sign() -> i64 =
            ['-'] { -1 } /
            ['+'] { 1 }

        rule character() -> char = ['a'..='z' | 'A'..='Z']

        // An arithmetic word needs to balance any nested parentheses while
        // stopping at the enclosing construct's terminator.
        rule arithmetic_word<T>(stop_condition: rule<T>) =
            arithmetic_word_piece(<stop_condition()>)* {}

        rule arithmetic_word_piece<T>(stop_condition: rule<T>) =
            "(" arithmetic_word_plus_right_paren() {} /
            !"(" word_piece(<stop_condition() {} / "(" {}>, false) {}

        rule arithmetic_word_plus_right_paren() =
            arithmetic_word(<[')']>) ")"

        rule word_piece<T>(stop_condition: rule<T>, in_command: bool) -> WordPiece =
            s:double_quoted_sequence() { WordPiece::DoubleQuotedSequence(s) } /
            s:single_quoted_text() { WordPiece::SingleQuotedText(s.to_owned()) } /
            s:ansi_c_quoted_text() { WordPiece::AnsiCQuotedText(s.to_owned()) } /
            s:gettext_double_quoted_sequence() { WordPiece::DoubleQuotedSequence(s) } /
            arithmetic_expansion() /
            command_substitution() /
            parameter_expansion() /
            normal_escape_sequence() /
            unquoted_literal_text(<stop_condition()>, in_command)

        rule double_quoted_word_piece() -> WordPiece =
            arithmetic_expansion() /
            command_substitution() /
            parameter_expansion() /
            double_quoted_escape_sequence() /
            double_quoted_text()

        rule double_quoted_sequence() -> Vec<WordPiece> =
            "\"" pieces:double_quoted_word_piece()* "\"" { pieces }

        rule gettext_double_quoted_sequence() -> Vec<WordPiece> =
            "$\"" pieces:double_quoted_word_piece()* "\"" { pieces }

        rule single_quoted_text() -> &'input str =
            "\'" inner:$([^'\'']*) "\'" { inner }

        rule ansi_c_quoted_text() -> &'input str =
            "$\'" inner:$(("\\'" / [^'\''])*) "\'" { inner }

        rule unquoted_literal_text<T>(stop_condition: rule<T>, in_command: bool) -> WordPiece =
            s:$(unquoted_literal_text_piece(<stop_condition()>, in_command)+) { WordPiece::Text(s.to_owned()) }

        rule unquoted_literal_text_piece<T>(stop_condition: rule<T>, in_command: bool) =
            is_true(in_command) extglob_pattern() /
            is_true(in_command) subshell_command() /
            !stop_condition() !normal_escape_sequence() [^'$' | '\'' | '\"' | '`'] {}

        rule is_true(value: bool) = &[_] {? if value { Ok(()) } else { Err("not true") } }

        rule extglob_pattern() =
            extglob_enabled() ("@" / "!" / "?" / "+" / "*") "(" extglob_body_piece()* ")" {}

        rule extglob_body_piece() =
            word_piece(<[')']>, true) {}

        rule subshell_command() =
            "(" command() ")" {}

        rule double_quoted_text() -> WordPiece =
            s:$((!double_quoted_escape_sequence() [^'$' | '\"' | '`'])+) { WordPiece::Text(s.to_owned()) }

        rule normal_escape_sequence() -> WordPiece =
            s:$("\\" [_]) { WordPiece::EscapeSequence(s.to_owned()) }

        rule double_quoted_escape_sequence() -> WordPiece =
            s:$("\\" ['$' | '`' | '\"' | '\'' | '\\']) { WordPiece::EscapeSequence(s.to_owned()) }

        rule tilde_prefix() -> WordPiece =
            tilde_parsing_enabled() "~" cs:$((![ '/' | ':' | ';' ] [_])*) { WordPiece::TildePrefix(cs.to_owned()) }

        rule parameter_expansion() -> WordPiece =
            "${" e:parameter_expression() "}" {
                WordPiece::ParameterExpansion(e)
            } /
            "$" parameter:unbraced_parameter() {
                WordPiece::ParameterExpansion(ParameterExpr::Parameter { parameter, indirect: false })
            } /
            "$" !['\''] {
                WordPiece::Text("$".to_owned())
            }

        rule parameter_expression() -> ParameterExpr =
            indirect:parameter_indirection() parameter:parameter() test_type:parameter_test_type() "-" default_value:parameter_expression_word()? {
                ParameterExpr::UseDefault { parameter, indirect, test_type, default_value }
            } /
            indirect:parameter_indirection() parameter:parameter() test_type:parameter_test_type() "=" default_value:parameter_expression_word()? {
                ParameterExpr::AssignDefault { parameter, indirect, test_type, default_value }
            } /
            indirect:parameter_indirection() parameter:parameter() test_type:parameter_test_type() "?" error_message:parameter_expression_word()? {
                ParameterExpr::ErrorIfUnset { parameter, indirect, test_type, error_message }
            } /
            indirect:parameter_indirection() parameter:parameter() test_type:parameter_test_type() "+" alternative_value:parameter_expression_word()? {
                ParameterExpr::UseAlternative { parameter, indirect, test_type, alternative_value }
            } /
            "#" parameter:parameter() {
                ParameterExpr::Length { parameter }
            } /
            indirect:parameter_indirection() parameter:parameter() "%%" pattern:parameter_expression_word()? {
                ParameterExpr::RemoveLargestSuffix { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() "%" pattern:parameter_expression_word()? {
                ParameterExpr::RemoveSmallestSuffix { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() "##" pattern:parameter_expression_word()? {
                ParameterExpr::RemoveLargestPrefix { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() "#" pattern:parameter_expression_word()? {
                ParameterExpr::RemoveSmallestPrefix { parameter, indirect, pattern }
            } /
            e:extended_parameter_expression() { e } /
            indirect:parameter_indirection() parameter:parameter() {
                ParameterExpr::Parameter { parameter, indirect }
            }

        rule parameter_test_type() -> ParameterTestType =
            colon:":"? {
                if colon.is_some() {
                    ParameterTestType::UnsetOrNull
                } else {
                    ParameterTestType::Unset
                }
            }

        rule extended_parameter_expression() -> ParameterExpr =
            "!" variable_name:variable_name() "[*]" {
                ParameterExpr::MemberKeys { variable_name: variable_name.to_owned(), concatenate: true }
            } /
            "!" variable_name:variable_name() "[@]" {
                ParameterExpr::MemberKeys { variable_name: variable_name.to_owned(), concatenate: false }
            } /
            indirect:parameter_indirection() parameter:parameter() ":" offset:substring_offset() length:(":" l:substring_length() { l })? {
                ParameterExpr::Substring { parameter, indirect, offset, length }
            } /
            indirect:parameter_indirection() parameter:parameter() "@" op:transform_op() {
                ParameterExpr::Transform { parameter, indirect, op }
            } /
            "!" prefix:variable_name() "*" {
                ParameterExpr::VariableNames { prefix: prefix.to_owned(), concatenate: true }
            } /
            "!" prefix:variable_name() "@" {
                ParameterExpr::VariableNames { prefix: prefix.to_owned(), concatenate: false }
            } /
            indirect:parameter_indirection() parameter:parameter() "/#" pattern:parameter_search_pattern() replacement:parameter_replacement_str()? {
                ParameterExpr::Replace { parameter, indirect, pattern, replacement, match_kind: SubstringMatchKind::Prefix }
            } /
            indirect:parameter_indirection() parameter:parameter() "/%" pattern:parameter_search_pattern() replacement:parameter_replacement_str()? {
                ParameterExpr::Replace { parameter, indirect, pattern, replacement, match_kind: SubstringMatchKind::Suffix }
            } /
            indirect:parameter_indirection() parameter:parameter() "//" pattern:parameter_search_pattern() replacement:parameter_replacement_str()? {
                ParameterExpr::Replace { parameter, indirect, pattern, replacement, match_kind: SubstringMatchKind::Anywhere }
            } /
            indirect:parameter_indirection() parameter:parameter() "/" pattern:parameter_search_pattern() replacement:parameter_replacement_str()? {
                ParameterExpr::Replace { parameter, indirect, pattern, replacement, match_kind: SubstringMatchKind::FirstOccurrence }
            } /
            indirect:parameter_indirection() parameter:parameter() "^^" pattern:parameter_expression_word()? {
                ParameterExpr::UppercasePattern { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() "^" pattern:parameter_expression_word()? {
                ParameterExpr::UppercaseFirst { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() ",," pattern:parameter_expression_word()? {
                ParameterExpr::LowercasePattern { parameter, indirect, pattern }
            } /
            indirect:parameter_indirection() parameter:parameter() "," pattern:parameter_expression_word()? {
                ParameterExpr::LowercaseFirst { parameter, indirect, pattern }
            }

        rule parameter_indirection() -> bool =
            "!" { true } /
            { false }

        rule transform_op() -> TransformOp =
            "U" { TransformOp::ToUpperCase } /
            "u" { TransformOp::CapitalizeInitial } /
            "L" { TransformOp::ToLowerCase } /
            "Q" { TransformOp::Quoted } /
            "E" { TransformOp::ExpandEscapes } /
            "a" { TransformOp::ToAttributeFlags }

        rule unbraced_parameter() -> Parameter =
            p:unbraced_positional_parameter() { Parameter::Positional(p) } /
            p:special_parameter() { Parameter::Special(p) } /
            p:variable_name() { Parameter::Named(p.to_owned()) }

        pub(crate) rule parameter() -> Parameter =
            p:positional_parameter() { Parameter::Positional(p) } /
            p:special_parameter() { Parameter::Special(p) } /
            p:variable_name() "[@]" { Parameter::NamedWithAllIndices { name: p.to_owned(), concatenate: false } } /
            p:variable_name() "[*]" { Parameter::NamedWithAllIndices { name: p.to_owned(), concatenate: true } } /
            p:variable_name() "[" index:$(arithmetic_word(<"]">)) "]" {
                Parameter::NamedWithIndex { name: p.to_owned(), index: index.to_owned() }
            } /
            p:variable_name() { Parameter::Named(p.to_owned()) }

        rule positional_parameter() -> u32 =
            n:$(['1'..='9'] ['0'..='9']*) {? n.parse().or(Err("u32")) }

        rule unbraced_positional_parameter() -> u32 =
            n:$(['1'..='9']) {? n.parse().or(Err("u32")) }

        rule special_parameter() -> SpecialParameter =
            "@" { SpecialParameter::AllPositionalParameters { concatenate: false } } /
            "*" { SpecialParameter::AllPositionalParameters { concatenate: true } } /
            "#" { SpecialParameter::PositionalParameterCount } /
            "?" { SpecialParameter::LastExitStatus } /
            "-" { SpecialParameter::CurrentOptionFlags } /
            "$" { SpecialParameter::ProcessId } /
            "!" { SpecialParameter::LastBackgroundProcessId } /
            "0" { SpecialParameter::ShellName }

        rule variable_name() -> &'input str =
            $(!['0'..='9'] ['_' | '0'..='9' | 'a'..='z' | 'A'..='Z']+)

        pub(crate) rule command_substitution() -> WordPiece =
            "$(" c:command() ")" { WordPiece::CommandSubstitution(c.to_owned()) } /
            "`" c:backquoted_command() "`" { WordPiece::BackquotedCommandSubstitution(c) }

        pub(crate) rule command() -> &'input str =
            $(command_piece()*)

        pub(crate) rule command_piece() -> () =
            word_piece(<[')']>, true) {} /
            ([' ' | '\t'])+ {}

        rule backquoted_command() -> String =
            chars:(backquoted_char()*) { chars.into_iter().collect() }

        rule backquoted_char() -> &'input str =
            "\\`" { "`" } /
            "\\\\" { "\\\\" } /
            s:$([^'`']) { s }

        rule arithmetic_expansion() -> WordPiece =
            "$((" e:$(arithmetic_word(<"))">)) "))" {
                WordPiece::ArithmeticExpression(ast::UnexpandedArithmeticExpr { text: e.to_owned() })
            }

        rule substring_offset() -> ast::UnexpandedArithmeticExpr =
            s:$(arithmetic_word(<[':' | '}']>)) { ast::UnexpandedArithmeticExpr { text: s.to_owned() } }

        rule substring_length() -> ast::UnexpandedArithmeticExpr =
            s:$(arithmetic_word(<[':' | '}']>)) { ast::UnexpandedArithmeticExpr { text: s.to_owned() } }

        rule parameter_replacement_str() -> String =
            "/" s:$(word(<['}']>)) { s.to_owned() }

        rule parameter_search_pattern() -> String =
            s:$(word(<['}' | '/']>)) { s.to_owned() }

        rule parameter_expression_word() -> String =
            s:$(word(<['}']>)) { s.to_owned() }

        rule extglob_enabled() -> () =
            &[_] {? if parser_options.enable_extended_globbing { Ok(()) } else { Err("no extglob") } }

        rule tilde_parsing_enabled() -> () =
            &[_] {? if parser_options.tilde_expansion { Ok(()) } else { Err("no tilde expansion") } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn parse_default(word: &str) -> Result<Vec<WordPiece>> {
        Ok(parse(word, &ParserOptions::default())?)
    }

    #[test]
    fn parse_plain_text() -> Result<()> {
        assert_eq!(
            parse_default("hello")?,
            vec![WordPiece::Text("hello".into())]
        );
        Ok(())
    }

    #[test]
    fn parse_single_quoted() -> Result<()> {
        assert_eq!(
            parse_default("'a b'")?,
            vec![WordPiece::SingleQuotedText("a b".into())]
        );
        Ok(())
    }

    #[test]
    fn parse_ansi_c_quoted() -> Result<()> {
        assert_eq!(
            parse_default(r"$'hi\nthere'")?,
            vec![WordPiece::AnsiCQuotedText(r"hi\nthere".into())]
        );
        Ok(())
    }

    #[test]
    fn parse_double_quoted_with_parameter() -> Result<()> {
        let pieces = parse_default(r#""a ${b} c""#)?;
        assert_eq!(pieces.len(), 1);
        let WordPiece::DoubleQuotedSequence(inner) = &pieces[0] else {
            anyhow::bail!("expected double-quoted sequence");
        };
        assert_eq!(inner.len(), 3);
        assert!(matches!(inner[1], WordPiece::ParameterExpansion(_)));
        Ok(())
    }

    #[test]
    fn parse_tilde_prefix() -> Result<()> {
        assert_eq!(
            parse_default("~/docs")?,
            vec![
                WordPiece::TildePrefix(String::new()),
                WordPiece::Text("/docs".into())
            ]
        );
        assert_eq!(
            parse_default("~alice/docs")?,
            vec![
                WordPiece::TildePrefix("alice".into()),
                WordPiece::Text("/docs".into())
            ]
        );
        Ok(())
    }

    #[test]
    fn parse_command_substitution() -> Result<()> {
        assert_eq!(
            parse_default("$(echo hi)")?,
            vec![WordPiece::CommandSubstitution("echo hi".into())]
        );
        assert_eq!(
            parse_default("`echo hi`")?,
            vec![WordPiece::BackquotedCommandSubstitution("echo hi".into())]
        );
        Ok(())
    }

    #[test]
    fn parse_command_substitution_with_quotes() -> Result<()> {
        assert_eq!(
            parse_default(r#"$(echo "hi")"#)?,
            vec![WordPiece::CommandSubstitution(r#"echo "hi""#.into())]
        );
        Ok(())
    }

    #[test]
    fn parse_arithmetic_expansion() -> Result<()> {
        assert_eq!(
            parse_default("$((1+2))")?,
            vec![WordPiece::ArithmeticExpression(
                ast::UnexpandedArithmeticExpr {
                    text: "1+2".into()
                }
            )]
        );
        assert_eq!(
            parse_default("$((((1+2)*3)))")?,
            vec![WordPiece::ArithmeticExpression(
                ast::UnexpandedArithmeticExpr {
                    text: "((1+2)*3)".into()
                }
            )]
        );
        Ok(())
    }

    #[test]
    fn parse_parameter_operators() -> Result<()> {
        let pieces = parse_default("${x:-default}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::UseDefault {
                test_type: ParameterTestType::UnsetOrNull,
                ..
            })
        ));

        let pieces = parse_default("${#x}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::Length { .. })
        ));

        let pieces = parse_default("${x##*/}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::RemoveLargestPrefix { .. })
        ));

        let pieces = parse_default("${x//a/b}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::Replace {
                match_kind: SubstringMatchKind::Anywhere,
                ..
            })
        ));

        let pieces = parse_default("${x^^}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::UppercasePattern { .. })
        ));

        Ok(())
    }

    #[test]
    fn parse_indirection_and_name_enumeration() -> Result<()> {
        let pieces = parse_default("${!x}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::Parameter { indirect: true, .. })
        ));

        let pieces = parse_default("${!PRE*}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::VariableNames { concatenate: true, .. })
        ));

        let pieces = parse_default("${!arr[@]}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::MemberKeys { concatenate: false, .. })
        ));

        Ok(())
    }

    #[test]
    fn parse_array_references() -> Result<()> {
        let pieces = parse_default("${arr[@]}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::Parameter {
                parameter: Parameter::NamedWithAllIndices { concatenate: false, .. },
                ..
            })
        ));

        let pieces = parse_default("${arr[2+3]}")?;
        assert!(matches!(
            &pieces[0],
            WordPiece::ParameterExpansion(ParameterExpr::Parameter {
                parameter: Parameter::NamedWithIndex { .. },
                ..
            })
        ));

        Ok(())
    }

    #[test]
    fn parse_special_parameters() -> Result<()> {
        for (text, expected) in [
            ("$?", SpecialParameter::LastExitStatus),
            ("$#", SpecialParameter::PositionalParameterCount),
            ("$$", SpecialParameter::ProcessId),
            ("$!", SpecialParameter::LastBackgroundProcessId),
            ("$0", SpecialParameter::ShellName),
        ] {
            assert_eq!(
                parse_default(text)?,
                vec![WordPiece::ParameterExpansion(ParameterExpr::Parameter {
                    parameter: Parameter::Special(expected),
                    indirect: false
                })]
            );
        }
        Ok(())
    }

    #[test]
    fn parse_substring_expansion() -> Result<()> {
        let pieces = parse_default("${x:1:2}")?;
        let WordPiece::ParameterExpansion(ParameterExpr::Substring {
            offset, length, ..
        }) = &pieces[0]
        else {
            anyhow::bail!("expected substring expansion");
        };
        assert_eq!(offset.text, "1");
        assert_eq!(length.as_ref().map(|l| l.text.as_str()), Some("2"));
        Ok(())
    }

    #[test]
    fn parse_brace_expansion_words() -> Result<()> {
        let options = ParserOptions::default();

        // Plain text yields no brace expressions (only text pieces, if any).
        let parsed = parse_brace_expansions("plain", &options)?;
        assert!(
            parsed.is_none_or(|pieces| pieces
                .iter()
                .all(|p| matches!(p, BraceExpressionOrText::Text(_))))
        );

        let parsed = parse_brace_expansions("x{a,b}y", &options)?;
        assert!(parsed.is_some_and(|pieces| pieces
            .iter()
            .any(|p| matches!(p, BraceExpressionOrText::Expr(_)))));

        let parsed = parse_brace_expansions("{1..5}", &options)?;
        let Some(pieces) = parsed else {
            anyhow::bail!("expected brace expansion");
        };
        assert!(pieces.iter().any(|p| matches!(
            p,
            BraceExpressionOrText::Expr(members)
                if matches!(members[0], BraceExpressionMember::NumberSequence { start: 1, end: 5, increment: 1 })
        )));

        Ok(())
    }
}
