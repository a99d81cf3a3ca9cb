//! The parser: turns a token stream into a syntax tree using a PEG grammar
//! defined over tokens.

use crate::ast::{self, Separator};
use crate::error::{self, ParseError};
use crate::lexer::{self, LexerOptions, Token};

/// Options controlling parsing behavior.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ParserOptions {
    /// Whether extended globbing (extglob) patterns are recognized.
    pub enable_extended_globbing: bool,
    /// Whether tilde prefixes are recognized during word parsing.
    pub tilde_expansion: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            enable_extended_globbing: true,
            tilde_expansion: true,
        }
    }
}

impl ParserOptions {
    /// Returns the lexer options implied by these parser options.
    pub const fn lexer_options(&self) -> LexerOptions {
        LexerOptions {
            enable_extended_globbing: self.enable_extended_globbing,
        }
    }
}

/// Parses a complete shell program from source text.
pub fn parse_program(input: &str, options: &ParserOptions) -> Result<ast::Program, ParseError> {
    let tokens = lexer::lex_str_with_options(input, &options.lexer_options()).map_err(|inner| {
        ParseError::Lexing {
            inner,
            position: None,
        }
    })?;

    parse_tokens(&tokens)
}

/// Parses a complete shell program from an already-tokenized stream.
pub fn parse_tokens(tokens: &[Token]) -> Result<ast::Program, ParseError> {
    let result = token_parser::program(&Tokens { tokens });

    match result {
        Ok(program) => {
            tracing::debug!(target: "parse", "parsed: {program:?}");
            Ok(program)
        }
        Err(inner) => {
            tracing::debug!(target: "parse", "parse error: {inner:?}");
            Err(error::convert_peg_parse_error(&inner, tokens))
        }
    }
}

/// A borrowed token sequence, as consumed by the grammar.
struct Tokens<'a> {
    tokens: &'a [Token],
}

impl peg::Parse for Tokens<'_> {
    type PositionRepr = usize;

    #[inline]
    fn start(&self) -> usize {
        0
    }

    #[inline]
    fn is_eof(&self, p: usize) -> bool {
        p >= self.tokens.len()
    }

    #[inline]
    fn position_repr(&self, p: usize) -> Self::PositionRepr {
        p
    }
}

impl<'a> peg::ParseElem<'a> for Tokens<'a> {
    type Element = &'a Token;

    #[inline]
    fn parse_elem(&'a self, pos: usize) -> peg::RuleResult<Self::Element> {
        match self.tokens.get(pos) {
            Some(token) => peg::RuleResult::Matched(pos + 1, token),
            None => peg::RuleResult::Failed,
        }
    }
}

impl<'a> peg::ParseSlice<'a> for Tokens<'a> {
    type Slice = String;

    fn parse_slice(&'a self, start: usize, end: usize) -> Self::Slice {
        let mut result = String::new();
        let mut last_was_word = false;

        for token in &self.tokens[start..end] {
            match token {
                Token::Operator(s, _) => {
                    result.push_str(s);
                    last_was_word = false;
                }
                Token::Word(s, _) => {
                    if last_was_word {
                        result.push(' ');
                    }
                    result.push_str(s);
                    last_was_word = true;
                }
            }
        }

        result
    }
}

peg::parser! {
    grammar token_parser<'a>() for Tokens<'a> {
        pub(crate) rule program() -> ast::Program =
            linebreak() lists:statement_lists() linebreak() { ast::Program { statements: lists } } /
            linebreak() { ast::Program { statements: vec![] } }

        rule statement_lists() -> Vec<ast::StatementList> =
            statement_list() ++ newline_list()

        rule statement_list() -> ast::StatementList =
            first:and_or_chain() remainder:(s:separator_op() c:and_or_chain() { (s, c) })* last_sep:separator_op()? {
                assemble_statement_list(first, remainder, last_sep)
            }

        // Like statement_list, but tolerates embedded/leading newlines; used
        // within compound commands.
        rule nested_statement_list() -> ast::StatementList =
            linebreak() first:and_or_chain() remainder:(s:separator() c:and_or_chain() { (s, c) })* last_sep:separator()? {
                assemble_statement_list(
                    first,
                    remainder.into_iter().map(|(s, c)| (s.unwrap_or(Separator::Sync), c)).collect(),
                    last_sep.flatten(),
                )
            }

        rule and_or_chain() -> ast::AndOrChain =
            first:pipeline() rest:_chained_pipeline()* { ast::AndOrChain { first, rest } }

        rule _chained_pipeline() -> ast::ChainedPipeline =
            specific_operator("&&") linebreak() p:pipeline() { ast::ChainedPipeline::And(p) } /
            specific_operator("||") linebreak() p:pipeline() { ast::ChainedPipeline::Or(p) }

        rule pipeline() -> ast::Pipeline =
            negated:bang()? commands:pipe_sequence() { ast::Pipeline { negated: negated.is_some(), commands } }

        rule bang() -> bool = specific_word("!") { true }

        pub(crate) rule pipe_sequence() -> Vec<ast::Command> =
            c:(c:command() r:&pipe_extension()? {? // peek for `|&` without consuming it
                let mut c = c;
                if r.is_some() {
                    add_pipe_extension_redirect(&mut c)?;
                }
                Ok(c)
            }) ++ (pipe_operator() linebreak()) {
                c
            }

        rule pipe_operator() =
            specific_operator("|") /
            pipe_extension()

        rule pipe_extension() -> &'input Token =
            specific_operator("|&")

        rule command() -> ast::Command =
            d:function_definition() { ast::Command::FunctionDef(d) } /
            t:test_command() { ast::Command::Test(t) } /
            c:simple_command() { ast::Command::Simple(c) } /
            c:compound_command() r:redirect_list()? { ast::Command::Compound(c, r) } /
            e:extended_test_command() { ast::Command::ExtendedTest(e) } /
            expected!("command")

        pub(crate) rule compound_command() -> ast::CompoundCommand =
            a:arithmetic_command() { ast::CompoundCommand::Arithmetic(a) } /
            g:brace_group() { ast::CompoundCommand::Group(g) } /
            s:subshell() { ast::CompoundCommand::Subshell(s) } /
            f:for_clause() { ast::CompoundCommand::For(f) } /
            c:case_clause() { ast::CompoundCommand::Case(c) } /
            i:if_clause() { ast::CompoundCommand::If(i) } /
            w:while_clause() { ast::CompoundCommand::While(w) } /
            u:until_clause() { ast::CompoundCommand::Until(u) } /
            c:cstyle_for_clause() { ast::CompoundCommand::CStyleFor(c) } /
            expected!("compound command")

        rule arithmetic_command() -> ast::ArithmeticCommand =
            specific_operator("(") specific_operator("(") expr:arithmetic_expression() specific_operator(")") specific_operator(")") {
                ast::ArithmeticCommand { expr }
            }

        rule arithmetic_expression() -> ast::UnexpandedArithmeticExpr =
            raw:$(arithmetic_expression_piece()*) { ast::UnexpandedArithmeticExpr { text: raw } }

        rule arithmetic_expression_piece() =
            specific_operator("(") (!specific_operator(")") arithmetic_expression_piece())* specific_operator(")") {} /
            // Consume any token that isn't the end of the expression nor a
            // stray closing paren (the latter forces backtracking so the
            // construct can be re-parsed as a subshell).
            !arithmetic_end() !specific_operator(")") [_] {}

        rule arithmetic_end() =
            specific_operator(")") specific_operator(")") {} /
            specific_operator(";") {}

        rule brace_group() -> ast::GroupCommand =
            specific_word("{") list:nested_statement_list() specific_word("}") {
                ast::GroupCommand(list)
            }

        rule subshell() -> ast::SubshellCommand =
            specific_operator("(") list:nested_statement_list() specific_operator(")") {
                ast::SubshellCommand(list)
            }

        rule for_clause() -> ast::ForCommand =
            specific_word("for") n:name() linebreak() _in() values:wordlist()? sequential_sep() body:do_group() {
                // An explicit (possibly empty) `in` list is distinct from no
                // list at all, which iterates the positional parameters.
                ast::ForCommand {
                    variable: n.to_owned(),
                    values: Some(values.unwrap_or_default()),
                    body,
                }
            } /
            specific_word("for") n:name() sequential_sep()? body:do_group() {
                ast::ForCommand { variable: n.to_owned(), values: None, body }
            }

        rule cstyle_for_clause() -> ast::CStyleForCommand =
            specific_word("for")
            specific_operator("(") specific_operator("(")
                init:arithmetic_expression()? specific_operator(";")
                condition:arithmetic_expression()? specific_operator(";")
                update:arithmetic_expression()?
            specific_operator(")") specific_operator(")")
            sequential_sep()
            body:do_group() {
                ast::CStyleForCommand { init, condition, update, body }
            }

        rule case_clause() -> ast::CaseCommand =
            specific_word("case") subject:word() linebreak() _in() linebreak() arms:case_arm()* last:case_arm_no_terminator()? specific_word("esac") {
                let mut arms = arms;
                if let Some(last) = last {
                    arms.push(last);
                }
                ast::CaseCommand { subject: ast::Word::from(subject), arms }
            }

        rule case_arm() -> ast::CaseArm =
            specific_operator("(")? patterns:case_patterns() specific_operator(")") linebreak() terminator:case_arm_terminator() linebreak() {
                ast::CaseArm { patterns, body: None, terminator }
            } /
            specific_operator("(")? patterns:case_patterns() specific_operator(")") body:nested_statement_list() terminator:case_arm_terminator() linebreak() {
                ast::CaseArm { patterns, body: Some(body), terminator }
            }

        rule case_arm_no_terminator() -> ast::CaseArm =
            specific_operator("(")? patterns:case_patterns() specific_operator(")") body:nested_statement_list() {
                ast::CaseArm { patterns, body: Some(body), terminator: ast::CaseArmTerminator::Break }
            } /
            specific_operator("(")? patterns:case_patterns() specific_operator(")") linebreak() {
                ast::CaseArm { patterns, body: None, terminator: ast::CaseArmTerminator::Break }
            }

        rule case_arm_terminator() -> ast::CaseArmTerminator =
            specific_operator(";;&") { ast::CaseArmTerminator::ContinueMatching } /
            specific_operator(";;") { ast::CaseArmTerminator::Break } /
            specific_operator(";&") { ast::CaseArmTerminator::Fallthrough }

        rule case_patterns() -> Vec<ast::Word> =
            (w:word() { ast::Word::from(w) }) ++ specific_operator("|")

        rule if_clause() -> ast::IfCommand =
            specific_word("if") condition:nested_statement_list() specific_word("then") then_body:nested_statement_list() elses:else_part()? specific_word("fi") {
                ast::IfCommand { condition, then_body, elses: elses.unwrap_or_default() }
            }

        rule else_part() -> Vec<ast::ElseClause> =
            elifs:_elif_clause()+ last:_else_clause()? {
                let mut clauses = elifs;
                if let Some(last) = last {
                    clauses.push(last);
                }
                clauses
            } /
            last:_else_clause() { vec![last] }

        rule _elif_clause() -> ast::ElseClause =
            specific_word("elif") condition:nested_statement_list() specific_word("then") body:nested_statement_list() {
                ast::ElseClause { condition: Some(condition), body }
            }

        rule _else_clause() -> ast::ElseClause =
            specific_word("else") body:nested_statement_list() {
                ast::ElseClause { condition: None, body }
            }

        rule while_clause() -> ast::LoopCommand =
            specific_word("while") condition:nested_statement_list() body:do_group() {
                ast::LoopCommand { condition, body }
            }

        rule until_clause() -> ast::LoopCommand =
            specific_word("until") condition:nested_statement_list() body:do_group() {
                ast::LoopCommand { condition, body }
            }

        rule do_group() -> ast::DoGroup =
            specific_word("do") list:nested_statement_list() specific_word("done") {
                ast::DoGroup(list)
            }

        rule function_definition() -> ast::FunctionDefinition =
            specific_word("function")? name:function_name() body:function_parens_and_body() {
                let (name_str, span) = name;
                ast::FunctionDefinition { name: name_str, body, span: Some(span) }
            } /
            specific_word("function") name:function_name() linebreak() body:function_body() {
                let (name_str, span) = name;
                ast::FunctionDefinition { name: name_str, body, span: Some(span) }
            } /
            expected!("function definition")

        rule function_parens_and_body() -> ast::FunctionBody =
            specific_operator("(") specific_operator(")") linebreak() body:function_body() { body }

        rule function_body() -> ast::FunctionBody =
            c:compound_command() r:redirect_list()? { ast::FunctionBody(c, r) }

        rule function_name() -> (String, crate::SourceSpan) =
            // Avoid misreading declaration-style assignments as definitions.
            w:[Token::Word(word, _) if !word.ends_with('=')] {
                (w.to_str().to_owned(), w.span().clone())
            }

        rule test_command() -> ast::TestCommand =
            specific_word("[") args:(!specific_word("]") w:word() { ast::Word::from(w) })* specific_word("]") {
                ast::TestCommand { args }
            }

        rule extended_test_command() -> ast::ExtendedTestExpr =
            specific_word("[[") linebreak() e:extended_test_expression() linebreak() specific_word("]]") { e }

        rule extended_test_expression() -> ast::ExtendedTestExpr = precedence! {
            left:(@) linebreak() specific_operator("||") linebreak() right:@ { ast::ExtendedTestExpr::Or(Box::from(left), Box::from(right)) }
            --
            left:(@) linebreak() specific_operator("&&") linebreak() right:@ { ast::ExtendedTestExpr::And(Box::from(left), Box::from(right)) }
            --
            specific_word("!") e:@ { ast::ExtendedTestExpr::Not(Box::from(e)) }
            --
            specific_operator("(") e:extended_test_expression() specific_operator(")") { ast::ExtendedTestExpr::Parenthesized(Box::from(e)) }
            --
            left:word() specific_word("-eq") right:word() { binary_test(ast::BinaryPredicate::ArithmeticEqual, left, right) }
            left:word() specific_word("-ne") right:word() { binary_test(ast::BinaryPredicate::ArithmeticNotEqual, left, right) }
            left:word() specific_word("-lt") right:word() { binary_test(ast::BinaryPredicate::ArithmeticLessThan, left, right) }
            left:word() specific_word("-le") right:word() { binary_test(ast::BinaryPredicate::ArithmeticLessThanOrEqual, left, right) }
            left:word() specific_word("-gt") right:word() { binary_test(ast::BinaryPredicate::ArithmeticGreaterThan, left, right) }
            left:word() specific_word("-ge") right:word() { binary_test(ast::BinaryPredicate::ArithmeticGreaterThanOrEqual, left, right) }
            left:word() specific_word("-ef") right:word() { binary_test(ast::BinaryPredicate::SameFile, left, right) }
            left:word() specific_word("-nt") right:word() { binary_test(ast::BinaryPredicate::NewerThan, left, right) }
            left:word() specific_word("-ot") right:word() { binary_test(ast::BinaryPredicate::OlderThan, left, right) }
            left:word() (specific_word("==") / specific_word("=")) right:word() { binary_test(ast::BinaryPredicate::MatchesPattern, left, right) }
            left:word() specific_word("!=") right:word() { binary_test(ast::BinaryPredicate::NotMatchesPattern, left, right) }
            left:word() specific_word("=~") right:regex_word() {
                if right.text.starts_with(['\'', '"']) {
                    ast::ExtendedTestExpr::BinaryTest(ast::BinaryPredicate::ContainsSubstring, ast::Word::from(left), right)
                } else {
                    ast::ExtendedTestExpr::BinaryTest(ast::BinaryPredicate::MatchesRegex, ast::Word::from(left), right)
                }
            }
            left:word() specific_operator("<") right:word() { binary_test(ast::BinaryPredicate::SortsBefore, left, right) }
            left:word() specific_operator(">") right:word() { binary_test(ast::BinaryPredicate::SortsAfter, left, right) }
            --
            p:unary_predicate() w:word() { ast::ExtendedTestExpr::UnaryTest(p, ast::Word::from(w)) }
            --
            w:word() { ast::ExtendedTestExpr::UnaryTest(ast::UnaryPredicate::StringIsNonEmpty, ast::Word::from(w)) }
        }

        rule unary_predicate() -> ast::UnaryPredicate =
            specific_word("-a") { ast::UnaryPredicate::FileExists } /
            specific_word("-b") { ast::UnaryPredicate::IsBlockDevice } /
            specific_word("-c") { ast::UnaryPredicate::IsCharDevice } /
            specific_word("-d") { ast::UnaryPredicate::IsDirectory } /
            specific_word("-e") { ast::UnaryPredicate::FileExists } /
            specific_word("-f") { ast::UnaryPredicate::IsRegularFile } /
            specific_word("-g") { ast::UnaryPredicate::IsSetgid } /
            specific_word("-h") { ast::UnaryPredicate::IsSymlink } /
            specific_word("-k") { ast::UnaryPredicate::HasStickyBit } /
            specific_word("-n") { ast::UnaryPredicate::StringIsNonEmpty } /
            specific_word("-o") { ast::UnaryPredicate::OptionEnabled } /
            specific_word("-p") { ast::UnaryPredicate::IsFifo } /
            specific_word("-r") { ast::UnaryPredicate::IsReadable } /
            specific_word("-s") { ast::UnaryPredicate::IsNonEmptyFile } /
            specific_word("-t") { ast::UnaryPredicate::FdIsTerminal } /
            specific_word("-u") { ast::UnaryPredicate::IsSetuid } /
            specific_word("-v") { ast::UnaryPredicate::VarIsSet } /
            specific_word("-w") { ast::UnaryPredicate::IsWritable } /
            specific_word("-x") { ast::UnaryPredicate::IsExecutable } /
            specific_word("-z") { ast::UnaryPredicate::StringIsEmpty } /
            specific_word("-G") { ast::UnaryPredicate::OwnedByEffectiveGid } /
            specific_word("-L") { ast::UnaryPredicate::IsSymlink } /
            specific_word("-N") { ast::UnaryPredicate::ModifiedSinceRead } /
            specific_word("-O") { ast::UnaryPredicate::OwnedByEffectiveUid } /
            specific_word("-R") { ast::UnaryPredicate::VarIsNameref } /
            specific_word("-S") { ast::UnaryPredicate::IsSocket }

        // Regex operands may embed a few otherwise-special operators.
        rule regex_word() -> ast::Word =
            text:$((!specific_word("]]") regex_word_piece())+) {
                ast::Word::from(text)
            }

        rule regex_word_piece() =
            word() {} /
            specific_operator("|") {} /
            specific_operator("(") parenthesized_regex_word()* specific_operator(")") {}

        rule parenthesized_regex_word() =
            regex_word_piece() /
            !specific_operator(")") !specific_word("]]") [_]

        rule name() -> &'input str =
            w:[Token::Word(_, _)] { w.to_str() }

        rule _in() = specific_word("in") {}

        rule wordlist() -> Vec<ast::Word> =
            (w:word() { ast::Word::from(w) })+

        rule simple_command() -> ast::SimpleCommand =
            prefix:command_prefix() name_and_suffix:(name:command_word() suffix:command_suffix()? { (name, suffix) })? {
                match name_and_suffix {
                    Some((name, suffix)) => ast::SimpleCommand {
                        prefix,
                        span: Some(name.span().clone()),
                        name: Some(ast::Word::from(name)),
                        suffix: suffix.unwrap_or_default(),
                    },
                    None => ast::SimpleCommand { prefix, name: None, suffix: vec![], span: None },
                }
            } /
            name:command_name() suffix:command_suffix()? {
                ast::SimpleCommand {
                    prefix: vec![],
                    span: Some(name.span().clone()),
                    name: Some(ast::Word::from(name)),
                    suffix: suffix.unwrap_or_default(),
                }
            } /
            expected!("simple command")

        rule command_name() -> &'input Token =
            non_reserved_word()

        rule command_word() -> &'input Token =
            !assignment_word() w:non_reserved_word() { w }

        rule command_prefix() -> Vec<ast::CommandElement> =
            p:(
                r:io_redirect() { ast::CommandElement::Redirect(r) } /
                a:assignment_word() {
                    let (assignment, word) = a;
                    ast::CommandElement::Assignment(assignment, word)
                }
            )+ { p }

        rule command_suffix() -> Vec<ast::CommandElement> =
            s:(
                sub:process_substitution() {
                    let (kind, subshell) = sub;
                    ast::CommandElement::ProcessSubstitution(kind, subshell)
                } /
                r:io_redirect() { ast::CommandElement::Redirect(r) } /
                a:assignment_word() {
                    let (assignment, word) = a;
                    ast::CommandElement::Assignment(assignment, word)
                } /
                w:word() { ast::CommandElement::Word(ast::Word::from(w)) }
            )+ { s }

        rule redirect_list() -> ast::RedirectList =
            r:io_redirect()+ { ast::RedirectList(r) } /
            expected!("redirect list")

        rule io_redirect() -> ast::Redirect =
            fd:io_number()? f:io_file() {
                let (operator, target) = f;
                ast::Redirect::File(fd, operator, target)
            } /
            specific_operator("&>>") target:filename() { ast::Redirect::OutputAndError(ast::Word::from(target), true) } /
            specific_operator("&>") target:filename() { ast::Redirect::OutputAndError(ast::Word::from(target), false) } /
            fd:io_number()? specific_operator("<<<") w:word() { ast::Redirect::HereString(fd, ast::Word::from(w)) } /
            fd:io_number()? doc:io_here() { ast::Redirect::HereDocument(fd, doc) } /
            expected!("I/O redirect")

        rule io_file() -> (ast::RedirectOperator, ast::RedirectTarget) =
            specific_operator("<") f:io_filename() { (ast::RedirectOperator::Read, f) } /
            specific_operator("<&") f:io_duplication_source() { (ast::RedirectOperator::DupInput, f) } /
            specific_operator(">") f:io_filename() { (ast::RedirectOperator::Write, f) } /
            specific_operator(">&") f:io_duplication_source() { (ast::RedirectOperator::DupOutput, f) } /
            specific_operator(">>") f:io_filename() { (ast::RedirectOperator::Append, f) } /
            specific_operator("<>") f:io_filename() { (ast::RedirectOperator::ReadWrite, f) } /
            specific_operator(">|") f:io_filename() { (ast::RedirectOperator::Clobber, f) }

        rule io_duplication_source() -> ast::RedirectTarget =
            w:word() { ast::RedirectTarget::Duplicate(ast::Word::from(w)) }

        rule io_filename() -> ast::RedirectTarget =
            sub:process_substitution() {
                let (kind, subshell) = sub;
                ast::RedirectTarget::ProcessSubstitution(kind, subshell)
            } /
            f:filename() { ast::RedirectTarget::Filename(ast::Word::from(f)) }

        rule filename() -> &'input Token =
            word()

        rule io_here() -> ast::HereDocument =
            specific_operator("<<-") delimiter:here_tag() body:[_] _end_tag:here_tag() {
                let expand = !delimiter.to_str().contains(['\'', '"', '\\']);
                ast::HereDocument {
                    strip_tabs: true,
                    expand,
                    delimiter: ast::Word::from(delimiter),
                    body: ast::Word::from(body),
                }
            } /
            specific_operator("<<") delimiter:here_tag() body:[_] _end_tag:here_tag() {
                let expand = !delimiter.to_str().contains(['\'', '"', '\\']);
                ast::HereDocument {
                    strip_tabs: false,
                    expand,
                    delimiter: ast::Word::from(delimiter),
                    body: ast::Word::from(body),
                }
            }

        rule here_tag() -> &'input Token =
            word()

        rule process_substitution() -> (ast::ProcessSubstitutionKind, ast::SubshellCommand) =
            specific_operator("<") s:subshell() { (ast::ProcessSubstitutionKind::Read, s) } /
            specific_operator(">") s:subshell() { (ast::ProcessSubstitutionKind::Write, s) }

        rule newline_list() =
            newline()+ {}

        rule linebreak() =
            quiet! {
                newline()* {}
            }

        rule newline() = quiet! {
            specific_operator("\n") {}
        }

        rule separator_op() -> Separator =
            specific_operator("&") { Separator::Async } /
            specific_operator(";") { Separator::Sync }

        rule separator() -> Option<Separator> =
            s:separator_op() linebreak() { Some(s) } /
            newline_list() { None }

        rule sequential_sep() =
            specific_operator(";") linebreak() /
            newline_list()

        rule non_reserved_word() -> &'input Token =
            !reserved_word() w:word() { w }

        rule word() -> &'input Token =
            [Token::Word(_, _)]

        rule reserved_word() -> &'input Token =
            [Token::Word(w, _) if matches!(w.as_str(),
                "!" |
                "{" |
                "}" |
                "case" |
                "do" |
                "done" |
                "elif" |
                "else" |
                "esac" |
                "fi" |
                "for" |
                "if" |
                "in" |
                "then" |
                "until" |
                "while" |
                "[[" |
                "]]" |
                "function"
            )]

        pub(crate) rule assignment_word() -> (ast::Assignment, ast::Word) =
            [Token::Word(w, _)] specific_operator("(") elements:array_elements() specific_operator(")") {?
                let assignment = parse_array_assignment(w.as_str(), elements.as_slice())?;

                let mut text = w.to_owned();
                text.push('(');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        text.push(' ');
                    }
                    text.push_str(element);
                }
                text.push(')');

                Ok((assignment, ast::Word::from(text)))
            } /
            [Token::Word(w, _)] {?
                let assignment = parse_scalar_assignment(w.as_str())?;
                Ok((assignment, ast::Word::new(w)))
            }

        rule array_elements() -> Vec<&'input String> =
            linebreak() e:array_element()* { e }

        rule array_element() -> &'input String =
            linebreak() [Token::Word(e, _)] linebreak() { e }

        // An I/O number is all digits and must directly abut the redirection
        // operator that follows it.
        rule io_number() -> u32 =
            [Token::Word(w, num_span) if w.chars().all(|c: char| c.is_ascii_digit())]
            &([Token::Operator(o, op_span) if
                    o.starts_with(['<', '>']) &&
                    num_span.end.index == op_span.start.index]) {?
                w.parse().or(Err("io number"))
            }

        rule specific_operator(expected: &str) -> &'input Token =
            [Token::Operator(w, _) if w.as_str() == expected]

        rule specific_word(expected: &str) -> &'input Token =
            [Token::Word(w, _) if w.as_str() == expected]
    }
}

fn binary_test(
    pred: ast::BinaryPredicate,
    left: &lexer::Token,
    right: &lexer::Token,
) -> ast::ExtendedTestExpr {
    ast::ExtendedTestExpr::BinaryTest(pred, ast::Word::from(left), ast::Word::from(right))
}

fn assemble_statement_list(
    first: ast::AndOrChain,
    remainder: Vec<(Separator, ast::AndOrChain)>,
    last_sep: Option<Separator>,
) -> ast::StatementList {
    let mut chains = vec![first];
    let mut separators = vec![];

    for (sep, chain) in remainder {
        separators.push(sep);
        chains.push(chain);
    }

    // An unterminated final chain runs synchronously.
    separators.push(last_sep.unwrap_or(Separator::Sync));

    let items = chains
        .into_iter()
        .zip(separators)
        .map(|(chain, separator)| ast::StatementListItem { chain, separator })
        .collect();

    ast::StatementList(items)
}

peg::parser! {
    grammar assignment_parser() for str {
        pub(crate) rule scalar_assignment() -> ast::Assignment =
            target:target_and_equals() value:scalar_value() {
                let (target, append) = target;
                ast::Assignment { target, value, append }
            }

        pub(crate) rule target_and_equals() -> (ast::AssignmentTarget, bool) =
            target:target() append:("+"?) "=" {
                (target, append.is_some())
            }

        pub(crate) rule literal_array_element() -> (Option<String>, String) =
            "[" key:$((!"]" [_])*) "]=" value:$([_]*) {
                (Some(key.to_owned()), value.to_owned())
            } /
            value:$([_]+) {
                (None, value.to_owned())
            }

        rule target() -> ast::AssignmentTarget =
            e:array_element_target() {
                let (name, index) = e;
                ast::AssignmentTarget::ArrayElement(name.to_owned(), index.to_owned())
            } /
            name:variable_name() {
                ast::AssignmentTarget::Variable(name.to_owned())
            }

        rule array_element_target() -> (&'input str, &'input str) =
            name:variable_name() "[" index:$((![']'] [_])*) "]" { (name, index) }

        rule variable_name() -> &'input str =
            $(['_' | 'a'..='z' | 'A'..='Z'] ['_' | '0'..='9' | 'a'..='z' | 'A'..='Z']*)

        rule scalar_value() -> ast::AssignmentValue =
            v:$([_]*) { ast::AssignmentValue::Scalar(ast::Word::from(v.to_owned())) }
    }
}

fn parse_scalar_assignment(word: &str) -> Result<ast::Assignment, &'static str> {
    assignment_parser::scalar_assignment(word).map_err(|_| "not an assignment word")
}

fn parse_array_assignment(
    word: &str,
    elements: &[&String],
) -> Result<ast::Assignment, &'static str> {
    let (target, append) =
        assignment_parser::target_and_equals(word).map_err(|_| "not an array assignment word")?;

    let elements = elements
        .iter()
        .map(|element| assignment_parser::literal_array_element(element))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "invalid array element literal")?;

    let elements = elements
        .into_iter()
        .map(|(key, value)| {
            (
                key.map(|k| ast::Word::new(k.as_str())),
                ast::Word::new(value.as_str()),
            )
        })
        .collect();

    Ok(ast::Assignment {
        target,
        value: ast::AssignmentValue::Array(elements),
        append,
    })
}

// A `|&` stage is shorthand for redirecting stderr into the pipe as well.
fn add_pipe_extension_redirect(command: &mut ast::Command) -> Result<(), &'static str> {
    let redirect = ast::Redirect::File(
        Some(2),
        ast::RedirectOperator::DupOutput,
        ast::RedirectTarget::Duplicate(ast::Word::new("1")),
    );

    fn add_to_redirect_list(list: &mut Option<ast::RedirectList>, redirect: ast::Redirect) {
        if let Some(list) = list {
            list.0.push(redirect);
        } else {
            *list = Some(ast::RedirectList(vec![redirect]));
        }
    }

    match command {
        ast::Command::Simple(c) => {
            c.suffix.push(ast::CommandElement::Redirect(redirect));
        }
        ast::Command::Compound(_, list) => add_to_redirect_list(list, redirect),
        ast::Command::FunctionDef(d) => add_to_redirect_list(&mut d.body.1, redirect),
        ast::Command::Test(_) | ast::Command::ExtendedTest(_) => {
            return Err("|& is not supported on test commands");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Result<ast::Program> {
        Ok(parse_program(input, &ParserOptions::default())?)
    }

    /// Parses the input, serialises the result, and checks the serialised form
    /// reparses to an identical tree (as judged by re-serialisation).
    fn assert_round_trips(input: &str) -> Result<()> {
        let first = parse(input)?.to_string();
        let second = parse(first.as_str())?.to_string();
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn parse_empty_program() -> Result<()> {
        assert!(parse("")?.statements.is_empty());
        assert!(parse("\n\n")?.statements.is_empty());
        Ok(())
    }

    #[test]
    fn parse_simple_command() -> Result<()> {
        let program = parse("echo hello world")?;
        assert_eq!(program.statements.len(), 1);

        let ast::Command::Simple(cmd) = first_command(&program) else {
            anyhow::bail!("expected simple command");
        };
        assert_eq!(cmd.name.as_ref().map(|w| w.text.as_str()), Some("echo"));
        assert_eq!(cmd.suffix.len(), 2);

        Ok(())
    }

    #[test]
    fn parse_assignment_prefix() -> Result<()> {
        let program = parse("FOO=bar BAZ=qux env")?;
        let ast::Command::Simple(cmd) = first_command(&program) else {
            anyhow::bail!("expected simple command");
        };
        assert_eq!(cmd.prefix.len(), 2);
        assert!(matches!(
            cmd.prefix[0],
            ast::CommandElement::Assignment(..)
        ));
        Ok(())
    }

    #[test]
    fn parse_array_assignment() -> Result<()> {
        let program = parse("arr=(a b [5]=c)")?;
        let ast::Command::Simple(cmd) = first_command(&program) else {
            anyhow::bail!("expected simple command");
        };
        let ast::CommandElement::Assignment(assignment, _) = &cmd.prefix[0] else {
            anyhow::bail!("expected assignment");
        };
        let ast::AssignmentValue::Array(elements) = &assignment.value else {
            anyhow::bail!("expected array value");
        };
        assert_eq!(elements.len(), 3);
        assert_eq!(
            elements[2].0.as_ref().map(|w| w.text.as_str()),
            Some("5")
        );
        Ok(())
    }

    #[test]
    fn parse_pipeline_and_chain() -> Result<()> {
        let program = parse("a | b && c || d")?;
        let list = &program.statements[0];
        let chain = &list.0[0].chain;
        assert_eq!(chain.first.commands.len(), 2);
        assert_eq!(chain.rest.len(), 2);
        assert!(matches!(chain.rest[0], ast::ChainedPipeline::And(_)));
        assert!(matches!(chain.rest[1], ast::ChainedPipeline::Or(_)));
        Ok(())
    }

    #[test]
    fn parse_negated_pipeline() -> Result<()> {
        let program = parse("! false")?;
        let chain = &program.statements[0].0[0].chain;
        assert!(chain.first.negated);
        Ok(())
    }

    #[test]
    fn parse_background_statement() -> Result<()> {
        let program = parse("sleep 5 &")?;
        assert!(matches!(
            program.statements[0].0[0].separator,
            Separator::Async
        ));
        Ok(())
    }

    #[test]
    fn parse_if_statement() -> Result<()> {
        assert_round_trips("if true; then echo yes; elif false; then echo maybe; else echo no; fi")
    }

    #[test]
    fn parse_loops() -> Result<()> {
        assert_round_trips("while read x; do echo $x; done")?;
        assert_round_trips("until test -f file; do sleep 1; done")?;
        assert_round_trips("for i in 1 2 3; do echo $i; done")?;
        assert_round_trips("for ((i = 0; i < 3; i++)); do echo $i; done")?;
        Ok(())
    }

    #[test]
    fn parse_case_statement() -> Result<()> {
        let program = parse("case foo in f*) echo one ;;& foo) echo two ;; *) echo three ;; esac")?;
        let ast::Command::Compound(ast::CompoundCommand::Case(case), _) = first_command(&program)
        else {
            anyhow::bail!("expected case command");
        };

        assert_eq!(case.arms.len(), 3);
        assert!(matches!(
            case.arms[0].terminator,
            ast::CaseArmTerminator::ContinueMatching
        ));
        assert!(matches!(
            case.arms[1].terminator,
            ast::CaseArmTerminator::Break
        ));
        Ok(())
    }

    #[test]
    fn parse_case_fallthrough() -> Result<()> {
        let program = parse("case a in a) echo one ;& b) echo two ;; esac")?;
        let ast::Command::Compound(ast::CompoundCommand::Case(case), _) = first_command(&program)
        else {
            anyhow::bail!("expected case command");
        };
        assert!(matches!(
            case.arms[0].terminator,
            ast::CaseArmTerminator::Fallthrough
        ));
        Ok(())
    }

    #[test]
    fn parse_function_definition() -> Result<()> {
        for input in ["greet() { echo hi; }", "function greet { echo hi; }"] {
            let program = parse(input)?;
            let ast::Command::FunctionDef(def) = first_command(&program) else {
                anyhow::bail!("expected function definition for {input}");
            };
            assert_eq!(def.name, "greet");
        }
        Ok(())
    }

    #[test]
    fn parse_subshell_and_group() -> Result<()> {
        let program = parse("( cd /tmp; pwd )")?;
        assert!(matches!(
            first_command(&program),
            ast::Command::Compound(ast::CompoundCommand::Subshell(_), _)
        ));

        let program = parse("{ cd /tmp; pwd; }")?;
        assert!(matches!(
            first_command(&program),
            ast::Command::Compound(ast::CompoundCommand::Group(_), _)
        ));
        Ok(())
    }

    #[test]
    fn parse_arithmetic_command() -> Result<()> {
        let program = parse("(( x += 1 ))")?;
        let ast::Command::Compound(ast::CompoundCommand::Arithmetic(cmd), _) =
            first_command(&program)
        else {
            anyhow::bail!("expected arithmetic command");
        };
        assert_eq!(cmd.expr.text.trim(), "x += 1");
        Ok(())
    }

    #[test]
    fn parse_arith_and_subshell_parens() -> Result<()> {
        assert_round_trips("( : && ( (( 0 )) || : ) )")
    }

    #[test]
    fn parse_test_command() -> Result<()> {
        let program = parse("[ -n foo ]")?;
        let ast::Command::Test(test) = first_command(&program) else {
            anyhow::bail!("expected test command");
        };
        assert_eq!(test.args.len(), 2);
        Ok(())
    }

    #[test]
    fn parse_extended_test() -> Result<()> {
        let program = parse("[[ $x == a* && -f $y ]]")?;
        assert!(matches!(
            first_command(&program),
            ast::Command::ExtendedTest(ast::ExtendedTestExpr::And(..))
        ));
        Ok(())
    }

    #[test]
    fn parse_redirections() -> Result<()> {
        assert_round_trips("echo hi > out.txt 2>&1")?;
        assert_round_trips("cat < in.txt >> out.txt")?;
        assert_round_trips("cmd 3<> file")?;
        assert_round_trips("cmd &> all.log")?;
        assert_round_trips("cat <<< hello")?;
        Ok(())
    }

    #[test]
    fn parse_here_document() -> Result<()> {
        let program = parse("cat <<EOF\nhello\nEOF\n")?;
        let ast::Command::Simple(cmd) = first_command(&program) else {
            anyhow::bail!("expected simple command");
        };
        let ast::CommandElement::Redirect(ast::Redirect::HereDocument(_, doc)) = &cmd.suffix[0]
        else {
            anyhow::bail!("expected here document");
        };
        assert_eq!(doc.body.text, "hello\n");
        assert!(doc.expand);
        Ok(())
    }

    #[test]
    fn parse_quoted_here_document_is_literal() -> Result<()> {
        let program = parse("cat <<'EOF'\n$x\nEOF\n")?;
        let ast::Command::Simple(cmd) = first_command(&program) else {
            anyhow::bail!("expected simple command");
        };
        let ast::CommandElement::Redirect(ast::Redirect::HereDocument(_, doc)) = &cmd.suffix[0]
        else {
            anyhow::bail!("expected here document");
        };
        assert!(!doc.expand);
        Ok(())
    }

    #[test]
    fn parse_pipe_ampersand() -> Result<()> {
        let program = parse("echo hi |& wc")?;
        let chain = &program.statements[0].0[0].chain;
        assert_eq!(chain.first.commands.len(), 2);

        // The first stage picks up an implicit 2>&1.
        let ast::Command::Simple(cmd) = &chain.first.commands[0] else {
            anyhow::bail!("expected simple command");
        };
        assert!(cmd
            .suffix
            .iter()
            .any(|e| matches!(e, ast::CommandElement::Redirect(_))));
        Ok(())
    }

    #[test]
    fn parse_syntax_error_reports_token() {
        let result = parse_program("echo hi; fi", &ParserOptions::default());
        assert!(matches!(result, Err(ParseError::NearToken(_))));
    }

    #[test]
    fn parse_round_trip_structures() -> Result<()> {
        assert_round_trips("echo one; echo two\necho three")?;
        assert_round_trips("case x in a) echo a ;; b|c) echo bc ;; esac")?;
        assert_round_trips("f() { echo hi; }\nf")?;
        assert_round_trips("for i in a b; do for j in c d; do echo $i$j; done; done")?;
        Ok(())
    }

    fn first_command(program: &ast::Program) -> &ast::Command {
        &program.statements[0].0[0].chain.first.commands[0]
    }
}
