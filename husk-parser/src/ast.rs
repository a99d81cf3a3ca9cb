//! The abstract syntax tree for shell programs, along with `Display`
//! implementations that serialise any tree back to equivalent source.

use std::fmt::Display;
use std::fmt::Write as _;

use crate::SourceSpan;
use crate::lexer;

const DISPLAY_INDENT: &str = "    ";

/// A complete shell program: a sequence of statement lists.
#[derive(Clone, Debug)]
pub struct Program {
    /// The top-level statement lists, in source order.
    pub statements: Vec<StatementList>,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for list in &self.statements {
            write!(f, "{list}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A sequence of and-or chains joined by `;`, `&`, or newlines.
#[derive(Clone, Debug, Default)]
pub struct StatementList(pub Vec<StatementListItem>);

impl Display for StatementList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }

            write!(f, "{}", item.chain)?;

            // Trailing `;` separators are implicit.
            if i < self.0.len() - 1 || matches!(item.separator, Separator::Async) {
                write!(f, "{}", item.separator)?;
            }
        }
        Ok(())
    }
}

/// One element of a statement list, with its trailing separator.
#[derive(Clone, Debug)]
pub struct StatementListItem {
    /// The chain of pipelines.
    pub chain: AndOrChain,
    /// Whether the chain runs synchronously (`;`) or in the background (`&`).
    pub separator: Separator,
}

/// How a statement is separated from its successor.
#[derive(Clone, Copy, Debug)]
pub enum Separator {
    /// `;` or newline; the statement completes before the next begins.
    Sync,
    /// `&`; the statement runs as a background job.
    Async,
}

impl Display for Separator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, ";"),
            Self::Async => write!(f, " &"),
        }
    }
}

/// A pipeline followed by zero or more `&&`/`||`-joined pipelines.
#[derive(Clone, Debug)]
pub struct AndOrChain {
    /// The first pipeline.
    pub first: Pipeline,
    /// Subsequent pipelines, each tagged with its joining operator.
    pub rest: Vec<ChainedPipeline>,
}

impl Display for AndOrChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.first)?;
        for chained in &self.rest {
            write!(f, "{chained}")?;
        }
        Ok(())
    }
}

/// A pipeline prefixed by the short-circuit operator that guards it.
#[derive(Clone, Debug)]
pub enum ChainedPipeline {
    /// Run only if the preceding pipeline succeeded.
    And(Pipeline),
    /// Run only if the preceding pipeline failed.
    Or(Pipeline),
}

impl Display for ChainedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And(p) => write!(f, " && {p}"),
            Self::Or(p) => write!(f, " || {p}"),
        }
    }
}

/// A pipeline of one or more commands.
#[derive(Clone, Debug)]
pub struct Pipeline {
    /// Whether the pipeline's exit status is logically negated (`!`).
    pub negated: bool,
    /// The commands in the pipeline, left to right.
    pub commands: Vec<Command>,
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "! ")?;
        }
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{command}")?;
        }
        Ok(())
    }
}

/// A single command.
#[derive(Clone, Debug)]
pub enum Command {
    /// A simple command (assignments, words, redirections).
    Simple(SimpleCommand),
    /// A compound command with optional trailing redirections.
    Compound(CompoundCommand, Option<RedirectList>),
    /// A function definition.
    FunctionDef(FunctionDefinition),
    /// A `[ ... ]` test command.
    Test(TestCommand),
    /// A `[[ ... ]]` extended test expression.
    ExtendedTest(ExtendedTestExpr),
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple(c) => write!(f, "{c}"),
            Self::Compound(c, redirects) => {
                write!(f, "{c}")?;
                if let Some(redirects) = redirects {
                    write!(f, "{redirects}")?;
                }
                Ok(())
            }
            Self::FunctionDef(d) => write!(f, "{d}"),
            Self::Test(t) => write!(f, "{t}"),
            Self::ExtendedTest(e) => write!(f, "[[ {e} ]]"),
        }
    }
}

/// A compound command.
#[derive(Clone, Debug)]
pub enum CompoundCommand {
    /// `{ ...; }` — runs in the current execution context.
    Group(GroupCommand),
    /// `( ... )` — runs in a subshell.
    Subshell(SubshellCommand),
    /// `if`/`elif`/`else`/`fi`.
    If(IfCommand),
    /// `while ...; do ...; done`.
    While(LoopCommand),
    /// `until ...; do ...; done`.
    Until(LoopCommand),
    /// `for name in ...; do ...; done`.
    For(ForCommand),
    /// `for (( init; cond; update )); do ...; done`.
    CStyleFor(CStyleForCommand),
    /// `case ... in ... esac`.
    Case(CaseCommand),
    /// `(( expr ))`.
    Arithmetic(ArithmeticCommand),
}

impl Display for CompoundCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(c) => write!(f, "{c}"),
            Self::Subshell(c) => write!(f, "{c}"),
            Self::If(c) => write!(f, "{c}"),
            Self::While(c) => write!(f, "while {c}"),
            Self::Until(c) => write!(f, "until {c}"),
            Self::For(c) => write!(f, "{c}"),
            Self::CStyleFor(c) => write!(f, "{c}"),
            Self::Case(c) => write!(f, "{c}"),
            Self::Arithmetic(c) => write!(f, "{c}"),
        }
    }
}

/// A brace group.
#[derive(Clone, Debug)]
pub struct GroupCommand(pub StatementList);

impl Display for GroupCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        write!(indenter::indented(f).with_str(DISPLAY_INDENT), "{}", self.0)?;
        writeln!(f)?;
        write!(f, "}}")
    }
}

/// A subshell.
#[derive(Clone, Debug)]
pub struct SubshellCommand(pub StatementList);

impl Display for SubshellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "( {} )", self.0)
    }
}

/// An `if` command with its `elif`/`else` clauses.
#[derive(Clone, Debug)]
pub struct IfCommand {
    /// The condition statements.
    pub condition: StatementList,
    /// Statements run when the condition succeeds.
    pub then_body: StatementList,
    /// `elif` clauses followed by at most one unconditional `else`.
    pub elses: Vec<ElseClause>,
}

impl Display for IfCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "if {}; then", self.condition)?;
        write!(
            indenter::indented(f).with_str(DISPLAY_INDENT),
            "{}",
            self.then_body
        )?;
        for clause in &self.elses {
            write!(f, "{clause}")?;
        }
        writeln!(f)?;
        write!(f, "fi")
    }
}

/// One `elif` (with condition) or `else` (without) clause.
#[derive(Clone, Debug)]
pub struct ElseClause {
    /// The `elif` condition; `None` for a plain `else`.
    pub condition: Option<StatementList>,
    /// The clause body.
    pub body: StatementList,
}

impl Display for ElseClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        match &self.condition {
            Some(condition) => writeln!(f, "elif {condition}; then")?,
            None => writeln!(f, "else")?,
        }
        write!(indenter::indented(f).with_str(DISPLAY_INDENT), "{}", self.body)
    }
}

/// The shared body of `while` and `until` loops.
#[derive(Clone, Debug)]
pub struct LoopCommand {
    /// The loop condition statements.
    pub condition: StatementList,
    /// The loop body.
    pub body: DoGroup,
}

impl Display for LoopCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}; {}", self.condition, self.body)
    }
}

/// A `for name [in words]` loop.
#[derive(Clone, Debug)]
pub struct ForCommand {
    /// The iteration variable name.
    pub variable: String,
    /// The words iterated over; `None` means the positional parameters.
    pub values: Option<Vec<Word>>,
    /// The loop body.
    pub body: DoGroup,
}

impl Display for ForCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "for {}", self.variable)?;
        if let Some(values) = &self.values {
            write!(f, " in")?;
            for value in values {
                write!(f, " {value}")?;
            }
        }
        writeln!(f, ";")?;
        write!(f, "{}", self.body)
    }
}

/// A C-style arithmetic `for` loop.
#[derive(Clone, Debug)]
pub struct CStyleForCommand {
    /// The initializer expression, evaluated once before the loop.
    pub init: Option<UnexpandedArithmeticExpr>,
    /// The loop condition.
    pub condition: Option<UnexpandedArithmeticExpr>,
    /// The update expression, evaluated after each iteration.
    pub update: Option<UnexpandedArithmeticExpr>,
    /// The loop body.
    pub body: DoGroup,
}

impl Display for CStyleForCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "for ((")?;
        if let Some(init) = &self.init {
            write!(f, "{init}")?;
        }
        write!(f, "; ")?;
        if let Some(condition) = &self.condition {
            write!(f, "{condition}")?;
        }
        write!(f, "; ")?;
        if let Some(update) = &self.update {
            write!(f, "{update}")?;
        }
        writeln!(f, "))")?;
        write!(f, "{}", self.body)
    }
}

/// A `do ...; done` group.
#[derive(Clone, Debug)]
pub struct DoGroup(pub StatementList);

impl Display for DoGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "do")?;
        write!(indenter::indented(f).with_str(DISPLAY_INDENT), "{}", self.0)?;
        writeln!(f)?;
        write!(f, "done")
    }
}

/// A `case` command.
#[derive(Clone, Debug)]
pub struct CaseCommand {
    /// The word whose expansion is matched against the arm patterns.
    pub subject: Word,
    /// The case arms, in order.
    pub arms: Vec<CaseArm>,
}

impl Display for CaseCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "case {} in", self.subject)?;
        for arm in &self.arms {
            write!(indenter::indented(f).with_str(DISPLAY_INDENT), "{arm}")?;
        }
        writeln!(f)?;
        write!(f, "esac")
    }
}

/// One arm of a `case` command.
#[derive(Clone, Debug)]
pub struct CaseArm {
    /// The patterns that select this arm.
    pub patterns: Vec<Word>,
    /// The arm body, if any.
    pub body: Option<StatementList>,
    /// What happens after the body runs.
    pub terminator: CaseArmTerminator,
}

impl Display for CaseArm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{pattern}")?;
        }
        writeln!(f, ")")?;
        if let Some(body) = &self.body {
            write!(indenter::indented(f).with_str(DISPLAY_INDENT), "{body}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.terminator)
    }
}

/// The action taken when a `case` arm's body finishes.
#[derive(Clone, Copy, Debug)]
pub enum CaseArmTerminator {
    /// `;;` — leave the `case` entirely.
    Break,
    /// `;&` — run the next arm's body without testing its patterns.
    Fallthrough,
    /// `;;&` — resume pattern matching at the next arm.
    ContinueMatching,
}

impl Display for CaseArmTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Break => write!(f, ";;"),
            Self::Fallthrough => write!(f, ";&"),
            Self::ContinueMatching => write!(f, ";;&"),
        }
    }
}

/// A standalone `(( expr ))` command.
#[derive(Clone, Debug)]
pub struct ArithmeticCommand {
    /// The raw, not-yet-expanded expression text.
    pub expr: UnexpandedArithmeticExpr,
}

impl Display for ArithmeticCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(({}))", self.expr)
    }
}

/// A function definition.
#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    /// The function name.
    pub name: String,
    /// The function body.
    pub body: FunctionBody,
    /// The source span of the definition, when known.
    pub span: Option<SourceSpan>,
}

impl Display for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ()", self.name)?;
        write!(f, "{}", self.body)
    }
}

/// The body of a function: a compound command plus optional redirections.
#[derive(Clone, Debug)]
pub struct FunctionBody(pub CompoundCommand, pub Option<RedirectList>);

impl Display for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        if let Some(redirects) = &self.1 {
            write!(f, "{redirects}")?;
        }
        Ok(())
    }
}

/// A `[ ... ]` test command; the closing `]` is not included in the args.
#[derive(Clone, Debug)]
pub struct TestCommand {
    /// The raw argument words between the brackets.
    pub args: Vec<Word>,
}

impl Display for TestCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, " ]")
    }
}

/// A simple command.
#[derive(Clone, Debug, Default)]
pub struct SimpleCommand {
    /// Assignments and redirections preceding the command word.
    pub prefix: Vec<CommandElement>,
    /// The command word itself, if any.
    pub name: Option<Word>,
    /// Arguments, assignments, and redirections following the command word.
    pub suffix: Vec<CommandElement>,
    /// The source span of the command, when known.
    pub span: Option<SourceSpan>,
}

impl SimpleCommand {
    /// Iterates over all elements of the command in source order, not
    /// including the command word.
    pub fn elements(&self) -> impl Iterator<Item = &CommandElement> {
        self.prefix.iter().chain(self.suffix.iter())
    }
}

impl Display for SimpleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut need_space = false;

        for element in &self.prefix {
            if need_space {
                write!(f, " ")?;
            }
            write!(f, "{element}")?;
            need_space = true;
        }

        if let Some(name) = &self.name {
            if need_space {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
            need_space = true;
        }

        for element in &self.suffix {
            if need_space {
                write!(f, " ")?;
            }
            write!(f, "{element}")?;
            need_space = true;
        }

        Ok(())
    }
}

/// One element of a simple command.
#[derive(Clone, Debug)]
pub enum CommandElement {
    /// An I/O redirection.
    Redirect(Redirect),
    /// A plain word.
    Word(Word),
    /// An assignment, along with the word it was parsed from.
    Assignment(Assignment, Word),
    /// A process substitution.
    ProcessSubstitution(ProcessSubstitutionKind, SubshellCommand),
}

impl Display for CommandElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redirect(r) => write!(f, "{r}"),
            Self::Word(w) => write!(f, "{w}"),
            Self::Assignment(_, w) => write!(f, "{w}"),
            Self::ProcessSubstitution(kind, subshell) => {
                write!(f, "{kind}({})", subshell.0)
            }
        }
    }
}

/// An assignment.
#[derive(Clone, Debug)]
pub struct Assignment {
    /// What is being assigned to.
    pub target: AssignmentTarget,
    /// The value being assigned.
    pub value: AssignmentValue,
    /// Whether the `+=` form was used.
    pub append: bool,
}

impl Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target)?;
        if self.append {
            write!(f, "+")?;
        }
        write!(f, "={}", self.value)
    }
}

/// The target of an assignment.
#[derive(Clone, Debug)]
pub enum AssignmentTarget {
    /// A named variable.
    Variable(String),
    /// An element of an array, with its unexpanded index text.
    ArrayElement(String, String),
}

impl Display for AssignmentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "{name}"),
            Self::ArrayElement(name, index) => write!(f, "{name}[{index}]"),
        }
    }
}

/// The value side of an assignment.
#[derive(Clone, Debug)]
pub enum AssignmentValue {
    /// A single word.
    Scalar(Word),
    /// An array literal, with optional per-element keys.
    Array(Vec<(Option<Word>, Word)>),
}

impl Display for AssignmentValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(word) => write!(f, "{word}"),
            Self::Array(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match element {
                        (Some(key), value) => write!(f, "[{key}]={value}")?,
                        (None, value) => write!(f, "{value}")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// A list of redirections.
#[derive(Clone, Debug)]
pub struct RedirectList(pub Vec<Redirect>);

impl Display for RedirectList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for redirect in &self.0 {
            write!(f, " {redirect}")?;
        }
        Ok(())
    }
}

/// A single I/O redirection.
#[derive(Clone, Debug)]
pub enum Redirect {
    /// A file (or FD-duplication) redirection.
    File(Option<u32>, RedirectOperator, RedirectTarget),
    /// A here-document.
    HereDocument(Option<u32>, HereDocument),
    /// A here-string.
    HereString(Option<u32>, Word),
    /// `&>` / `&>>`: both stdout and stderr to a file.
    OutputAndError(Word, bool),
}

impl Display for Redirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(fd, operator, target) => {
                if let Some(fd) = fd {
                    write!(f, "{fd}")?;
                }
                write!(f, "{operator}{target}")
            }
            Self::HereDocument(fd, doc) => {
                if let Some(fd) = fd {
                    write!(f, "{fd}")?;
                }
                write!(f, "<<")?;
                if doc.strip_tabs {
                    write!(f, "-")?;
                }
                writeln!(f, "{}", doc.delimiter)?;
                write!(f, "{}", doc.body)?;
                write!(f, "{}", doc.delimiter)
            }
            Self::HereString(fd, word) => {
                if let Some(fd) = fd {
                    write!(f, "{fd}")?;
                }
                write!(f, "<<< {word}")
            }
            Self::OutputAndError(target, append) => {
                write!(f, "&>")?;
                if *append {
                    write!(f, ">")?;
                }
                write!(f, " {target}")
            }
        }
    }
}

/// The operator of a file redirection.
#[derive(Clone, Copy, Debug)]
pub enum RedirectOperator {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `>>`
    Append,
    /// `<>`
    ReadWrite,
    /// `>|`
    Clobber,
    /// `<&`
    DupInput,
    /// `>&`
    DupOutput,
}

impl Display for RedirectOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "<"),
            Self::Write => write!(f, ">"),
            Self::Append => write!(f, ">>"),
            Self::ReadWrite => write!(f, "<>"),
            Self::Clobber => write!(f, ">|"),
            Self::DupInput => write!(f, "<&"),
            Self::DupOutput => write!(f, ">&"),
        }
    }
}

/// The target of a file redirection.
#[derive(Clone, Debug)]
pub enum RedirectTarget {
    /// A path to open.
    Filename(Word),
    /// An FD to duplicate (or `-` to close), still unexpanded.
    Duplicate(Word),
    /// A process substitution.
    ProcessSubstitution(ProcessSubstitutionKind, SubshellCommand),
}

impl Display for RedirectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filename(word) => write!(f, "{word}"),
            Self::Duplicate(word) => write!(f, "{word}"),
            Self::ProcessSubstitution(kind, subshell) => {
                write!(f, "{kind}({})", subshell.0)
            }
        }
    }
}

/// A here-document.
#[derive(Clone, Debug)]
pub struct HereDocument {
    /// Whether leading tabs are stripped from body lines (`<<-`).
    pub strip_tabs: bool,
    /// Whether the body undergoes expansion (the delimiter was unquoted).
    pub expand: bool,
    /// The delimiter word.
    pub delimiter: Word,
    /// The body text, ending in a newline.
    pub body: Word,
}

/// The direction of a process substitution.
#[derive(Clone, Copy, Debug)]
pub enum ProcessSubstitutionKind {
    /// `<(...)`: the command's output is read.
    Read,
    /// `>(...)`: the command's input is written.
    Write,
}

impl Display for ProcessSubstitutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "<"),
            Self::Write => write!(f, ">"),
        }
    }
}

/// A shell word, with quoting preserved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Word {
    /// The raw text of the word.
    pub text: String,
}

impl Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl From<&lexer::Token> for Word {
    fn from(token: &lexer::Token) -> Self {
        Self {
            text: token.to_str().to_owned(),
        }
    }
}

impl From<String> for Word {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl Word {
    /// Constructs a new word from the given text.
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
        }
    }

    /// Returns the word's raw text.
    pub fn flatten(&self) -> String {
        self.text.clone()
    }
}

/// An arithmetic expression that has not yet been expanded or parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnexpandedArithmeticExpr {
    /// The raw text of the expression.
    pub text: String,
}

impl Display for UnexpandedArithmeticExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// A parsed arithmetic expression.
#[derive(Clone, Debug)]
pub enum ArithmeticExpr {
    /// A literal value.
    Literal(i64),
    /// A variable or array-element dereference.
    Reference(ArithmeticTarget),
    /// A unary operation.
    UnaryOp(UnaryOperator, Box<ArithmeticExpr>),
    /// A binary operation.
    BinaryOp(BinaryOperator, Box<ArithmeticExpr>, Box<ArithmeticExpr>),
    /// A ternary conditional.
    Conditional(
        Box<ArithmeticExpr>,
        Box<ArithmeticExpr>,
        Box<ArithmeticExpr>,
    ),
    /// A plain assignment.
    Assignment(ArithmeticTarget, Box<ArithmeticExpr>),
    /// A compound assignment (e.g. `x += 1`).
    BinaryAssignment(BinaryOperator, ArithmeticTarget, Box<ArithmeticExpr>),
    /// An increment or decrement.
    UnaryAssignment(UnaryAssignmentOperator, ArithmeticTarget),
}

impl Display for ArithmeticExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(n) => write!(f, "{n}"),
            Self::Reference(target) => write!(f, "{target}"),
            Self::UnaryOp(op, operand) => write!(f, "{op}{operand}"),
            Self::BinaryOp(op, left, right) => {
                if matches!(op, BinaryOperator::Comma) {
                    write!(f, "{left}{op} {right}")
                } else {
                    write!(f, "{left} {op} {right}")
                }
            }
            Self::Conditional(cond, then, otherwise) => {
                write!(f, "{cond} ? {then} : {otherwise}")
            }
            Self::Assignment(target, value) => write!(f, "{target} = {value}"),
            Self::BinaryAssignment(op, target, value) => {
                write!(f, "{target} {op}= {value}")
            }
            Self::UnaryAssignment(op, target) => match op {
                UnaryAssignmentOperator::PrefixIncrement
                | UnaryAssignmentOperator::PrefixDecrement => write!(f, "{op}{target}"),
                UnaryAssignmentOperator::PostfixIncrement
                | UnaryAssignmentOperator::PostfixDecrement => write!(f, "{target}{op}"),
            },
        }
    }
}

/// A binary arithmetic operator.
#[derive(Clone, Copy, Debug)]
pub enum BinaryOperator {
    /// `**`
    Power,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `,`
    Comma,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `&`
    BitwiseAnd,
    /// `^`
    BitwiseXor,
    /// `|`
    BitwiseOr,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Power => write!(f, "**"),
            Self::Multiply => write!(f, "*"),
            Self::Divide => write!(f, "/"),
            Self::Modulo => write!(f, "%"),
            Self::Comma => write!(f, ","),
            Self::Add => write!(f, "+"),
            Self::Subtract => write!(f, "-"),
            Self::ShiftLeft => write!(f, "<<"),
            Self::ShiftRight => write!(f, ">>"),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::Equals => write!(f, "=="),
            Self::NotEquals => write!(f, "!="),
            Self::BitwiseAnd => write!(f, "&"),
            Self::BitwiseXor => write!(f, "^"),
            Self::BitwiseOr => write!(f, "|"),
            Self::LogicalAnd => write!(f, "&&"),
            Self::LogicalOr => write!(f, "||"),
        }
    }
}

/// A unary arithmetic operator.
#[derive(Clone, Copy, Debug)]
pub enum UnaryOperator {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `~`
    BitwiseNot,
    /// `!`
    LogicalNot,
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::BitwiseNot => write!(f, "~"),
            Self::LogicalNot => write!(f, "!"),
        }
    }
}

/// An increment/decrement operator.
#[derive(Clone, Copy, Debug)]
pub enum UnaryAssignmentOperator {
    /// `++x`
    PrefixIncrement,
    /// `--x`
    PrefixDecrement,
    /// `x++`
    PostfixIncrement,
    /// `x--`
    PostfixDecrement,
}

impl Display for UnaryAssignmentOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrefixIncrement | Self::PostfixIncrement => write!(f, "++"),
            Self::PrefixDecrement | Self::PostfixDecrement => write!(f, "--"),
        }
    }
}

/// The target of an arithmetic assignment.
#[derive(Clone, Debug)]
pub enum ArithmeticTarget {
    /// A named variable.
    Variable(String),
    /// An element of an array.
    ArrayElement(String, Box<ArithmeticExpr>),
}

impl Display for ArithmeticTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "{name}"),
            Self::ArrayElement(name, index) => write!(f, "{name}[{index}]"),
        }
    }
}

/// A `[`/`test` expression, parsed from the command's arguments.
#[derive(Clone, Debug)]
pub enum TestExpr {
    /// Always false (e.g. `[ ]` with no arguments).
    False,
    /// A bare string; true when non-empty.
    Literal(String),
    /// `-a` conjunction.
    And(Box<TestExpr>, Box<TestExpr>),
    /// `-o` disjunction.
    Or(Box<TestExpr>, Box<TestExpr>),
    /// `!` negation.
    Not(Box<TestExpr>),
    /// A parenthesized expression.
    Parenthesized(Box<TestExpr>),
    /// A unary predicate applied to an operand.
    UnaryTest(UnaryPredicate, String),
    /// A binary predicate applied to two operands.
    BinaryTest(BinaryPredicate, String, String),
}

/// A `[[ ... ]]` expression.
#[derive(Clone, Debug)]
pub enum ExtendedTestExpr {
    /// `&&` conjunction.
    And(Box<ExtendedTestExpr>, Box<ExtendedTestExpr>),
    /// `||` disjunction.
    Or(Box<ExtendedTestExpr>, Box<ExtendedTestExpr>),
    /// `!` negation.
    Not(Box<ExtendedTestExpr>),
    /// A parenthesized expression.
    Parenthesized(Box<ExtendedTestExpr>),
    /// A unary predicate applied to an operand word.
    UnaryTest(UnaryPredicate, Word),
    /// A binary predicate applied to two operand words.
    BinaryTest(BinaryPredicate, Word, Word),
}

impl Display for ExtendedTestExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And(left, right) => write!(f, "{left} && {right}"),
            Self::Or(left, right) => write!(f, "{left} || {right}"),
            Self::Not(expr) => write!(f, "! {expr}"),
            Self::Parenthesized(expr) => write!(f, "( {expr} )"),
            Self::UnaryTest(pred, operand) => write!(f, "{pred} {operand}"),
            Self::BinaryTest(pred, left, right) => write!(f, "{left} {pred} {right}"),
        }
    }
}

/// A unary test predicate.
#[derive(Clone, Copy, Debug)]
pub enum UnaryPredicate {
    /// `-e`/`-a`: the path exists.
    FileExists,
    /// `-b`: block device.
    IsBlockDevice,
    /// `-c`: character device.
    IsCharDevice,
    /// `-d`: directory.
    IsDirectory,
    /// `-f`: regular file.
    IsRegularFile,
    /// `-g`: setgid bit set.
    IsSetgid,
    /// `-h`/`-L`: symbolic link.
    IsSymlink,
    /// `-k`: sticky bit set.
    HasStickyBit,
    /// `-p`: FIFO.
    IsFifo,
    /// `-r`: readable.
    IsReadable,
    /// `-s`: exists with non-zero size.
    IsNonEmptyFile,
    /// `-t`: FD refers to a terminal.
    FdIsTerminal,
    /// `-u`: setuid bit set.
    IsSetuid,
    /// `-w`: writable.
    IsWritable,
    /// `-x`: executable.
    IsExecutable,
    /// `-G`: owned by the effective group id.
    OwnedByEffectiveGid,
    /// `-N`: modified since last read.
    ModifiedSinceRead,
    /// `-O`: owned by the effective user id.
    OwnedByEffectiveUid,
    /// `-S`: socket.
    IsSocket,
    /// `-o`: the named shell option is enabled.
    OptionEnabled,
    /// `-v`: the named variable is set.
    VarIsSet,
    /// `-R`: the named variable is a set nameref.
    VarIsNameref,
    /// `-z`: zero-length string.
    StringIsEmpty,
    /// `-n`: non-zero-length string.
    StringIsNonEmpty,
}

impl Display for UnaryPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileExists => write!(f, "-e"),
            Self::IsBlockDevice => write!(f, "-b"),
            Self::IsCharDevice => write!(f, "-c"),
            Self::IsDirectory => write!(f, "-d"),
            Self::IsRegularFile => write!(f, "-f"),
            Self::IsSetgid => write!(f, "-g"),
            Self::IsSymlink => write!(f, "-h"),
            Self::HasStickyBit => write!(f, "-k"),
            Self::IsFifo => write!(f, "-p"),
            Self::IsReadable => write!(f, "-r"),
            Self::IsNonEmptyFile => write!(f, "-s"),
            Self::FdIsTerminal => write!(f, "-t"),
            Self::IsSetuid => write!(f, "-u"),
            Self::IsWritable => write!(f, "-w"),
            Self::IsExecutable => write!(f, "-x"),
            Self::OwnedByEffectiveGid => write!(f, "-G"),
            Self::ModifiedSinceRead => write!(f, "-N"),
            Self::OwnedByEffectiveUid => write!(f, "-O"),
            Self::IsSocket => write!(f, "-S"),
            Self::OptionEnabled => write!(f, "-o"),
            Self::VarIsSet => write!(f, "-v"),
            Self::VarIsNameref => write!(f, "-R"),
            Self::StringIsEmpty => write!(f, "-z"),
            Self::StringIsNonEmpty => write!(f, "-n"),
        }
    }
}

/// A binary test predicate.
#[derive(Clone, Copy, Debug)]
pub enum BinaryPredicate {
    /// `-ef`: same device and inode.
    SameFile,
    /// `-nt`: left is newer (or right doesn't exist).
    NewerThan,
    /// `-ot`: left is older (or left doesn't exist).
    OlderThan,
    /// `==`/`=` inside `[[ ]]`: string matches glob pattern.
    MatchesPattern,
    /// `!=` inside `[[ ]]`: string does not match glob pattern.
    NotMatchesPattern,
    /// `=~`: string matches an extended regular expression.
    MatchesRegex,
    /// `=~` with a quoted operand: string contains the literal substring.
    ContainsSubstring,
    /// `=`/`==` inside `[ ]`: exact string equality.
    StringEquals,
    /// `!=` inside `[ ]`: exact string inequality.
    StringNotEquals,
    /// `<`: sorts before.
    SortsBefore,
    /// `>`: sorts after.
    SortsAfter,
    /// `-eq`
    ArithmeticEqual,
    /// `-ne`
    ArithmeticNotEqual,
    /// `-lt`
    ArithmeticLessThan,
    /// `-le`
    ArithmeticLessThanOrEqual,
    /// `-gt`
    ArithmeticGreaterThan,
    /// `-ge`
    ArithmeticGreaterThanOrEqual,
}

impl Display for BinaryPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameFile => write!(f, "-ef"),
            Self::NewerThan => write!(f, "-nt"),
            Self::OlderThan => write!(f, "-ot"),
            Self::MatchesPattern | Self::StringEquals => write!(f, "=="),
            Self::NotMatchesPattern | Self::StringNotEquals => write!(f, "!="),
            Self::MatchesRegex | Self::ContainsSubstring => write!(f, "=~"),
            Self::SortsBefore => write!(f, "<"),
            Self::SortsAfter => write!(f, ">"),
            Self::ArithmeticEqual => write!(f, "-eq"),
            Self::ArithmeticNotEqual => write!(f, "-ne"),
            Self::ArithmeticLessThan => write!(f, "-lt"),
            Self::ArithmeticLessThanOrEqual => write!(f, "-le"),
            Self::ArithmeticGreaterThan => write!(f, "-gt"),
            Self::ArithmeticGreaterThanOrEqual => write!(f, "-ge"),
        }
    }
}
