//! The executor: walks the syntax tree against a session, propagating exit
//! codes and unwind signals, orchestrating pipelines, redirections, and
//! subshell isolation.

use std::io::Write;
use std::path::{Path, PathBuf};

use husk_parser::ast;
use itertools::Itertools;

use crate::arithmetic::ExpandAndEvaluate;
use crate::commands::{self, CommandArg, CommandSpawnResult};
use crate::env::{EnvironmentLookup, EnvironmentScope};
use crate::error::{Error, ErrorKind};
use crate::expansion;
use crate::jobs;
use crate::openfiles::{OpenFile, OpenFiles};
use crate::results::{StatementOutcome, Unwind};
use crate::session::Session;
use crate::testexpr;
use crate::traps::TrapCondition;
use crate::variables::{ArrayLiteral, ValueLiteral, VariableValue};

/// Parameters scoped to one execution context: the FD view plus bookkeeping
/// the executor threads through nested constructs.
#[derive(Clone)]
pub struct ExecutionParameters {
    /// The file descriptors visible to commands run in this context.
    pub open_files: OpenFiles,
    /// FDs altered by redirections in the current command (consumed by
    /// `exec` to decide what to persist).
    pub(crate) modified_fds: Vec<u32>,
    /// Whether failures here are part of a condition (suppresses `errexit`
    /// and the `ERR` trap).
    pub(crate) in_condition_context: bool,
}

impl Default for ExecutionParameters {
    fn default() -> Self {
        Self {
            open_files: OpenFiles::new(),
            modified_fds: vec![],
            in_condition_context: false,
        }
    }
}

impl ExecutionParameters {
    /// Returns a duplicate of the FD at the given number, if open.
    pub fn fd(&self, fd: u32) -> Option<OpenFile> {
        self.open_files.get(fd).and_then(|f| f.try_dup().ok())
    }

    /// Returns the context's standard input.
    pub fn stdin(&self) -> OpenFile {
        self.fd(0).unwrap_or_else(|| OpenFile::Stdin(std::io::stdin()))
    }

    /// Returns the context's standard output.
    pub fn stdout(&self) -> OpenFile {
        self.fd(1).unwrap_or_else(|| OpenFile::Stdout(std::io::stdout()))
    }

    /// Returns the context's standard error.
    pub fn stderr(&self) -> OpenFile {
        self.fd(2).unwrap_or_else(|| OpenFile::Stderr(std::io::stderr()))
    }

    fn in_condition(&self) -> Self {
        let mut params = self.clone();
        params.in_condition_context = true;
        params
    }
}

/// Implemented by syntax-tree nodes that can be evaluated against a session.
#[async_trait::async_trait]
pub trait Execute {
    /// Evaluates the node, producing an exit code and any unwind signal.
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error>;
}

#[async_trait::async_trait]
impl Execute for ast::Program {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let mut outcome = StatementOutcome::success();

        for list in &self.statements {
            outcome = list.execute(session, params).await?;
            if !outcome.is_normal_flow() {
                break;
            }
        }

        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl Execute for ast::StatementList {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let mut outcome = StatementOutcome::success();

        for ast::StatementListItem { chain, separator } in &self.0 {
            // Traps enqueued by signals run between statements.
            session.drain_pending_traps(params).await?;

            match separator {
                ast::Separator::Async => {
                    spawn_background_job(chain, session, params);
                    outcome = StatementOutcome::success();
                }
                ast::Separator::Sync => {
                    outcome = chain.execute(session, params).await?;
                }
            }

            if !outcome.is_normal_flow() {
                break;
            }
        }

        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

fn spawn_background_job(
    chain: &ast::AndOrChain,
    session: &mut Session,
    params: &ExecutionParameters,
) {
    let mut subshell = session.clone_as_subshell();
    // The job may outlive this run, so it must not hold the run's capture
    // pipes open.
    let child_params = session.detach_capture_params(params);
    let chain = chain.clone();
    let command_line = chain.to_string();

    let handle = tokio::spawn(async move {
        chain.execute(&mut subshell, &child_params).await
    });

    session.jobs.add_as_current(jobs::Job::new(
        [jobs::JobTask::Internal(handle)],
        command_line,
    ));
}

#[async_trait::async_trait]
impl Execute for ast::AndOrChain {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        // Every pipeline but the last runs in a condition context; a failure
        // that short-circuits does not trigger errexit.
        let first_params = if self.rest.is_empty() {
            params.clone()
        } else {
            params.in_condition()
        };

        let mut last_in_condition = first_params.in_condition_context;
        let mut outcome = self.first.execute(session, &first_params).await?;

        for (i, chained) in self.rest.iter().enumerate() {
            if !outcome.is_normal_flow() {
                break;
            }

            let (run_if_success, pipeline) = match chained {
                ast::ChainedPipeline::And(p) => (true, p),
                ast::ChainedPipeline::Or(p) => (false, p),
            };

            if outcome.is_success() != run_if_success {
                continue;
            }

            let stage_params = if i == self.rest.len() - 1 {
                params.clone()
            } else {
                params.in_condition()
            };

            last_in_condition = stage_params.in_condition_context;
            outcome = pipeline.execute(session, &stage_params).await?;
        }

        // errexit and the ERR trap key off the last pipeline that actually
        // ran: a short-circuited left operand never triggers them.
        if !last_in_condition {
            if !outcome.is_success() && outcome.is_normal_flow() {
                session
                    .fire_err_trap_if_applicable(params, outcome.exit_code)
                    .await?;
            }

            session.apply_errexit_if_applicable(params, &mut outcome);
        }

        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl Execute for ast::Pipeline {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        // A negated pipeline is a condition context for errexit purposes.
        let negated_params;
        let params = if self.negated {
            negated_params = params.in_condition();
            &negated_params
        } else {
            params
        };

        let mut outcome = if self.commands.len() == 1 {
            let outcome = execute_command(&self.commands[0], session, params).await?;
            session.last_pipeline_statuses = vec![outcome.exit_code];
            outcome
        } else {
            execute_multi_stage_pipeline(self, session, params).await?
        };

        if self.negated {
            outcome.exit_code = if outcome.exit_code == 0 { 1 } else { 0 };
        }

        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

async fn execute_multi_stage_pipeline(
    pipeline: &ast::Pipeline,
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<StatementOutcome, Error> {
    let stage_count = pipeline.commands.len();
    let mut spawned = Vec::with_capacity(stage_count);
    let mut prev_reader: Option<os_pipe::PipeReader> = None;

    for (i, command) in pipeline.commands.iter().enumerate() {
        let mut stage_params = params.clone();

        if let Some(reader) = prev_reader.take() {
            stage_params.open_files.set(0, reader.into());
        }

        if i < stage_count - 1 {
            let (reader, writer) = crate::openfiles::pipe()?;
            stage_params.open_files.set(1, writer.into());
            prev_reader = Some(reader);
        }

        // Every stage runs in a subshell context; mutations don't leak.
        let mut subshell = session.clone_as_subshell();
        let command = command.clone();

        let handle = tokio::spawn(async move {
            execute_command(&command, &mut subshell, &stage_params).await
        });

        spawned.push(CommandSpawnResult::InternalTask(handle));
    }

    // Wait left-to-right, recording each stage's status.
    let mut statuses = Vec::with_capacity(stage_count);
    let mut outcome = StatementOutcome::success();
    for result in spawned {
        outcome = result.wait().await?;
        statuses.push(outcome.exit_code);
    }

    // Under pipefail, the status is the last non-zero stage's.
    if session.options.pipefail {
        if let Some(failed) = statuses.iter().rev().find(|code| **code != 0) {
            outcome = StatementOutcome::new(*failed);
        }
    }

    session.last_pipeline_statuses = statuses;
    Ok(outcome)
}

/// Executes a single command of any kind in the current session.
pub(crate) async fn execute_command(
    command: &ast::Command,
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<StatementOutcome, Error> {
    match execute_command_inner(command, session, params).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            let outcome = expansion_error_outcome(e, params)?;
            session.last_exit_status = outcome.exit_code;
            Ok(outcome)
        }
    }
}

/// Maps expansion-class failures onto exit statuses: an unbound variable
/// (under `set -u`) ends the run, while other expansion errors fail just the
/// command.
fn expansion_error_outcome(
    e: Error,
    params: &ExecutionParameters,
) -> Result<StatementOutcome, Error> {
    use crate::error::ErrorKind as K;

    let ends_run = matches!(e.kind(), K::UnboundVariable(_));
    let fails_command = matches!(
        e.kind(),
        K::EvalError(_)
            | K::BadSubstitution(_)
            | K::CheckedExpansionError(_)
            | K::WordParseError(_)
            | K::TildeWithoutHome
            | K::NamerefCycle(_)
            | K::InvalidNamerefTarget(_)
            | K::CannotAssignToSpecialParameter
            | K::ArrayIndexOutOfRange(_)
            | K::ReadonlyVariable(_)
            | K::AssigningListToArrayMember
            | K::ArrayConversion(_)
            | K::NotAnArray(_)
            | K::InvalidPattern(_)
            | K::RegexError(_)
    );

    if !ends_run && !fails_command {
        return Err(e);
    }

    let mut stderr = params.stderr();
    let _ = writeln!(stderr, "husk: {e}");

    if ends_run {
        Ok(StatementOutcome::unwinding(1, Unwind::Exit))
    } else {
        Ok(StatementOutcome::new(1))
    }
}

async fn execute_command_inner(
    command: &ast::Command,
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<StatementOutcome, Error> {
    if session.options.noexec {
        return Ok(StatementOutcome::success());
    }

    match command {
        ast::Command::Simple(simple) => {
            let spawn_result = execute_simple_command(simple, session, params).await?;
            let outcome = spawn_result.wait().await?;
            session.last_exit_status = outcome.exit_code;
            Ok(outcome)
        }
        ast::Command::Compound(compound, redirects) => {
            let mut params = params.clone();
            if let Some(redirects) = redirects {
                for redirect in &redirects.0 {
                    if let Err(e) = setup_redirect(session, &mut params, redirect).await {
                        let mut stderr = params.stderr();
                        let _ = writeln!(stderr, "husk: {e}");
                        return Ok(StatementOutcome::new(1));
                    }
                }
            }
            compound.execute(session, &params).await
        }
        ast::Command::FunctionDef(definition) => {
            session.funcs.define(
                definition.name.clone(),
                std::sync::Arc::new(definition.clone()),
            );
            session.last_exit_status = 0;
            Ok(StatementOutcome::success())
        }
        ast::Command::Test(test) => {
            // Operands expand with splitting, matching `[` as a command.
            let mut expanded_args = vec![];
            for arg in &test.args {
                let mut fields =
                    expansion::full_expand_and_split_word(session, params, arg).await?;
                expanded_args.append(&mut fields);
            }

            let outcome = match husk_parser::test_command::parse(expanded_args.as_slice()) {
                Ok(expr) => {
                    if testexpr::eval_test_expr(&expr, session)? {
                        StatementOutcome::success()
                    } else {
                        StatementOutcome::new(1)
                    }
                }
                Err(_) => {
                    let mut stderr = params.stderr();
                    let _ = writeln!(stderr, "husk: [: syntax error in expression");
                    StatementOutcome::new(2)
                }
            };

            session.last_exit_status = outcome.exit_code;
            Ok(outcome)
        }
        ast::Command::ExtendedTest(expr) => {
            let result = testexpr::eval_extended_test_expr(expr, session, params).await;
            let outcome = match result {
                Ok(true) => StatementOutcome::success(),
                Ok(false) => StatementOutcome::new(1),
                Err(e) => {
                    let mut stderr = params.stderr();
                    let _ = writeln!(stderr, "husk: {e}");
                    StatementOutcome::new(2)
                }
            };
            session.last_exit_status = outcome.exit_code;
            Ok(outcome)
        }
    }
}

#[async_trait::async_trait]
impl Execute for ast::CompoundCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        match self {
            Self::Group(ast::GroupCommand(list)) => list.execute(session, params).await,
            Self::Subshell(ast::SubshellCommand(list)) => {
                // State mutations stay in the child; only the exit code (and
                // whatever it wrote) escape.
                let mut subshell = session.clone_as_subshell();
                let child_outcome = list.execute(&mut subshell, params).await?;
                let outcome = StatementOutcome::new(child_outcome.exit_code);
                session.last_exit_status = outcome.exit_code;
                Ok(outcome)
            }
            Self::If(cmd) => cmd.execute(session, params).await,
            Self::While(cmd) => execute_loop(session, params, cmd, true).await,
            Self::Until(cmd) => execute_loop(session, params, cmd, false).await,
            Self::For(cmd) => cmd.execute(session, params).await,
            Self::CStyleFor(cmd) => cmd.execute(session, params).await,
            Self::Case(cmd) => cmd.execute(session, params).await,
            Self::Arithmetic(cmd) => cmd.execute(session, params).await,
        }
    }
}

#[async_trait::async_trait]
impl Execute for ast::IfCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let condition = self
            .condition
            .execute(session, &params.in_condition())
            .await?;
        if !condition.is_normal_flow() {
            return Ok(condition);
        }

        if condition.is_success() {
            return self.then_body.execute(session, params).await;
        }

        for clause in &self.elses {
            match &clause.condition {
                Some(elif_condition) => {
                    let outcome = elif_condition
                        .execute(session, &params.in_condition())
                        .await?;
                    if !outcome.is_normal_flow() {
                        return Ok(outcome);
                    }
                    if outcome.is_success() {
                        return clause.body.execute(session, params).await;
                    }
                }
                None => return clause.body.execute(session, params).await,
            }
        }

        let outcome = StatementOutcome::success();
        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

/// Runs the body of a loop iteration and folds its unwind signal into the
/// loop's control flow. Returns `(outcome, keep_looping)`.
fn fold_loop_iteration(outcome: StatementOutcome) -> (StatementOutcome, bool) {
    match outcome.unwind {
        Unwind::Continue(n) => {
            if n <= 1 {
                (StatementOutcome::new(outcome.exit_code), true)
            } else {
                (
                    StatementOutcome::unwinding(outcome.exit_code, Unwind::Continue(n - 1)),
                    false,
                )
            }
        }
        Unwind::Break(n) => {
            if n <= 1 {
                (StatementOutcome::new(outcome.exit_code), false)
            } else {
                (
                    StatementOutcome::unwinding(outcome.exit_code, Unwind::Break(n - 1)),
                    false,
                )
            }
        }
        Unwind::None => (outcome, true),
        _ => (outcome, false),
    }
}

async fn execute_loop(
    session: &mut Session,
    params: &ExecutionParameters,
    cmd: &ast::LoopCommand,
    run_while_success: bool,
) -> Result<StatementOutcome, Error> {
    let mut result = StatementOutcome::success();

    session.loop_depth += 1;

    loop {
        let condition = match cmd.condition.execute(session, &params.in_condition()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                session.loop_depth -= 1;
                return Err(e);
            }
        };

        if !condition.is_normal_flow() {
            result = condition;
            break;
        }

        if condition.is_success() != run_while_success {
            break;
        }

        let body_outcome = match cmd.body.0.execute(session, params).await {
            Ok(outcome) => outcome,
            Err(e) => {
                session.loop_depth -= 1;
                return Err(e);
            }
        };

        let (outcome, keep_looping) = fold_loop_iteration(body_outcome);
        result = outcome;
        if !keep_looping {
            break;
        }
    }

    session.loop_depth -= 1;
    session.last_exit_status = result.exit_code;
    Ok(result)
}

#[async_trait::async_trait]
impl Execute for ast::ForCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let mut result = StatementOutcome::success();

        // Expand the value list (or fall back to the positional parameters).
        let mut values = vec![];
        if let Some(unexpanded) = &self.values {
            for value in unexpanded {
                let mut expanded =
                    expansion::full_expand_and_split_word(session, params, value).await?;
                values.append(&mut expanded);
            }
        } else {
            values.extend_from_slice(&session.positional_params);
        }

        session.loop_depth += 1;

        for value in values {
            if session.options.xtrace {
                let _ = session.trace_command(params, format!("for {}", self.variable));
            }

            let update_result = session.env.update_or_add(
                self.variable.as_str(),
                ValueLiteral::Scalar(value),
                |_| Ok(()),
                EnvironmentLookup::Anywhere,
                EnvironmentScope::Global,
            );
            if let Err(e) = update_result {
                session.loop_depth -= 1;
                return Err(e);
            }

            let body_outcome = match self.body.0.execute(session, params).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    session.loop_depth -= 1;
                    return Err(e);
                }
            };

            let (outcome, keep_looping) = fold_loop_iteration(body_outcome);
            result = outcome;
            if !keep_looping {
                break;
            }
        }

        session.loop_depth -= 1;
        session.last_exit_status = result.exit_code;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl Execute for ast::CStyleForCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let mut result = StatementOutcome::success();

        if let Some(init) = &self.init {
            init.eval(session, params).await?;
        }

        session.loop_depth += 1;

        loop {
            if let Some(condition) = &self.condition {
                let value = match condition.eval(session, params).await {
                    Ok(value) => value,
                    Err(e) => {
                        session.loop_depth -= 1;
                        return Err(e.into());
                    }
                };
                if value == 0 {
                    break;
                }
            }

            let body_outcome = match self.body.0.execute(session, params).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    session.loop_depth -= 1;
                    return Err(e);
                }
            };

            let (outcome, keep_looping) = fold_loop_iteration(body_outcome);
            result = outcome;
            if !keep_looping {
                break;
            }

            if let Some(update) = &self.update {
                if let Err(e) = update.eval(session, params).await {
                    session.loop_depth -= 1;
                    return Err(e.into());
                }
            }
        }

        session.loop_depth -= 1;
        session.last_exit_status = result.exit_code;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl Execute for ast::CaseCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let subject = expansion::basic_expand_word(session, params, &self.subject).await?;

        let mut outcome = StatementOutcome::success();
        let mut fall_through = false;

        for arm in &self.arms {
            if !fall_through {
                let mut matched = false;
                for pattern in &arm.patterns {
                    let expanded = expansion::basic_expand_pattern(session, params, pattern)
                        .await?
                        .set_extended_globbing(session.options.extglob);

                    if expanded.exactly_matches(subject.as_str())? {
                        matched = true;
                        break;
                    }
                }

                if !matched {
                    continue;
                }
            }
            fall_through = false;

            outcome = match &arm.body {
                Some(body) => body.execute(session, params).await?,
                None => StatementOutcome::success(),
            };

            if !outcome.is_normal_flow() {
                break;
            }

            match arm.terminator {
                ast::CaseArmTerminator::Break => break,
                ast::CaseArmTerminator::Fallthrough => fall_through = true,
                ast::CaseArmTerminator::ContinueMatching => (),
            }
        }

        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl Execute for ast::ArithmeticCommand {
    async fn execute(
        &self,
        session: &mut Session,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let outcome = match self.expr.eval(session, params).await {
            Ok(value) => {
                if value != 0 {
                    StatementOutcome::success()
                } else {
                    StatementOutcome::new(1)
                }
            }
            Err(e) => {
                let mut stderr = params.stderr();
                let _ = writeln!(stderr, "husk: {e}");
                StatementOutcome::new(1)
            }
        };

        session.last_exit_status = outcome.exit_code;
        Ok(outcome)
    }
}

//
// Simple-command execution.
//

async fn execute_simple_command(
    cmd: &ast::SimpleCommand,
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<CommandSpawnResult, Error> {
    let mut params = params.clone();
    // Redirection tracking is per-command (`exec` persists only its own).
    params.modified_fds.clear();

    if let Some(span) = &cmd.span {
        session.current_line = span.start.line;
    }

    let mut assignments: Vec<&ast::Assignment> = vec![];
    let mut args: Vec<CommandArg> = vec![];
    let mut is_declaration_cmd = false;

    let name_element = cmd.name.clone().map(ast::CommandElement::Word);

    for element in cmd.prefix.iter().chain(name_element.iter()).chain(cmd.suffix.iter()) {
        match element {
            ast::CommandElement::Redirect(redirect) => {
                if let Err(e) = setup_redirect(session, &mut params, redirect).await {
                    let mut stderr = params.stderr();
                    let _ = writeln!(stderr, "husk: {e}");
                    return Ok(CommandSpawnResult::ImmediateExit(1));
                }
            }
            ast::CommandElement::ProcessSubstitution(kind, subshell_cmd) => {
                let (fd, file) =
                    setup_process_substitution(session, &params, *kind, subshell_cmd)?;
                params.open_files.set(fd, file);
                args.push(CommandArg::String(format!("/dev/fd/{fd}")));
            }
            ast::CommandElement::Assignment(assignment, word) => {
                if args.is_empty() {
                    assignments.push(assignment);
                } else if is_declaration_cmd {
                    let expanded = expand_assignment(session, &params, assignment).await?;
                    args.push(CommandArg::Assignment(expanded));
                } else {
                    let expanded =
                        expansion::full_expand_and_split_word(session, &params, word).await?;
                    args.extend(expanded.into_iter().map(CommandArg::String));
                }
            }
            ast::CommandElement::Word(word) => {
                let mut expanded =
                    expansion::full_expand_and_split_word(session, &params, word).await?;

                if args.is_empty() {
                    if let Some(first) = expanded.first() {
                        // Alias substitution applies to the command word only.
                        if session.options.expand_aliases {
                            if let Some(replacement) = session.aliases.get(first.as_str()) {
                                let mut pieces: Vec<String> = replacement
                                    .split_ascii_whitespace()
                                    .map(|s| s.to_owned())
                                    .collect();
                                expanded.remove(0);
                                pieces.append(&mut expanded);
                                expanded = pieces;
                            }
                        }
                    }

                    if let Some(first) = expanded.first() {
                        is_declaration_cmd = session
                            .builtins
                            .get(first.as_str())
                            .is_some_and(|b| !b.disabled && b.declaration_builtin);
                    }
                }

                args.extend(expanded.into_iter().map(CommandArg::String));
            }
        }
    }

    if let Some(CommandArg::String(command_name)) = args.first().cloned() {
        execute_resolved_command(session, params, command_name, assignments, args).await
    } else {
        // Assignment-only statement: assignments land in the session itself.
        session.last_exit_status = 0;

        for assignment in assignments {
            apply_assignment(
                assignment,
                session,
                &params,
                session.options.allexport,
                EnvironmentScope::Global,
            )
            .await?;
        }

        Ok(CommandSpawnResult::ImmediateExit(session.last_exit_status))
    }
}

async fn execute_resolved_command(
    session: &mut Session,
    params: ExecutionParameters,
    command_name: String,
    assignments: Vec<&ast::Assignment>,
    args: Vec<CommandArg>,
) -> Result<CommandSpawnResult, Error> {
    // Prefix assignments live in a transient per-command scope, exported for
    // the duration.
    session.env.push_scope(EnvironmentScope::Command);
    for assignment in &assignments {
        let result =
            apply_assignment(assignment, session, &params, true, EnvironmentScope::Command).await;
        if let Err(e) = result {
            session.env.pop_scope(EnvironmentScope::Command)?;
            return Err(e);
        }
    }

    if session.options.xtrace {
        let traced = args.iter().map(|arg| arg.to_string()).join(" ");
        let _ = session.trace_command(&params, traced);
    }

    session
        .fire_debug_trap_if_applicable(
            &params,
            args.iter().map(|a| a.to_string()).join(" ").as_str(),
        )
        .await?;

    let result = commands::execute(session, &params, command_name, args, true).await;

    session.env.pop_scope(EnvironmentScope::Command)?;

    result
}

async fn expand_assignment(
    session: &mut Session,
    params: &ExecutionParameters,
    assignment: &ast::Assignment,
) -> Result<ast::Assignment, Error> {
    let target = match &assignment.target {
        ast::AssignmentTarget::Variable(name) => ast::AssignmentTarget::Variable(name.clone()),
        ast::AssignmentTarget::ArrayElement(name, index) => {
            let index = expansion::basic_expand_str(session, params, index.as_str()).await?;
            ast::AssignmentTarget::ArrayElement(name.clone(), index)
        }
    };

    let value = match &assignment.value {
        ast::AssignmentValue::Scalar(word) => {
            let expanded = expansion::basic_expand_word(session, params, word).await?;
            ast::AssignmentValue::Scalar(ast::Word { text: expanded })
        }
        ast::AssignmentValue::Array(elements) => {
            let mut expanded_elements = vec![];
            for (key, value) in elements {
                match key {
                    Some(key) => {
                        let key = expansion::basic_expand_word(session, params, key).await?;
                        let value = expansion::basic_expand_word(session, params, value).await?;
                        expanded_elements
                            .push((Some(ast::Word { text: key }), ast::Word { text: value }));
                    }
                    None => {
                        let fields =
                            expansion::full_expand_and_split_word(session, params, value).await?;
                        for field in fields {
                            expanded_elements.push((None, ast::Word { text: field }));
                        }
                    }
                }
            }
            ast::AssignmentValue::Array(expanded_elements)
        }
    };

    Ok(ast::Assignment {
        target,
        value,
        append: assignment.append,
    })
}

pub(crate) async fn apply_assignment(
    assignment: &ast::Assignment,
    session: &mut Session,
    params: &ExecutionParameters,
    export: bool,
    creation_scope: EnvironmentScope,
) -> Result<(), Error> {
    // Resolve the target (array indices may themselves need expansion or
    // arithmetic evaluation).
    let (variable_name, array_index) = match &assignment.target {
        ast::AssignmentTarget::Variable(name) => (name.clone(), None),
        ast::AssignmentTarget::ArrayElement(name, index) => {
            let is_assoc = session
                .env
                .get_resolving(name.as_str())?
                .is_some_and(|(_, var)| {
                    matches!(
                        var.value(),
                        VariableValue::Associative(_)
                            | VariableValue::Unset(crate::variables::UnsetKind::AssociativeArray)
                    )
                });

            let index = if is_assoc {
                expansion::basic_expand_str(session, params, index.as_str()).await?
            } else {
                crate::arithmetic::expand_and_eval(session, params, index.as_str())
                    .await?
                    .to_string()
            };

            (name.clone(), Some(index))
        }
    };

    if session.options.xtrace {
        let operator = if assignment.append { "+=" } else { "=" };
        let _ = session.trace_command(
            params,
            format!("{}{operator}{}", assignment.target, assignment.value),
        );
    }

    // Expand the value.
    let new_value = match &assignment.value {
        ast::AssignmentValue::Scalar(word) => {
            let value = expansion::basic_expand_word(session, params, word).await?;
            ValueLiteral::Scalar(value)
        }
        ast::AssignmentValue::Array(elements) => {
            let mut literal_elements = vec![];
            for (key, value) in elements {
                match key {
                    Some(key) => {
                        let key = expansion::basic_expand_word(session, params, key).await?;
                        let value = expansion::basic_expand_word(session, params, value).await?;
                        literal_elements.push((Some(key), value));
                    }
                    None => {
                        let fields =
                            expansion::full_expand_and_split_word(session, params, value).await?;
                        for field in fields {
                            literal_elements.push((None, field));
                        }
                    }
                }
            }
            ValueLiteral::Array(ArrayLiteral(literal_elements))
        }
    };

    // Command-scoped (prefix) assignments shadow outer variables rather than
    // updating them in place.
    let lookup = if matches!(creation_scope, EnvironmentScope::Command) {
        EnvironmentLookup::OnlyInCommand
    } else {
        EnvironmentLookup::Anywhere
    };

    if let Some(index) = array_index {
        let value = match new_value {
            ValueLiteral::Scalar(s) => s,
            ValueLiteral::Array(_) => {
                return Err(ErrorKind::AssigningListToArrayMember.into());
            }
        };

        session.env.update_or_add_array_element(
            variable_name.as_str(),
            index,
            value,
            assignment.append,
            lookup,
            creation_scope,
        )?;
        return Ok(());
    }

    session.env.update_or_add_appending(
        variable_name.as_str(),
        new_value,
        assignment.append,
        |var| {
            if export {
                var.export();
            }
            Ok(())
        },
        lookup,
        creation_scope,
    )
}

//
// Redirection setup.
//

/// Applies one redirection to the given execution parameters.
pub(crate) async fn setup_redirect(
    session: &mut Session,
    params: &mut ExecutionParameters,
    redirect: &ast::Redirect,
) -> Result<(), Error> {
    match redirect {
        ast::Redirect::OutputAndError(target, append) => {
            let path = expand_to_single_field(session, params, target).await?;
            let file = open_for_write(session, path.as_str(), *append, true)?;
            let stderr_copy = file.try_dup()?;

            params.open_files.set(1, file);
            params.open_files.set(2, stderr_copy);
            params.modified_fds.push(1);
            params.modified_fds.push(2);
        }

        ast::Redirect::File(fd, operator, target) => {
            let default_fd = default_fd_for_operator(*operator);
            let fd = fd.unwrap_or(default_fd);

            match target {
                ast::RedirectTarget::Filename(word) => {
                    let path = expand_to_single_field(session, params, word).await?;

                    let file = match operator {
                        ast::RedirectOperator::Read => OpenFile::File(
                            std::fs::File::open(resolve_path(session, path.as_str())).map_err(
                                |e| ErrorKind::RedirectionFailure(path.clone(), e),
                            )?,
                        ),
                        ast::RedirectOperator::Write => {
                            open_for_write(session, path.as_str(), false, false)?
                        }
                        ast::RedirectOperator::Clobber => {
                            open_for_write(session, path.as_str(), false, true)?
                        }
                        ast::RedirectOperator::Append => {
                            let file = std::fs::File::options()
                                .create(true)
                                .append(true)
                                .open(resolve_path(session, path.as_str()))
                                .map_err(|e| {
                                    ErrorKind::RedirectionFailure(path.clone(), e)
                                })?;
                            OpenFile::File(file)
                        }
                        ast::RedirectOperator::ReadWrite => {
                            let file = std::fs::File::options()
                                .create(true)
                                .read(true)
                                .write(true)
                                .open(resolve_path(session, path.as_str()))
                                .map_err(|e| {
                                    ErrorKind::RedirectionFailure(path.clone(), e)
                                })?;
                            OpenFile::File(file)
                        }
                        ast::RedirectOperator::DupInput | ast::RedirectOperator::DupOutput => {
                            // `<& file` / `>& file` with a non-numeric word:
                            // bash treats the word as a filename.
                            open_for_write(session, path.as_str(), false, false)?
                        }
                    };

                    params.open_files.set(fd, file);
                    params.modified_fds.push(fd);
                }

                ast::RedirectTarget::Duplicate(word) => {
                    let mut expanded = expand_to_single_field(session, params, word).await?;

                    // A trailing `-` moves rather than copies.
                    let move_fd = expanded.ends_with('-') && expanded.len() > 1;
                    if move_fd {
                        expanded.pop();
                    }

                    if expanded == "-" {
                        params.open_files.remove(fd);
                        params.modified_fds.push(fd);
                    } else if expanded.chars().all(|c| c.is_ascii_digit()) {
                        let source_fd = expanded
                            .parse::<u32>()
                            .map_err(|_| Error::from(ErrorKind::InvalidRedirection))?;

                        // FDs installed in the session mid-run (coprocs,
                        // earlier `exec`) aren't in this command's snapshot;
                        // fall back to the session table.
                        let file = params
                            .open_files
                            .dup_fd(source_fd)
                            .or_else(|_| session.open_files.dup_fd(source_fd))?;
                        params.open_files.set(fd, file);
                        params.modified_fds.push(fd);

                        if move_fd {
                            params.open_files.remove(source_fd);
                            params.modified_fds.push(source_fd);
                        }
                    } else if matches!(operator, ast::RedirectOperator::DupOutput)
                        && fd == default_fd
                    {
                        // `>&file`: both stdout and stderr to the file.
                        let file = open_for_write(session, expanded.as_str(), false, false)?;
                        let stderr_copy = file.try_dup()?;
                        params.open_files.set(1, file);
                        params.open_files.set(2, stderr_copy);
                        params.modified_fds.push(1);
                        params.modified_fds.push(2);
                    } else {
                        return Err(ErrorKind::InvalidRedirection.into());
                    }
                }

                ast::RedirectTarget::ProcessSubstitution(kind, subshell_cmd) => {
                    let (_, file) =
                        setup_process_substitution(session, params, *kind, subshell_cmd)?;
                    params.open_files.set(fd, file);
                    params.modified_fds.push(fd);
                }
            }
        }

        ast::Redirect::HereDocument(fd, doc) => {
            let fd = fd.unwrap_or(0);

            let contents = if doc.expand {
                expansion::basic_expand_word(session, params, &doc.body).await?
            } else {
                doc.body.text.clone()
            };

            params
                .open_files
                .set(fd, file_with_contents(contents.as_str())?);
            params.modified_fds.push(fd);
        }

        ast::Redirect::HereString(fd, word) => {
            let fd = fd.unwrap_or(0);

            let mut contents = expansion::basic_expand_word(session, params, word).await?;
            contents.push('\n');

            params
                .open_files
                .set(fd, file_with_contents(contents.as_str())?);
            params.modified_fds.push(fd);
        }
    }

    Ok(())
}

async fn expand_to_single_field(
    session: &mut Session,
    params: &ExecutionParameters,
    word: &ast::Word,
) -> Result<String, Error> {
    let mut fields = expansion::full_expand_and_split_word(session, params, word).await?;
    if fields.len() != 1 {
        return Err(ErrorKind::InvalidRedirection.into());
    }
    Ok(fields.remove(0))
}

fn resolve_path(session: &Session, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        session.working_dir.join(path)
    }
}

fn open_for_write(
    session: &Session,
    path: &str,
    append: bool,
    force_clobber: bool,
) -> Result<OpenFile, Error> {
    let resolved = resolve_path(session, path);

    if session.options.noclobber && !force_clobber && !append && resolved.is_file() {
        return Err(ErrorKind::WouldClobber(path.to_owned()).into());
    }

    let file = std::fs::File::options()
        .create(true)
        .write(true)
        .truncate(!append)
        .append(append)
        .open(resolved.as_path())
        .map_err(|e| ErrorKind::RedirectionFailure(path.to_owned(), e))?;

    Ok(OpenFile::File(file))
}

/// Materialises a string as the readable end of a filled pipe.
fn file_with_contents(contents: &str) -> Result<OpenFile, Error> {
    let (reader, mut writer) = crate::openfiles::pipe()?;

    let bytes = contents.as_bytes().to_vec();
    // Fill from a blocking task: the contents may exceed the pipe buffer.
    tokio::task::spawn_blocking(move || {
        let _ = writer.write_all(bytes.as_slice());
    });

    Ok(OpenFile::PipeReader(reader))
}

/// Sets up a process substitution, returning the FD chosen and the file to
/// install there.
pub(crate) fn setup_process_substitution(
    session: &mut Session,
    params: &ExecutionParameters,
    kind: ast::ProcessSubstitutionKind,
    subshell_cmd: &ast::SubshellCommand,
) -> Result<(u32, OpenFile), Error> {
    let mut subshell = session.clone_as_subshell();
    // Substitution children can outlive the command; detach them from any
    // capture pipes before wiring their own.
    let mut child_params = session.detach_capture_params(params);

    let (reader, writer) = crate::openfiles::pipe()?;

    let target_file = match kind {
        ast::ProcessSubstitutionKind::Read => {
            child_params.open_files.set(1, writer.into());
            OpenFile::PipeReader(reader)
        }
        ast::ProcessSubstitutionKind::Write => {
            child_params.open_files.set(0, reader.into());
            OpenFile::PipeWriter(writer)
        }
    };

    let body = subshell_cmd.0.clone();
    tokio::spawn(async move {
        let _ = body.execute(&mut subshell, &child_params).await;
    });

    // Work downward from 63 looking for a free fd, as the classic shells do.
    let mut candidate = 63;
    while params.open_files.contains(candidate) {
        candidate -= 1;
        if candidate <= 2 {
            return Err(ErrorKind::InvalidRedirection.into());
        }
    }

    Ok((candidate, target_file))
}

const fn default_fd_for_operator(operator: ast::RedirectOperator) -> u32 {
    match operator {
        ast::RedirectOperator::Read
        | ast::RedirectOperator::ReadWrite
        | ast::RedirectOperator::DupInput => 0,
        ast::RedirectOperator::Write
        | ast::RedirectOperator::Append
        | ast::RedirectOperator::Clobber
        | ast::RedirectOperator::DupOutput => 1,
    }
}

/// Fires the EXIT trap once, if one is registered.
pub(crate) async fn fire_exit_trap(
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<(), Error> {
    if session.traps.handler_depth > 0 {
        return Ok(());
    }

    let Some(handler) = session
        .traps
        .get_handler(TrapCondition::Exit)
        .map(|s| s.to_owned())
    else {
        return Ok(());
    };

    if handler.is_empty() {
        return Ok(());
    }

    session.traps.handler_depth += 1;
    let result = session.run_string(handler.as_str(), params).await;
    session.traps.handler_depth -= 1;

    result.map(|_| ())
}
