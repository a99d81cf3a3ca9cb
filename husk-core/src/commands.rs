//! Command resolution and launch: special built-ins, functions, regular
//! built-ins, then `$PATH` search for external programs.

use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;

use command_fds::{CommandFdExt, FdMapping};
use husk_parser::ast;
use itertools::Itertools;

use crate::builtins::{self, BuiltinContext};
use crate::error::{Error, ErrorKind};
use crate::interp::{self, Execute, ExecutionParameters};
use crate::jobs::JobJoinHandle;
use crate::openfiles::OpenFile;
use crate::pathsearch;
use crate::processes::ChildProcess;
use crate::results::{StatementOutcome, Unwind};
use crate::session::Session;

/// An argument to a command.
#[derive(Clone, Debug)]
pub enum CommandArg {
    /// An ordinary string argument.
    String(String),
    /// A parsed assignment, passed through to declaration built-ins.
    Assignment(ast::Assignment),
}

impl std::fmt::Display for CommandArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Assignment(a) => write!(f, "{a}"),
        }
    }
}

impl From<String> for CommandArg {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// The result of launching one command (or pipeline stage).
pub(crate) enum CommandSpawnResult {
    /// An external process was spawned.
    SpawnedProcess(ChildProcess),
    /// An in-process task (subshell stage) was spawned.
    InternalTask(JobJoinHandle),
    /// The command finished immediately with the given code.
    ImmediateExit(u8),
    /// The command finished immediately, carrying an unwind signal.
    Unwound(StatementOutcome),
}

impl CommandSpawnResult {
    /// Waits for the command to finish.
    pub async fn wait(self) -> Result<StatementOutcome, Error> {
        match self {
            Self::SpawnedProcess(mut child) => Ok(child.wait().await?.into()),
            Self::InternalTask(handle) => handle.await?,
            Self::ImmediateExit(code) => Ok(StatementOutcome::new(code)),
            Self::Unwound(outcome) => Ok(outcome),
        }
    }
}

/// Executes a resolved simple command: special built-ins first, then
/// functions, regular built-ins, and finally external programs.
pub(crate) async fn execute(
    session: &mut Session,
    params: &ExecutionParameters,
    command_name: String,
    args: Vec<CommandArg>,
    use_functions: bool,
) -> Result<CommandSpawnResult, Error> {
    if !command_name.contains('/') {
        let builtin = session.builtins.get(command_name.as_str()).cloned();

        if builtin
            .as_ref()
            .is_some_and(|b| !b.disabled && b.special_builtin)
        {
            #[allow(clippy::unwrap_used)]
            return execute_builtin(session, params, command_name, builtin.unwrap(), args).await;
        }

        if use_functions {
            if let Some(registration) = session.funcs.get(command_name.as_str()) {
                let definition = registration.definition.clone();
                return invoke_function(session, params, command_name, definition, &args[1..])
                    .await;
            }
        }

        if let Some(builtin) = builtin {
            if !builtin.disabled {
                return execute_builtin(session, params, command_name, builtin, args).await;
            }
        }
    }

    execute_external(session, params, command_name.as_str(), &args[1..]).await
}

async fn execute_builtin(
    session: &mut Session,
    params: &ExecutionParameters,
    command_name: String,
    registration: builtins::BuiltinRegistration,
    args: Vec<CommandArg>,
) -> Result<CommandSpawnResult, Error> {
    let context = BuiltinContext {
        session: &mut *session,
        command_name,
        params: params.clone(),
    };

    let result = (registration.execute_fn)(context, args).await;

    let (exit, delta) = match result {
        Ok(result) => (result.exit, result.delta),
        Err(e) => {
            let mut stderr = params.stderr();
            let _ = writeln!(stderr, "husk: {e}");
            return Ok(CommandSpawnResult::ImmediateExit(e.exit_code()));
        }
    };

    // Merge the built-in's state changes; per-name rejections surface as
    // diagnostics and a failure status.
    let rejections = session.apply_delta(delta)?;
    if !rejections.is_empty() {
        let mut stderr = params.stderr();
        for rejection in &rejections {
            let _ = writeln!(stderr, "husk: {rejection}");
        }
        return Ok(CommandSpawnResult::ImmediateExit(1));
    }

    let outcome: StatementOutcome = exit.into();
    if outcome.is_normal_flow() {
        Ok(CommandSpawnResult::ImmediateExit(outcome.exit_code))
    } else {
        Ok(CommandSpawnResult::Unwound(outcome))
    }
}

pub(crate) async fn invoke_function(
    session: &mut Session,
    params: &ExecutionParameters,
    name: String,
    definition: Arc<ast::FunctionDefinition>,
    args: &[CommandArg],
) -> Result<CommandSpawnResult, Error> {
    let mut params = params.clone();

    // Definition-time redirections apply on every invocation.
    let ast::FunctionBody(body, redirects) = &definition.body;
    if let Some(redirects) = redirects {
        for redirect in &redirects.0 {
            interp::setup_redirect(session, &mut params, redirect).await?;
        }
    }

    let positional: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    session.enter_function(name.as_str(), &definition, positional)?;

    let result = body.execute(session, &params).await;

    session.leave_function(&params).await?;

    let outcome = result?;

    // `return` stops at the function boundary; other unwinds keep going.
    match outcome.unwind {
        Unwind::Return => Ok(CommandSpawnResult::ImmediateExit(outcome.exit_code)),
        Unwind::None => Ok(CommandSpawnResult::ImmediateExit(outcome.exit_code)),
        _ => Ok(CommandSpawnResult::Unwound(outcome)),
    }
}

async fn execute_external(
    session: &mut Session,
    params: &ExecutionParameters,
    command_name: &str,
    args: &[CommandArg],
) -> Result<CommandSpawnResult, Error> {
    let resolved = match resolve_external_path(session, command_name) {
        Some(path) => path,
        None => {
            let mut stderr = params.stderr();
            let _ = writeln!(stderr, "husk: {command_name}: command not found");
            return Ok(CommandSpawnResult::ImmediateExit(127));
        }
    };

    let arg_strings: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let cmd = compose_std_command(
        session,
        params,
        resolved.as_str(),
        command_name,
        arg_strings.as_slice(),
    )?;

    spawn_command(session, params, cmd, command_name)
}

pub(crate) fn spawn_command(
    _session: &mut Session,
    params: &ExecutionParameters,
    cmd: std::process::Command,
    command_name: &str,
) -> Result<CommandSpawnResult, Error> {
    tracing::debug!(
        target: "commands",
        "spawning: {} {}",
        cmd.get_program().to_string_lossy(),
        cmd.get_args().map(|a| a.to_string_lossy()).join(" ")
    );

    let mut tokio_cmd = tokio::process::Command::from(cmd);

    match tokio_cmd.spawn() {
        Ok(child) => {
            #[allow(clippy::cast_possible_wrap)]
            let pid = child.id().map(|id| id as i32);
            Ok(CommandSpawnResult::SpawnedProcess(ChildProcess::new(
                pid, child,
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut stderr = params.stderr();
            let _ = writeln!(stderr, "husk: {command_name}: command not found");
            Ok(CommandSpawnResult::ImmediateExit(127))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            let mut stderr = params.stderr();
            let _ = writeln!(stderr, "husk: {command_name}: permission denied");
            Ok(CommandSpawnResult::ImmediateExit(126))
        }
        Err(e) => {
            let mut stderr = params.stderr();
            let _ = writeln!(stderr, "husk: {command_name}: {e}");
            Ok(CommandSpawnResult::ImmediateExit(126))
        }
    }
}

/// Resolves an external command to a concrete path, consulting (and feeding)
/// the location cache when `hashall` is on.
fn resolve_external_path(session: &mut Session, command_name: &str) -> Option<String> {
    if command_name.contains('/') {
        return Some(command_name.to_owned());
    }

    if session.options.hashall {
        if let Some(cached) = session.program_location_cache.get(command_name) {
            return Some(cached.to_string_lossy().to_string());
        }
    }

    let path_value = session
        .env
        .get_str("PATH")
        .map(|p| p.to_string())
        .unwrap_or_default();

    let found = pathsearch::search(path_value.as_str(), command_name)?;

    if session.options.hashall {
        session
            .program_location_cache
            .set(command_name, found.clone());
    }

    Some(found.to_string_lossy().to_string())
}

/// Builds the `std::process::Command` for an external launch: argv, exported
/// environment, working directory, and the context's FD table.
pub(crate) fn compose_std_command<S: AsRef<std::ffi::OsStr>>(
    session: &Session,
    params: &ExecutionParameters,
    program: &str,
    argv0: &str,
    args: &[S],
) -> Result<std::process::Command, Error> {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new(program);
    cmd.arg0(argv0);

    for arg in args {
        cmd.arg(arg);
    }

    cmd.current_dir(session.working_dir.as_path());

    // Only exported variables are forwarded.
    cmd.env_clear();
    for (name, var) in session.env.iter_exported() {
        let value = var.resolve_value(session);
        cmd.env(name, value.as_str().as_ref());
    }

    let mut open_files = params.open_files.try_clone()?;

    match open_files.remove(0) {
        Some(OpenFile::Stdin(_)) | None => (),
        Some(file) => {
            cmd.stdin(Stdio::from(file));
        }
    }
    match open_files.remove(1) {
        Some(OpenFile::Stdout(_)) | None => (),
        Some(file) => {
            cmd.stdout(Stdio::from(file));
        }
    }
    match open_files.remove(2) {
        Some(OpenFile::Stderr(_)) | None => (),
        Some(file) => {
            cmd.stderr(Stdio::from(file));
        }
    }

    // Any remaining FDs map into the child as-is.
    let fd_mappings = open_files
        .into_iter()
        .map(|(fd, file)| {
            Ok(FdMapping {
                child_fd: i32::try_from(fd)?,
                parent_fd: file.into_owned_fd()?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    cmd.fd_mappings(fd_mappings)
        .map_err(|_e| ErrorKind::ChildCreationFailure)?;

    Ok(cmd)
}

/// Runs the given script source in a subshell, capturing its standard output.
pub(crate) async fn run_in_subshell_and_capture_output(
    session: &mut Session,
    params: &ExecutionParameters,
    script: &str,
) -> Result<String, Error> {
    let mut subshell = session.clone_as_subshell();
    let mut child_params = params.clone();

    let (reader, writer) = crate::openfiles::pipe()?;
    child_params.open_files.set(1, writer.into());

    // Drain concurrently so large outputs can't fill the pipe and wedge the
    // producer.
    let reader_task = tokio::task::spawn_blocking(move || {
        let mut reader = reader;
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut buf).map(|_| buf)
    });

    let program = husk_parser::parse_program(script, &subshell.parser_options())
        .map_err(|e| ErrorKind::SyntaxError(e, script.to_owned()))?;

    let result = program.execute(&mut subshell, &child_params).await;
    drop(child_params);

    let captured = reader_task.await??;

    // The substitution's status becomes the session's `$?`.
    session.last_exit_status = subshell.last_exit_status;

    result?;

    Ok(String::from_utf8_lossy(captured.as_slice()).into_owned())
}
