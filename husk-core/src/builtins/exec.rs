use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::commands::{self, CommandSpawnResult};
use crate::delta::{FdUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Replaces the execution context with a command; with only redirections,
/// makes them permanent in the session.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct ExecCommand {
    /// Launch with an empty environment.
    #[arg(short = 'c')]
    clear_env: bool,

    /// Launch as a login shell (prefix argv[0] with `-`).
    #[arg(short = 'l')]
    login: bool,

    /// Launch with this argv[0].
    #[arg(short = 'a', value_name = "NAME")]
    argv0: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl BuiltinCommand for ExecCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.args.is_empty() {
            // No command: persist this invocation's redirections into the
            // session's FD table.
            let mut delta = StateDelta::new();
            for fd in context.params.modified_fds.clone() {
                match context.params.open_files.get(fd) {
                    Some(file) => delta.fds.push(FdUpdate::Set(fd, file.try_dup()?)),
                    None => delta.fds.push(FdUpdate::Close(fd)),
                }
            }
            return Ok(BuiltinResult::with_delta(delta));
        }

        let command_name = self.args[0].clone();
        let mut argv0 = self.argv0.clone().unwrap_or_else(|| command_name.clone());
        if self.login {
            argv0.insert(0, '-');
        }

        let mut cmd = commands::compose_std_command(
            context.session,
            &context.params,
            command_name.as_str(),
            argv0.as_str(),
            &self.args[1..],
        )?;

        if self.clear_env {
            cmd.env_clear();
        }

        let spawn_result =
            commands::spawn_command(context.session, &context.params, cmd, command_name.as_str())?;

        match spawn_result {
            CommandSpawnResult::SpawnedProcess(mut child) => {
                // The replacement runs to completion; nothing after it in the
                // session's current run executes.
                let outcome: crate::results::StatementOutcome = child.wait().await?.into();
                Ok(BuiltinResult::exit(BuiltinExitCode::ExecReplaced(
                    outcome.exit_code,
                )))
            }
            CommandSpawnResult::ImmediateExit(code) => {
                // Spawn failure: a non-interactive shell exits.
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: exec: {command_name}: cannot execute")?;
                Ok(BuiltinResult::exit(BuiltinExitCode::ExitSession(code)))
            }
            CommandSpawnResult::InternalTask(_) | CommandSpawnResult::Unwound(_) => {
                Ok(BuiltinResult::exit(BuiltinExitCode::ExitSession(1)))
            }
        }
    }
}
