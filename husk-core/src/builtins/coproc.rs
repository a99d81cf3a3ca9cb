use std::io::Write;
use std::process::Stdio;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{FdUpdate, StateDelta, VarUpdate};
use crate::error::Error;
use crate::jobs::{Job, JobTask};
use crate::processes::ChildProcess;
use crate::results::BuiltinExitCode;
use crate::session::CoprocRegistration;
use crate::variables::{ArrayLiteral, ValueLiteral};

/// Runs a command as a coprocess: a child wired to the session through a
/// read pipe and a write pipe, exposed as `NAME[0]`/`NAME[1]` and
/// `NAME_PID`.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct CoprocCommand {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    args: Vec<String>,
}

impl BuiltinCommand for CoprocCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        // An identifier-looking first word followed by a command names the
        // coprocess.
        let (name, command_args) = if self.args.len() > 1
            && crate::env::valid_variable_name(self.args[0].as_str())
        {
            (self.args[0].clone(), &self.args[1..])
        } else {
            (String::from("COPROC"), &self.args[..])
        };

        let Some((program, program_args)) = command_args.split_first() else {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: coproc: command required")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
        };

        // Child stdin comes from one pipe; its stdout feeds the other.
        let (child_stdin_reader, to_child_writer) = crate::openfiles::pipe()?;
        let (from_child_reader, child_stdout_writer) = crate::openfiles::pipe()?;

        // The coprocess outlives the current run; its stderr must not hold
        // the run's capture pipe open.
        let detached_params = context.session.detach_capture_params(&context.params);

        let mut cmd = crate::commands::compose_std_command(
            context.session,
            &detached_params,
            program.as_str(),
            program.as_str(),
            program_args,
        )?;
        cmd.stdin(Stdio::from(child_stdin_reader));
        cmd.stdout(Stdio::from(child_stdout_writer));

        let mut tokio_cmd = tokio::process::Command::from(cmd);
        let child = match tokio_cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: coproc: {program}: {e}")?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(127)));
            }
        };

        #[allow(clippy::cast_possible_wrap)]
        let pid = child.id().map_or(0, |id| id as i32);

        // Pick high descriptors, as interactive shells do.
        let read_fd = first_free_fd(context, 63);
        let write_fd = first_free_fd_below(context, read_fd);

        let mut delta = StateDelta::new();
        delta
            .fds
            .push(FdUpdate::Set(read_fd, from_child_reader.into()));
        delta
            .fds
            .push(FdUpdate::Set(write_fd, to_child_writer.into()));

        delta.vars.push(VarUpdate::Set {
            name: name.clone(),
            value: Some(ValueLiteral::Array(ArrayLiteral(vec![
                (Some("0".into()), read_fd.to_string()),
                (Some("1".into()), write_fd.to_string()),
            ]))),
            append: false,
            scope: crate::delta::VarScope::Global,
            add_attrs: vec![],
            remove_attrs: vec![],
            make_indexed: true,
            make_associative: false,
        });
        delta
            .vars
            .push(VarUpdate::scalar(format!("{name}_PID"), pid.to_string()));

        // The coprocess is tracked as a job, and its FDs are remembered so a
        // later `exec N>&-` can signal EOF.
        context.session.coprocs.push(CoprocRegistration {
            pid,
            read_fd,
            write_fd,
        });

        let command_line = format!("coproc {name} {}", command_args.join(" "));
        context.session.jobs.add_as_current(Job::new(
            [JobTask::External(ChildProcess::new(Some(pid), child))],
            command_line,
        ));
        context.session.last_bg_pid = Some(pid);

        Ok(BuiltinResult::with_delta(delta))
    }
}

fn first_free_fd(context: &BuiltinContext<'_>, start: u32) -> u32 {
    let mut fd = start;
    while context.session.open_files.contains(fd) && fd > 3 {
        fd -= 1;
    }
    fd
}

fn first_free_fd_below(context: &BuiltinContext<'_>, below: u32) -> u32 {
    let mut fd = below.saturating_sub(1);
    while context.session.open_files.contains(fd) && fd > 3 {
        fd -= 1;
    }
    fd
}
