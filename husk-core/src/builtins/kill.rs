use std::io::Write;

use clap::Parser;
use itertools::Itertools;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;
use crate::sys;
use crate::traps::TrapCondition;

/// Sends a signal to a process or job.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct KillCommand {
    /// List signal names.
    #[arg(short = 'l')]
    list: bool,

    /// The signal to send, by name or number.
    #[arg(short = 's', value_name = "SIG")]
    signal: Option<String>,

    /// Targets: pids or `%N` job specs (or `-SIGNAL` as the first entry).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    targets: Vec<String>,
}

impl BuiltinCommand for KillCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.list {
            let mut stdout = context.stdout();
            let listed = TrapCondition::iterator()
                .filter_map(|condition| {
                    condition.signal_number().map(|number| (number, condition))
                })
                .filter(|(number, _)| *number > 0)
                .sorted_by_key(|(number, _)| *number)
                .map(|(number, condition)| format!("{number}) SIG{condition}"))
                .join("\n");
            writeln!(stdout, "{listed}")?;
            return Ok(BuiltinResult::success());
        }

        let mut targets = self.targets.as_slice();

        // Accept `-TERM` / `-9` as a leading pseudo-option.
        let mut condition: TrapCondition = TrapCondition::Signal(crate::traps::Signal::SIGTERM);
        if let Some(signal) = &self.signal {
            condition = signal.as_str().parse()?;
        } else if let Some(first) = targets.first() {
            if let Some(stripped) = first.strip_prefix('-') {
                if let Ok(parsed) = stripped.parse::<TrapCondition>() {
                    condition = parsed;
                    targets = &targets[1..];
                }
            }
        }

        if targets.is_empty() {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: kill: usage: kill [-s sigspec] pid | %job ...")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
        }

        let mut all_ok = true;
        for target in targets {
            let result = if target.starts_with('%') {
                match context.session.jobs.resolve_job_spec(target.as_str()) {
                    Some(job) => job.kill(condition),
                    None => Err(crate::error::ErrorKind::NoSuchJob(target.clone()).into()),
                }
            } else {
                match target.parse::<i32>() {
                    Ok(pid) => sys::kill_process(pid, condition),
                    Err(_) => {
                        Err(crate::error::ErrorKind::InvalidSignal(target.clone()).into())
                    }
                }
            };

            if let Err(e) = result {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: kill: {target}: {e}")?;
                all_ok = false;
            }
        }

        Ok(BuiltinResult::exit(if all_ok {
            BuiltinExitCode::Success
        } else {
            BuiltinExitCode::Custom(1)
        }))
    }
}
