use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{JobUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Waits for jobs to complete.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct WaitCommand {
    /// Jobs (`%N`) or process ids to wait for; all jobs when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    targets: Vec<String>,
}

impl BuiltinCommand for WaitCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.targets.is_empty() {
            let last_status = context.session.jobs.wait_all().await?;
            return Ok(BuiltinResult::exit(last_status.into()));
        }

        let mut delta = StateDelta::new();
        let mut last_status = 0;

        for target in &self.targets {
            let job = if target.starts_with('%') {
                context.session.jobs.resolve_job_spec(target.as_str())
            } else {
                match target.parse::<i32>() {
                    Ok(pid) => context
                        .session
                        .jobs
                        .jobs
                        .iter_mut()
                        .find(|j| j.representative_pid() == Some(pid)),
                    Err(_) => None,
                }
            };

            let Some(job) = job else {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: wait: {target}: no such job")?;
                last_status = 127;
                continue;
            };

            let outcome = job.wait().await?;
            last_status = outcome.exit_code;
            delta.jobs.push(JobUpdate::Remove(job.id));
        }

        Ok(BuiltinResult {
            exit: BuiltinExitCode::from(last_status),
            delta,
        })
    }
}
