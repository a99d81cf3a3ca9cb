use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{JobUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Detaches jobs from the session, handing their children to the orphan
/// supervisor.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct DisownCommand {
    /// Disown every job.
    #[arg(short = 'a')]
    all: bool,

    /// Disown only running jobs.
    #[arg(short = 'r')]
    running: bool,

    /// Jobs to disown; the current job when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    job_specs: Vec<String>,
}

impl BuiltinCommand for DisownCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();

        if self.all || self.running {
            for job in &context.session.jobs.jobs {
                if self.running && !matches!(job.state, crate::jobs::JobState::Running) {
                    continue;
                }
                delta.jobs.push(JobUpdate::Disown(job.id));
            }
            return Ok(BuiltinResult::with_delta(delta));
        }

        if self.job_specs.is_empty() {
            let Some(job) = context.session.jobs.current_job() else {
                let mut stderr = context.stderr();
                writeln!(stderr, "husk: disown: current: no such job")?;
                return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
            };
            delta.jobs.push(JobUpdate::Disown(job.id));
            return Ok(BuiltinResult::with_delta(delta));
        }

        let mut all_found = true;
        for spec in &self.job_specs {
            match context.session.jobs.resolve_job_spec(spec.as_str()) {
                Some(job) => {
                    let id = job.id;
                    delta.jobs.push(JobUpdate::Disown(id));
                }
                None => {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: disown: {spec}: no such job")?;
                    all_found = false;
                }
            }
        }

        Ok(BuiltinResult {
            exit: if all_found {
                BuiltinExitCode::Success
            } else {
                BuiltinExitCode::Custom(1)
            },
            delta,
        })
    }
}
