use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{JobUpdate, StateDelta};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Brings a job to the foreground. Without terminal job control this waits
/// for the job to complete.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct FgCommand {
    /// The job to foreground; the current job when omitted.
    job_spec: Option<String>,
}

impl BuiltinCommand for FgCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let job = match &self.job_spec {
            Some(spec) => context.session.jobs.resolve_job_spec(spec.as_str()),
            None => context.session.jobs.current_job_mut(),
        };

        let Some(job) = job else {
            let spec = self.job_spec.as_deref().unwrap_or("current");
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: fg: {spec}: no such job")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        let id = job.id;
        let command_line = job.command_line.clone();
        let outcome = job.wait().await?;

        let mut stdout = context.stdout();
        writeln!(stdout, "{command_line}")?;

        let mut delta = StateDelta::new();
        delta.jobs.push(JobUpdate::Remove(id));

        Ok(BuiltinResult {
            exit: outcome.exit_code.into(),
            delta,
        })
    }
}
