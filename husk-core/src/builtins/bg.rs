use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Resumes a job in the background. Jobs launched by this session are never
/// stopped (there is no terminal job control), so this only reports state.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct BgCommand {
    /// The job to resume; the current job when omitted.
    job_spec: Option<String>,
}

impl BuiltinCommand for BgCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let job = match &self.job_spec {
            Some(spec) => context.session.jobs.resolve_job_spec(spec.as_str()),
            None => context.session.jobs.current_job_mut(),
        };

        let Some(job) = job else {
            let spec = self.job_spec.as_deref().unwrap_or("current");
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: bg: {spec}: no such job")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        let id = job.id;
        let command_line = job.command_line.clone();
        let mut stdout = context.stdout();
        writeln!(stdout, "[{id}] {command_line} &")?;

        Ok(BuiltinResult::success())
    }
}
