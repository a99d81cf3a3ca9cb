use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;

/// Lists tracked jobs.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct JobsCommand {
    /// Also print process ids.
    #[arg(short = 'l')]
    with_pids: bool,

    /// Print process ids only.
    #[arg(short = 'p')]
    pids_only: bool,

    /// Restrict to running jobs.
    #[arg(short = 'r')]
    running_only: bool,
}

impl BuiltinCommand for JobsCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        // Reap finished jobs first so the listing is accurate.
        let completed = context.session.jobs.reap_completed();
        let mut stdout = context.stdout();

        for job in completed {
            if !self.running_only {
                if self.pids_only {
                    if let Some(pid) = job.representative_pid() {
                        writeln!(stdout, "{pid}")?;
                    }
                } else {
                    writeln!(stdout, "{job}")?;
                }
            }
        }

        for job in &context.session.jobs.jobs {
            if self.pids_only {
                if let Some(pid) = job.representative_pid() {
                    writeln!(stdout, "{pid}")?;
                }
                continue;
            }

            if self.with_pids {
                let pid = job
                    .representative_pid()
                    .map_or_else(String::new, |pid| pid.to_string());
                writeln!(stdout, "[{}] {pid} {}\t{}", job.id, job.state, job.command_line)?;
            } else {
                writeln!(stdout, "{job}")?;
            }
        }

        Ok(BuiltinResult::success())
    }
}
