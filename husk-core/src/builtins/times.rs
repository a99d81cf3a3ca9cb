use std::io::Write;
use std::time::Duration;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::sys;

/// Reports accumulated user and system times for the session and its
/// children.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct TimesCommand {}

impl BuiltinCommand for TimesCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let (self_user, self_system, children_user, children_system) = sys::get_process_times()?;

        let mut stdout = context.stdout();
        writeln!(
            stdout,
            "{} {}",
            format_duration(self_user),
            format_duration(self_system)
        )?;
        writeln!(
            stdout,
            "{} {}",
            format_duration(children_user),
            format_duration(children_system)
        )?;

        Ok(BuiltinResult::success())
    }
}

fn format_duration(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let seconds = duration.as_secs() % 60;
    let millis = duration.subsec_millis();
    format!("{minutes}m{seconds}.{millis:03}s")
}
