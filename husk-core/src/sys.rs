//! Thin wrappers around platform signal and process facilities.

use uzers::os::unix::UserExt;

use crate::error::{Error, ErrorKind};
use crate::traps::TrapCondition;

/// A process identifier.
pub type ProcessId = i32;

/// Sends a signal to the given process.
pub fn kill_process(pid: ProcessId, condition: TrapCondition) -> Result<(), Error> {
    let TrapCondition::Signal(signal) = condition else {
        return Err(ErrorKind::InvalidSignal(condition.to_string()).into());
    };

    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal)
        .map_err(|_errno| ErrorKind::FailedToSendSignal)?;

    Ok(())
}

/// Returns a listener stream for the given OS signal.
pub fn signal_listener(
    signal: nix::sys::signal::Signal,
) -> Result<tokio::signal::unix::Signal, Error> {
    let listener = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::from_raw(
        signal as i32,
    ))?;
    Ok(listener)
}

/// Returns the current user's home directory, if known.
pub fn current_user_home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

/// Returns the home directory of the named user.
pub fn user_home_dir(username: &str) -> Option<std::path::PathBuf> {
    uzers::get_user_by_name(username).map(|user| user.home_dir().to_path_buf())
}

/// Returns the process's resource usage for itself and its children:
/// `(self_user, self_system, children_user, children_system)`.
pub fn get_process_times() -> Result<
    (
        std::time::Duration,
        std::time::Duration,
        std::time::Duration,
        std::time::Duration,
    ),
    Error,
> {
    use nix::sys::resource::{UsageWho, getrusage};

    let self_usage = getrusage(UsageWho::RUSAGE_SELF)?;
    let children_usage = getrusage(UsageWho::RUSAGE_CHILDREN)?;

    Ok((
        timeval_to_duration(self_usage.user_time()),
        timeval_to_duration(self_usage.system_time()),
        timeval_to_duration(children_usage.user_time()),
        timeval_to_duration(children_usage.system_time()),
    ))
}

fn timeval_to_duration(tv: nix::sys::time::TimeVal) -> std::time::Duration {
    #[allow(clippy::cast_sign_loss)]
    std::time::Duration::new(tv.tv_sec().max(0) as u64, (tv.tv_usec().max(0) as u32) * 1000)
}

/// Gets the process's umask without changing it.
pub fn get_umask() -> nix::sys::stat::Mode {
    // The only portable read is a write-and-restore.
    let current = nix::sys::stat::umask(nix::sys::stat::Mode::empty());
    nix::sys::stat::umask(current);
    current
}

/// Sets the process's umask.
pub fn set_umask(mode: nix::sys::stat::Mode) {
    nix::sys::stat::umask(mode);
}
