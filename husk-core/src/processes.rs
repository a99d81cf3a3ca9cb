//! Tracking of spawned child processes.

use futures::FutureExt;

use crate::error::Error;
use crate::sys;

/// A waitable future yielding a child process's final output.
pub(crate) type WaitableChildProcess = std::pin::Pin<
    Box<dyn futures::Future<Output = Result<std::process::Output, std::io::Error>> + Send + Sync>,
>;

/// A child process being awaited.
pub struct ChildProcess {
    pid: Option<sys::ProcessId>,
    exec_future: WaitableChildProcess,
}

impl ChildProcess {
    /// Wraps a spawned tokio child.
    pub(crate) fn new(pid: Option<sys::ProcessId>, child: tokio::process::Child) -> Self {
        Self {
            pid,
            exec_future: Box::pin(child.wait_with_output()),
        }
    }

    /// Returns the child's process id, if known.
    pub const fn pid(&self) -> Option<sys::ProcessId> {
        self.pid
    }

    /// Waits for the child to exit.
    pub async fn wait(&mut self) -> Result<std::process::Output, Error> {
        let output = (&mut self.exec_future).await?;
        Ok(output)
    }

    /// Polls for completion without blocking.
    pub(crate) fn poll(&mut self) -> Option<Result<std::process::Output, Error>> {
        (&mut self.exec_future)
            .now_or_never()
            .map(|result| result.map_err(Into::into))
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChildProcess(pid={:?})", self.pid)
    }
}
