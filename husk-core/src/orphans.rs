//! The process-global orphan supervisor. Disowned jobs are re-parented here
//! so their children outlive the session that launched them; each child is
//! reaped by a detached task when it exits.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::jobs::{Job, JobTask};

static SUPERVISOR: OnceLock<OrphanSupervisor> = OnceLock::new();

struct OrphanSupervisor {
    adopted: AtomicUsize,
}

fn supervisor() -> &'static OrphanSupervisor {
    SUPERVISOR.get_or_init(|| OrphanSupervisor {
        adopted: AtomicUsize::new(0),
    })
}

/// Takes ownership of a disowned job's children, keeping them alive and
/// unlinked from any session until they exit naturally.
pub(crate) fn adopt(job: Job) {
    let supervisor = supervisor();

    for task in job.tasks {
        supervisor.adopted.fetch_add(1, Ordering::Relaxed);

        match task {
            JobTask::External(mut process) => {
                tokio::spawn(async move {
                    let _ = process.wait().await;
                    supervisor.adopted.fetch_sub(1, Ordering::Relaxed);
                });
            }
            JobTask::Internal(handle) => {
                tokio::spawn(async move {
                    let _ = handle.await;
                    supervisor.adopted.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }
}

/// Returns the number of children currently adopted by the supervisor.
pub(crate) fn adopted_count() -> usize {
    supervisor().adopted.load(Ordering::Relaxed)
}
