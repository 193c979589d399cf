//! Supervised background tasks.
//!
//! Every long-running loop (cache sweep, diagnostics flush, maintenance, log
//! retention) is spawned here under a name. Errors and panics are logged with
//! that name and counted instead of disappearing with a detached task.
//!
//! Panics are only caught when the binary unwinds. The release profile builds
//! with `panic = "abort"`, so there a panic in any task ends the process after
//! the hook in `panic_hook` has written it to the log.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;

pub struct TaskSupervisor {
    cancel_token: CancellationToken,
    tasks: Mutex<Option<JoinSet<()>>>,
    failures: Arc<AtomicU64>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl TaskSupervisor {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            tasks: Mutex::new(Some(JoinSet::new())),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Spawn `make(token)` as a named task. Returns false after shutdown.
    pub fn spawn<F, Fut>(&self, name: &'static str, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!(task = name, "Supervisor already shut down, task not started");
            return false;
        };

        let fut = make(self.cancel_token.child_token());
        let failures = self.failures.clone();
        join_set.spawn(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "Background task finished"),
                Ok(Err(e)) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(task = name, error = %e, "Background task failed");
                }
                Err(panic) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(task = name, panic = %panic_message(&*panic), "Background task panicked");
                }
            }
        });
        debug!(task = name, "Background task started");
        true
    }

    /// Tasks that returned an error or panicked.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().as_ref().map_or(0, JoinSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every task and wait up to `timeout` for them to finish; the
    /// rest are aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel_token.cancel();
        let Some(mut join_set) = self.tasks.lock().take() else {
            return;
        };

        let drained = tokio::time::timeout(timeout, async {
            while join_set.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = join_set.len(), "Background tasks did not stop in time, aborting");
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
        }
        info!(failures = self.failures(), "Background tasks stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_failures_and_panics_are_counted() {
        let supervisor = TaskSupervisor::default();
        supervisor.spawn("fails", |_| async { Err::<(), Error>(Error::Other("boom".to_string())) });
        supervisor.spawn("panics", |_| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), Error>(())
        });
        supervisor.spawn("loop", |token| async move {
            token.cancelled().await;
            Ok::<(), Error>(())
        });
        assert_eq!(supervisor.len(), 3);

        supervisor.shutdown(Duration::from_secs(5)).await;
        assert_eq!(supervisor.failures(), 2);
        assert!(!supervisor.spawn("late", |_| async { Ok::<(), Error>(()) }));
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted() {
        let supervisor = TaskSupervisor::default();
        supervisor.spawn("stuck", |_| async {
            std::future::pending::<()>().await;
            Ok::<(), Error>(())
        });
        supervisor.shutdown(Duration::from_millis(50)).await;
        assert!(supervisor.is_empty());
        assert_eq!(supervisor.failures(), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
    }
}
