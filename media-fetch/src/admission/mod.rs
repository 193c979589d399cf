//! Admission control.
//!
//! Bounds concurrent work with a lazily created per-requester semaphore of
//! capacity N and a process-wide semaphore of capacity M. The requester
//! permit is always acquired first, so a requester never waits on its own
//! cap while holding a global slot. Fairness across requesters is whatever
//! the semaphores' wait queues give; there is no FIFO guarantee between
//! different requesters.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::domain::RequesterId;
use crate::{Error, Result};

/// Which caps apply to whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionMode {
    /// Everyone, privileged requesters included, is bound by both caps.
    #[default]
    All,
    /// Privileged requesters skip the global cap.
    PrivilegedExempt,
    /// Global cap disabled.
    PerRequesterOnly,
}

impl AdmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::PrivilegedExempt => "privileged-exempt",
            Self::PerRequesterOnly => "per-requester-only",
        }
    }

    fn global_cap_applies(self, privileged: bool) -> bool {
        match self {
            Self::All => true,
            Self::PrivilegedExempt => !privileged,
            Self::PerRequesterOnly => false,
        }
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(Self::All),
            "privileged-exempt" => Ok(Self::PrivilegedExempt),
            "per-requester-only" => Ok(Self::PerRequesterOnly),
            other => Err(Error::validation(format!("unknown admission mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Concurrent operations per requester (N, default: 3).
    pub per_requester_limit: usize,
    /// Concurrent operations system-wide (M, default: 3).
    pub global_limit: usize,
    pub mode: AdmissionMode,
    pub privileged: Vec<RequesterId>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            per_requester_limit: 3,
            global_limit: 3,
            mode: AdmissionMode::default(),
            privileged: Vec::new(),
        }
    }
}

/// Point-in-time view for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub mode: AdmissionMode,
    pub per_requester_limit: usize,
    pub global_limit: usize,
    pub global_available: usize,
    /// Requesters with waiting or running work, sorted by id.
    pub active: Vec<(RequesterId, usize)>,
}

/// Counts one waiting-or-running operation; removes the counter at zero.
struct ActiveCount {
    active: Arc<DashMap<RequesterId, usize>>,
    requester: RequesterId,
}

impl ActiveCount {
    fn increment(active: &Arc<DashMap<RequesterId, usize>>, requester: RequesterId) -> Self {
        *active.entry(requester).or_insert(0) += 1;
        Self {
            active: Arc::clone(active),
            requester,
        }
    }
}

impl Drop for ActiveCount {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.active.entry(self.requester) {
            let count = entry.get_mut();
            *count = count.saturating_sub(1);
            if *count == 0 {
                entry.remove();
            }
        }
    }
}

/// Capacity held for one operation. Released on drop.
pub struct AdmissionSlot {
    // Field order is drop order: global, then requester, then the counter.
    global: Option<OwnedSemaphorePermit>,
    _requester: OwnedSemaphorePermit,
    _active: ActiveCount,
}

impl AdmissionSlot {
    pub fn holds_global(&self) -> bool {
        self.global.is_some()
    }
}

pub struct AdmissionController {
    per_requester_limit: usize,
    global_limit: usize,
    requester_semaphores: DashMap<RequesterId, Arc<Semaphore>>,
    global: Arc<Semaphore>,
    active: Arc<DashMap<RequesterId, usize>>,
    mode: RwLock<AdmissionMode>,
    privileged: RwLock<HashSet<RequesterId>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        let per_requester_limit = config.per_requester_limit.max(1);
        let global_limit = config.global_limit.max(1);
        Self {
            per_requester_limit,
            global_limit,
            requester_semaphores: DashMap::new(),
            global: Arc::new(Semaphore::new(global_limit)),
            active: Arc::new(DashMap::new()),
            mode: RwLock::new(config.mode),
            privileged: RwLock::new(config.privileged.into_iter().collect()),
        }
    }

    pub fn mode(&self) -> AdmissionMode {
        *self.mode.read()
    }

    /// Applies to acquisitions that start after the call.
    pub fn set_mode(&self, mode: AdmissionMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            info!(%previous, %mode, "Admission mode changed");
        }
    }

    pub fn set_privileged(&self, requester: RequesterId, privileged: bool) {
        let mut set = self.privileged.write();
        if privileged {
            set.insert(requester);
        } else {
            set.remove(&requester);
        }
    }

    pub fn is_privileged(&self, requester: RequesterId) -> bool {
        self.privileged.read().contains(&requester)
    }

    /// Run `task` once a slot is available. The slot is released on every
    /// exit path, including when the returned future is dropped.
    pub async fn submit<F, T>(&self, requester: RequesterId, task: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let slot = self.acquire(requester).await?;
        let output = task.await;
        drop(slot);
        Ok(output)
    }

    /// Acquire a slot: requester permit first, then the global one if the
    /// current mode applies it to `requester`.
    pub async fn acquire(&self, requester: RequesterId) -> Result<AdmissionSlot> {
        let active = ActiveCount::increment(&self.active, requester);

        let semaphore = self
            .requester_semaphores
            .entry(requester)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_requester_limit)))
            .clone();
        let requester_permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Semaphore error: {e}")))?;

        let global = if self.mode().global_cap_applies(self.is_privileged(requester)) {
            let permit = Arc::clone(&self.global)
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("Semaphore error: {e}")))?;
            Some(permit)
        } else {
            None
        };

        debug!(%requester, global = global.is_some(), "Admission slot acquired");
        Ok(AdmissionSlot {
            global,
            _requester: requester_permit,
            _active: active,
        })
    }

    pub fn active_for(&self, requester: RequesterId) -> usize {
        self.active.get(&requester).map_or(0, |c| *c)
    }

    pub fn stats(&self) -> AdmissionStats {
        let mut active: Vec<_> = self.active.iter().map(|e| (*e.key(), *e.value())).collect();
        active.sort_unstable();
        AdmissionStats {
            mode: self.mode(),
            per_requester_limit: self.per_requester_limit,
            global_limit: self.global_limit,
            global_available: self.global.available_permits(),
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn controller(n: usize, m: usize, mode: AdmissionMode) -> Arc<AdmissionController> {
        Arc::new(AdmissionController::new(AdmissionConfig {
            per_requester_limit: n,
            global_limit: m,
            mode,
            privileged: Vec::new(),
        }))
    }

    async fn settle() {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fourth_task_waits_for_a_released_slot() {
        let controller = controller(3, 10, AdmissionMode::All);
        let requester = RequesterId::new(7);
        let started = Arc::new(Mutex::new(Vec::new()));
        let mut releases = Vec::new();
        let mut handles = Vec::new();

        for idx in 0..4 {
            let (tx, rx) = oneshot::channel::<()>();
            releases.push(Some(tx));
            let controller = controller.clone();
            let started = started.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .submit(requester, async move {
                        started.lock().push(idx);
                        let _ = rx.await;
                    })
                    .await
            }));
        }

        settle().await;
        assert_eq!(started.lock().len(), 3);
        assert_eq!(controller.active_for(requester), 4);

        let first = started.lock()[0];
        releases[first].take().unwrap().send(()).unwrap();
        settle().await;
        assert_eq!(started.lock().len(), 4);

        for tx in releases.into_iter().flatten() {
            let _ = tx.send(());
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(controller.stats().active.is_empty());
    }

    async fn run_load(controller: Arc<AdmissionController>, requesters: i64, tasks: usize) -> (usize, usize) {
        let global_now = Arc::new(AtomicUsize::new(0));
        let global_max = Arc::new(AtomicUsize::new(0));
        let per_max = Arc::new(AtomicUsize::new(0));
        let per_now: Arc<DashMap<RequesterId, usize>> = Arc::new(DashMap::new());

        let mut handles = Vec::new();
        for r in 0..requesters {
            for _ in 0..tasks {
                let controller = controller.clone();
                let (global_now, global_max, per_max, per_now) =
                    (global_now.clone(), global_max.clone(), per_max.clone(), per_now.clone());
                let requester = RequesterId::new(r);
                handles.push(tokio::spawn(async move {
                    controller
                        .submit(requester, async move {
                            let g = global_now.fetch_add(1, Ordering::SeqCst) + 1;
                            global_max.fetch_max(g, Ordering::SeqCst);
                            let p = {
                                let mut entry = per_now.entry(requester).or_insert(0);
                                *entry += 1;
                                *entry
                            };
                            per_max.fetch_max(p, Ordering::SeqCst);

                            tokio::time::sleep(Duration::from_millis(5)).await;

                            *per_now.get_mut(&requester).unwrap() -= 1;
                            global_now.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        (per_max.load(Ordering::SeqCst), global_max.load(Ordering::SeqCst))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_caps_hold_under_load() {
        let controller = controller(2, 3, AdmissionMode::All);
        let (per_max, global_max) = run_load(controller.clone(), 5, 6).await;
        assert!(per_max <= 2, "per-requester max {per_max}");
        assert!(global_max <= 3, "global max {global_max}");
        assert!(controller.stats().active.is_empty());
        assert_eq!(controller.stats().global_available, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_requester_only_ignores_global_cap() {
        let controller = controller(2, 1, AdmissionMode::PerRequesterOnly);
        let (per_max, _) = run_load(controller.clone(), 4, 4).await;
        assert!(per_max <= 2);
        assert_eq!(controller.stats().global_available, 1);
    }

    #[tokio::test]
    async fn test_privileged_requester_skips_global_cap() {
        let controller = controller(3, 1, AdmissionMode::PrivilegedExempt);
        let vip = RequesterId::new(1);
        controller.set_privileged(vip, true);

        let held = controller.acquire(RequesterId::new(2)).await.unwrap();
        assert!(held.holds_global());

        let slot = tokio::time::timeout(Duration::from_secs(1), controller.acquire(vip))
            .await
            .expect("privileged requester must not wait on the global cap")
            .unwrap();
        assert!(!slot.holds_global());

        controller.set_mode(AdmissionMode::All);
        let blocked = tokio::time::timeout(Duration::from_millis(50), controller.acquire(vip)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_counter() {
        let controller = controller(1, 3, AdmissionMode::All);
        let requester = RequesterId::new(3);
        let held = controller.acquire(requester).await.unwrap();

        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.acquire(requester).await.map(|_| ()) })
        };
        settle().await;
        assert_eq!(controller.active_for(requester), 2);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(controller.active_for(requester), 1);

        drop(held);
        assert_eq!(controller.active_for(requester), 0);
        assert_eq!(controller.stats().global_available, 3);
    }

    #[tokio::test]
    async fn test_task_error_propagates_after_release() {
        let controller = controller(1, 1, AdmissionMode::All);
        let requester = RequesterId::new(4);
        let result: Result<std::result::Result<(), &str>> =
            controller.submit(requester, async { Err("boom") }).await;
        assert_eq!(result.unwrap(), Err("boom"));
        assert_eq!(controller.stats().global_available, 1);
        assert_eq!(controller.active_for(requester), 0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("privileged_exempt".parse::<AdmissionMode>().unwrap(), AdmissionMode::PrivilegedExempt);
        assert_eq!("PER-REQUESTER-ONLY".parse::<AdmissionMode>().unwrap(), AdmissionMode::PerRequesterOnly);
        assert!("none".parse::<AdmissionMode>().is_err());
    }
}
