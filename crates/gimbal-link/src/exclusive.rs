//! Exclusive-access scheduler for the half-duplex wire.
//!
//! Two kinds of consumers share the wire:
//!
//! - one repeating consumer, the telemetry poller, entering through
//!   [`ExclusiveAccess::direct_access`];
//! - any number of one-off operations (manual commands, register queries,
//!   calibration sequences), entering through
//!   [`ExclusiveAccess::run_exclusive`].
//!
//! The poller is never suspended. Before each tick it checks whether a
//! one-off operation has asked for the wire or whether its own previous
//! tick is still in flight; if so the tick is dropped, and the next timer
//! firing tries again. Locking overhead is paid only while a one-off
//! operation is pending.
//!
//! One-off operations are serialized among themselves by an owner lock.
//! `run_exclusive` is reentrant: a nested call made while the same task is
//! inside an outer `run_exclusive` of the same scheduler joins the outer
//! hold instead of waiting on it. The hold is tracked with a tokio
//! task-local, so it follows the logical operation and not the thread.
//!
//! Both entry points release their state in `Drop` guards, so an error, a
//! panic, or a dropped future never leaves the wire claimed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

tokio::task_local! {
    /// Ids of the schedulers the current task holds.
    static HELD: Vec<u64>;
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct Flags {
    /// Number of `run_exclusive` calls running or waiting, nested included.
    depth: usize,
    /// Set while `depth > 0`; the poller skips its tick when it sees it.
    pause_requested: bool,
    /// Set by the poller for the duration of one tick.
    cycle_in_progress: bool,
}

struct Inner {
    id: u64,
    flags: Mutex<Flags>,
    /// Woken when a poll cycle ends.
    idle: Notify,
    /// Serializes outermost `run_exclusive` calls.
    owner: tokio::sync::Mutex<()>,
}

/// Cooperative mutual exclusion between the poller and one-off operations.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct ExclusiveAccess {
    inner: Arc<Inner>,
}

impl ExclusiveAccess {
    pub fn new() -> Self {
        ExclusiveAccess {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                flags: Mutex::new(Flags::default()),
                idle: Notify::new(),
                owner: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.inner.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of exclusive operations running or waiting, nested included.
    pub fn depth(&self) -> usize {
        self.flags().depth
    }

    pub fn is_pause_requested(&self) -> bool {
        self.flags().pause_requested
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.flags().cycle_in_progress
    }

    /// Whether the calling task is inside a `run_exclusive` of this
    /// scheduler.
    pub fn is_held_by_current_task(&self) -> bool {
        HELD.try_with(|held| held.contains(&self.inner.id))
            .unwrap_or(false)
    }

    /// Run `op` with exclusive use of the wire.
    ///
    /// The outermost call requests a pause, waits for its turn among other
    /// one-off operations, then waits for any in-flight poll tick to finish
    /// before running `op`. Nested calls from inside `op` run immediately.
    ///
    /// `op`'s output, including any error it carries, is returned as is.
    pub async fn run_exclusive<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _depth = DepthGuard::enter(self);

        if self.is_held_by_current_task() {
            trace!("nested exclusive access");
            return op().await;
        }

        let _owner = self.inner.owner.lock().await;
        self.wait_for_idle().await;
        trace!("exclusive access acquired");

        let mut held = HELD.try_with(Clone::clone).unwrap_or_default();
        held.push(self.inner.id);
        HELD.scope(held, op()).await
    }

    /// Run one poll cycle unless excluded.
    ///
    /// Returns `None` without running `op` when a one-off operation has
    /// requested the wire or another cycle is still in flight. The tick is
    /// dropped, not queued.
    ///
    /// Must not be called from inside `run_exclusive`; it would always be
    /// skipped.
    pub async fn direct_access<F, Fut, T>(&self, op: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _cycle = CycleGuard::try_begin(self)?;
        Some(op().await)
    }

    async fn wait_for_idle(&self) {
        loop {
            // Register before checking so a wakeup between the check and
            // the await is not lost.
            let notified = self.inner.idle.notified();
            let busy = self.flags().cycle_in_progress;
            if !busy {
                return;
            }
            trace!("waiting for in-flight poll cycle");
            notified.await;
        }
    }
}

impl Default for ExclusiveAccess {
    fn default() -> Self {
        Self::new()
    }
}

struct DepthGuard<'a> {
    access: &'a ExclusiveAccess,
}

impl<'a> DepthGuard<'a> {
    fn enter(access: &'a ExclusiveAccess) -> Self {
        let mut flags = access.flags();
        flags.depth += 1;
        flags.pause_requested = true;
        DepthGuard { access }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut flags = self.access.flags();
        flags.depth = flags.depth.saturating_sub(1);
        if flags.depth == 0 {
            flags.pause_requested = false;
        }
    }
}

struct CycleGuard<'a> {
    access: &'a ExclusiveAccess,
}

impl<'a> CycleGuard<'a> {
    fn try_begin(access: &'a ExclusiveAccess) -> Option<Self> {
        let mut flags = access.flags();
        if flags.pause_requested || flags.cycle_in_progress {
            return None;
        }
        flags.cycle_in_progress = true;
        Some(CycleGuard { access })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.access.flags().cycle_in_progress = false;
        self.access.inner.idle.notify_waiters();
    }
}
