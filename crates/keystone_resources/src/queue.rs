//! The deferred lifecycle queue.
//!
//! Lifecycle requests that arrive while the registry must not change (from
//! inside a resource's own execution context, or from another thread) are
//! queued and applied later by a single drain pass on the tick thread.
//!
//! # Ordering
//!
//! Entries are processed strictly in arrival order and are never coalesced:
//! `Stop` then `Start` for the same resource ends with it running. A drain
//! only takes entries that were pending when it began; anything enqueued
//! while it runs waits for the next drain.
//!
//! # Example
//!
//! ```
//! use keystone_resources::queue::{LifecycleQueue, QueueKind, QueuedOperation};
//! use keystone_resources::resource::StartFlags;
//!
//! let queue = LifecycleQueue::new();
//! queue.enqueue(QueuedOperation::stop("race"));
//! queue.enqueue(QueuedOperation::start("race", StartFlags::ALL));
//!
//! let mut drain = queue.begin_drain().unwrap();
//! assert!(queue.begin_drain().is_none());
//!
//! assert_eq!(drain.next_pending().map(|op| op.kind), Some(QueueKind::Stop));
//! assert_eq!(drain.next_pending().map(|op| op.kind), Some(QueueKind::Start));
//! assert!(drain.next_pending().is_none());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::resource::{StartFlags, key_of};

// ─────────────────────────────────────────────────────────────────────────────
// QueuedOperation
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of deferred lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Start the resource.
    Start,
    /// Stop the resource and everything running that depends on it.
    Stop,
    /// Stop every running resource.
    StopAll,
    /// Stop, then queue a [`RestartApply`](Self::RestartApply).
    Restart,
    /// Second half of a restart: start again, then the listed dependents.
    RestartApply,
    /// Reconcile one resource with storage.
    Refresh,
    /// Reconcile every resource with storage.
    RefreshAll,
}

/// A pending lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOperation {
    /// Target resource. Absent for the `*All` kinds.
    pub resource: Option<String>,
    /// What to do.
    pub kind: QueueKind,
    /// Parts to activate when the operation starts something.
    pub flags: StartFlags,
    /// Resources to reprocess once the target's transition completes.
    pub dependents: Vec<String>,
}

impl QueuedOperation {
    /// Creates an operation targeting `resource`.
    #[must_use]
    pub fn new(
        kind: QueueKind,
        resource: impl Into<String>,
        flags: StartFlags,
        dependents: Vec<String>,
    ) -> Self {
        Self {
            resource: Some(resource.into()),
            kind,
            flags,
            dependents,
        }
    }

    /// Start `resource` with `flags`.
    #[must_use]
    pub fn start(resource: impl Into<String>, flags: StartFlags) -> Self {
        Self::new(QueueKind::Start, resource, flags, Vec::new())
    }

    /// Stop `resource`.
    #[must_use]
    pub fn stop(resource: impl Into<String>) -> Self {
        Self::new(QueueKind::Stop, resource, StartFlags::ALL, Vec::new())
    }

    /// Restart `resource`, then bring `dependents` back up.
    #[must_use]
    pub fn restart(resource: impl Into<String>, flags: StartFlags, dependents: Vec<String>) -> Self {
        Self::new(QueueKind::Restart, resource, flags, dependents)
    }

    /// Refresh `resource` from storage, then start `dependents` if needed.
    #[must_use]
    pub fn refresh(resource: impl Into<String>, dependents: Vec<String>) -> Self {
        Self::new(QueueKind::Refresh, resource, StartFlags::ALL, dependents)
    }

    /// Stop everything.
    #[must_use]
    pub fn stop_all() -> Self {
        Self::untargeted(QueueKind::StopAll)
    }

    /// Refresh everything.
    #[must_use]
    pub fn refresh_all() -> Self {
        Self::untargeted(QueueKind::RefreshAll)
    }

    fn untargeted(kind: QueueKind) -> Self {
        Self {
            resource: None,
            kind,
            flags: StartFlags::ALL,
            dependents: Vec::new(),
        }
    }

    fn targets(&self, key: &str) -> bool {
        self.resource
            .as_deref()
            .is_some_and(|name| key_of(name) == key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LifecycleQueue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
    seq: u64,
    op: QueuedOperation,
}

#[derive(Debug, Default)]
struct Pending {
    next_seq: u64,
    entries: VecDeque<Entry>,
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<Pending>,
    draining: AtomicBool,
}

/// FIFO of deferred lifecycle operations.
///
/// Cloning yields another handle to the same queue. `enqueue` and `dequeue`
/// may be called from any thread, including while a drain is running.
#[derive(Debug, Clone, Default)]
pub struct LifecycleQueue {
    shared: Arc<Shared>,
}

impl LifecycleQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation. Duplicates are kept.
    pub fn enqueue(&self, op: QueuedOperation) {
        let mut pending = self.shared.pending.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;
        tracing::debug!(
            resource = op.resource.as_deref().unwrap_or("*"),
            kind = ?op.kind,
            seq,
            "queued lifecycle operation"
        );
        pending.entries.push_back(Entry { seq, op });
    }

    /// Removes every pending entry targeting `name`. Returns how many were removed.
    pub fn dequeue(&self, name: &str) -> usize {
        let key = key_of(name);
        let mut pending = self.shared.pending.lock();
        let before = pending.entries.len();
        pending.entries.retain(|entry| !entry.op.targets(&key));
        let removed = before - pending.entries.len();
        if removed > 0 {
            tracing::debug!(resource = %name, removed, "dequeued lifecycle operations");
        }
        removed
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.pending.lock().entries.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.pending.lock().entries.is_empty()
    }

    /// Copies the pending operations in order.
    #[must_use]
    pub fn pending(&self) -> Vec<QueuedOperation> {
        self.shared
            .pending
            .lock()
            .entries
            .iter()
            .map(|entry| entry.op.clone())
            .collect()
    }

    /// Returns true while a drain is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::Acquire)
    }

    /// Starts a drain.
    ///
    /// Returns `None` if a drain is already running. The guard yields only
    /// the entries pending right now and releases the busy flag when dropped.
    #[must_use]
    pub fn begin_drain(&self) -> Option<DrainGuard> {
        if self
            .shared
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let limit = self.shared.pending.lock().next_seq;
        Some(DrainGuard {
            shared: Arc::clone(&self.shared),
            limit,
        })
    }
}

/// An in-progress drain. See [`LifecycleQueue::begin_drain`].
#[derive(Debug)]
pub struct DrainGuard {
    shared: Arc<Shared>,
    limit: u64,
}

impl DrainGuard {
    /// Pops the next entry that was pending when the drain began.
    pub fn next_pending(&mut self) -> Option<QueuedOperation> {
        let mut pending = self.shared.pending.lock();
        if pending.entries.front()?.seq >= self.limit {
            return None;
        }
        pending.entries.pop_front().map(|entry| entry.op)
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.shared.draining.store(false, Ordering::Release);
    }
}
