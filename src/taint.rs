// src/taint.rs
//! Deferred mutation ("taint") queue.
//!
//! Any thread may submit a named, typed entry through a [`TaintSender`]. The
//! stepping thread drains them at a safe point with [`TaintQueue::begin_pass`],
//! which snapshots how many entries are queued *now*: whatever is submitted
//! while the pass runs lands behind the snapshot and waits for the next pass.
//!
//! Post-taints are a second, keyed lane. They run after all ordinary entries of
//! the same pass and coalesce on `(name, key)` so a rebuild requested N times
//! runs once.
//!
//! The queue is an owned value, not a global. The scene creates one and hands
//! clones of the sender to every object.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

// ============================================================================
// 1. ENTRIES & STATE
// ============================================================================

/// One queued mutation.
#[derive(Debug)]
pub struct TaintEntry<T> {
    /// Short label for logs, e.g. `"SetPosition"`.
    pub name: &'static str,
    /// Monotonic submission position, shared by both lanes.
    pub seq: u64,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Accepting,
    Draining,
}

/// Counters for diagnostics. Relaxed ordering, values are advisory.
#[derive(Debug, Default)]
pub struct TaintMetrics {
    pub submitted: AtomicUsize,
    pub executed: AtomicUsize,
    pub post_submitted: AtomicUsize,
    pub post_coalesced: AtomicUsize,
    pub guard_violations: AtomicUsize,
}

impl TaintMetrics {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> [usize; 5] {
        [
            self.submitted.load(Ordering::Relaxed),
            self.executed.load(Ordering::Relaxed),
            self.post_submitted.load(Ordering::Relaxed),
            self.post_coalesced.load(Ordering::Relaxed),
            self.guard_violations.load(Ordering::Relaxed),
        ]
    }
}

struct PostEntry<T> {
    key: u64,
    entry: TaintEntry<T>,
}

struct Shared<T> {
    /// Next sequence number. Held across the channel send so channel order
    /// and sequence order agree.
    seq: Mutex<u64>,
    draining: AtomicBool,
    drain_thread: Mutex<Option<ThreadId>>,
    post: Mutex<Vec<PostEntry<T>>>,
    metrics: TaintMetrics,
}

// ============================================================================
// 2. PRODUCER API (any thread)
// ============================================================================

/// Cloneable producer handle.
pub struct TaintSender<T> {
    tx: Sender<TaintEntry<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaintSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> TaintSender<T> {
    #[inline]
    fn next_seq(&self) -> u64 {
        let mut seq = self.shared.seq.lock();
        let current = *seq;
        *seq += 1;
        current
    }

    /// Queue an ordinary entry. Never blocks on the consumer.
    pub fn submit(&self, name: &'static str, payload: T) {
        let sent = {
            let mut seq = self.shared.seq.lock();
            let entry = TaintEntry {
                name,
                seq: *seq,
                payload,
            };
            *seq += 1;
            self.tx.send(entry).is_ok()
        };
        if sent {
            TaintMetrics::bump(&self.shared.metrics.submitted);
        } else {
            log::debug!("taint {name} dropped: queue is gone");
        }
    }

    /// Queue a post-taint. A pending entry with the same `name` and `key` is
    /// replaced in place (keeping its slot) rather than duplicated.
    pub fn submit_post(&self, name: &'static str, key: u64, payload: T) {
        let mut post = self.shared.post.lock();
        if let Some(existing) = post.iter_mut().find(|p| p.key == key && p.entry.name == name) {
            existing.entry.payload = payload;
            TaintMetrics::bump(&self.shared.metrics.post_coalesced);
            return;
        }
        let entry = TaintEntry {
            name,
            seq: self.next_seq(),
            payload,
        };
        post.push(PostEntry { key, entry });
        TaintMetrics::bump(&self.shared.metrics.post_submitted);
    }

    pub fn state(&self) -> QueueState {
        if self.shared.draining.load(Ordering::Acquire) {
            QueueState::Draining
        } else {
            QueueState::Accepting
        }
    }

    /// True only on the draining thread while a pass (or explicit taint-time
    /// section) is open.
    pub fn in_taint_time(&self) -> bool {
        self.state() == QueueState::Draining
            && *self.shared.drain_thread.lock() == Some(std::thread::current().id())
    }

    /// Guard for code that mutates the engine. Panics in debug builds when
    /// called outside taint time; in release builds logs and returns `false`
    /// so the caller can skip the mutation.
    pub fn assert_in_taint_time(&self, what: &'static str) -> bool {
        if self.in_taint_time() {
            return true;
        }
        TaintMetrics::bump(&self.shared.metrics.guard_violations);
        debug_assert!(false, "{what} called outside taint time");
        log::error!("{what}: engine mutation outside taint time, skipped");
        false
    }

    pub fn metrics(&self) -> &TaintMetrics {
        &self.shared.metrics
    }
}

// ============================================================================
// 3. CONSUMER API (stepping thread)
// ============================================================================

pub struct TaintQueue<T> {
    rx: Receiver<TaintEntry<T>>,
    sender: TaintSender<T>,
}

impl<T> Default for TaintQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaintQueue<T> {
    pub fn new() -> Self {
        // Unbounded: a submitted taint must always run eventually.
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            seq: Mutex::new(0),
            draining: AtomicBool::new(false),
            drain_thread: Mutex::new(None),
            post: Mutex::new(Vec::new()),
            metrics: TaintMetrics::default(),
        });
        Self {
            rx,
            sender: TaintSender { tx, shared },
        }
    }

    pub fn sender(&self) -> TaintSender<T> {
        self.sender.clone()
    }

    /// Ordinary entries waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn pending_post(&self) -> usize {
        self.sender.shared.post.lock().len()
    }

    pub fn state(&self) -> QueueState {
        self.sender.state()
    }

    /// Mark the current thread as being in taint time until the guard drops.
    pub fn enter_taint_time(&self) -> TaintTimeGuard<'_, T> {
        TaintTimeGuard::new(&self.sender.shared)
    }

    /// Start draining the ordinary lane. Only the entries queued at this
    /// instant are yielded.
    pub fn begin_pass(&self) -> TaintPass<'_, T> {
        let remaining = self.rx.len();
        TaintPass {
            _guard: self.enter_taint_time(),
            rx: &self.rx,
            metrics: &self.sender.shared.metrics,
            remaining,
        }
    }

    /// Start draining the post lane. Post-taints submitted while this pass
    /// runs are kept for the next one.
    pub fn begin_post_pass(&self) -> PostTaintPass<'_, T> {
        let taken = std::mem::take(&mut *self.sender.shared.post.lock());
        PostTaintPass {
            _guard: self.enter_taint_time(),
            entries: taken.into_iter(),
            metrics: &self.sender.shared.metrics,
        }
    }
}

/// RAII marker for taint time. Restores the previous state on drop, so an
/// explicit section opened inside a pass does not end the pass.
pub struct TaintTimeGuard<'a, T> {
    shared: &'a Shared<T>,
    previous_thread: Option<ThreadId>,
    was_draining: bool,
}

impl<'a, T> TaintTimeGuard<'a, T> {
    fn new(shared: &'a Shared<T>) -> Self {
        let was_draining = shared.draining.swap(true, Ordering::AcqRel);
        let previous_thread = shared.drain_thread.lock().replace(std::thread::current().id());
        Self {
            shared,
            previous_thread,
            was_draining,
        }
    }
}

impl<T> Drop for TaintTimeGuard<'_, T> {
    fn drop(&mut self) {
        *self.shared.drain_thread.lock() = self.previous_thread;
        self.shared.draining.store(self.was_draining, Ordering::Release);
    }
}

pub struct TaintPass<'a, T> {
    _guard: TaintTimeGuard<'a, T>,
    rx: &'a Receiver<TaintEntry<T>>,
    metrics: &'a TaintMetrics,
    remaining: usize,
}

impl<T> Iterator for TaintPass<'_, T> {
    type Item = TaintEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self.rx.try_recv().ok()?;
        TaintMetrics::bump(&self.metrics.executed);
        Some(entry)
    }
}

pub struct PostTaintPass<'a, T> {
    _guard: TaintTimeGuard<'a, T>,
    entries: std::vec::IntoIter<PostEntry<T>>,
    metrics: &'a TaintMetrics,
}

impl<T> Iterator for PostTaintPass<'_, T> {
    type Item = TaintEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let post = self.entries.next()?;
        TaintMetrics::bump(&self.metrics.executed);
        Some(post.entry)
    }
}
