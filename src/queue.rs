//! Bounded concurrency for in-flight tool calls.
//!
//! Independent of rate limiting: this caps how many calls run at once, not how many start per
//! window. Callers over capacity wait for a slot instead of being rejected.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of simultaneous calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Snapshot reported by [`RequestQueue::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub active: usize,
    /// Callers currently waiting for a slot.
    pub queued: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("request queue is closed")]
    Closed,
}

/// Counting gate over a tokio semaphore.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl RequestQueue {
    /// A queue admitting `max_concurrent` calls at once (at least one).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot. The slot is released when the returned permit drops, including when
    /// the owning future is cancelled.
    pub async fn acquire(&self) -> Result<QueuePermit, QueueError> {
        let waiting = Counted::enter(self.queued.clone());
        let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| QueueError::Closed)?;
        drop(waiting);
        Ok(QueuePermit { _permit: permit, _active: Counted::enter(self.active.clone()) })
    }

    /// Run `operation` while holding a slot.
    pub async fn execute<F, Fut>(&self, operation: F) -> Result<Fut::Output, QueueError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = self.acquire().await?;
        Ok(operation().await)
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            active: self.active.load(Ordering::Acquire),
            queued: self.queued.load(Ordering::Acquire),
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop handing out slots. Waiters and later callers get [`QueueError::Closed`]; calls
    /// already running finish normally.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// A held queue slot.
#[derive(Debug)]
pub struct QueuePermit {
    _permit: OwnedSemaphorePermit,
    _active: Counted,
}

/// Increments a counter on creation and decrements it on drop.
#[derive(Debug)]
struct Counted(Arc<AtomicUsize>);

impl Counted {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

static GLOBAL_QUEUE: OnceLock<RequestQueue> = OnceLock::new();

/// Process-wide queue with [`DEFAULT_MAX_CONCURRENT`] slots.
pub fn global() -> RequestQueue {
    GLOBAL_QUEUE.get_or_init(RequestQueue::default).clone()
}
