//! Progress reporting
//!
//! The sink is the only object shared across concurrent fetch tasks, so
//! every implementation must be callable from many tasks at once and
//! must never block the caller:
//! - `ChannelSink` uses a bounded channel and drops events when full
//! - `ProgressLog` is a lock-protected append-only log
//! - `NullSink` discards everything

use crate::stage::Stage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Stage emitting the event
    pub stage: Stage,
    /// Current retrieval round, counted from 0
    pub round: u32,
    /// Estimated completion, 0..=100
    pub percent: u8,
    /// Optional free-form detail (e.g. the URL just fetched)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProgressEvent {
    /// Create an event, clamping percent to 100
    #[must_use]
    pub fn new(stage: Stage, round: u32, percent: u8) -> Self {
        Self {
            stage,
            round,
            percent: percent.min(100),
            detail: None,
        }
    }

    /// With detail text
    #[inline]
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Non-blocking progress consumer
pub trait ProgressSink: Send + Sync {
    /// Deliver an event; must return promptly
    fn emit(&self, event: ProgressEvent);
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event);
    }
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Append-only in-memory log
#[derive(Debug, Default)]
pub struct ProgressLog {
    inner: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event so far
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.inner.lock().clone()
    }

    /// Number of events recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl ProgressSink for ProgressLog {
    fn emit(&self, event: ProgressEvent) {
        self.inner.lock().push(event);
    }
}

/// Bounded channel sink
///
/// Events are dropped (and counted) when the receiver falls behind or has
/// gone away; the producer never waits.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and its receiving end
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events that could not be delivered
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
