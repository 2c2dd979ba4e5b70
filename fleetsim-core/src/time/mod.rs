//! # Clocks
//!
//! Snapshot timestamps come from a [`Clock`]. Production runs read the
//! system clock; tests and replays use [`VirtualClock`], which only moves
//! when told to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of millisecond Unix timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// A deterministic clock that advances in milliseconds.
///
/// Clones share the same counter, so a test can keep one handle and
/// advance the time seen by the engine.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    offset: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Starts the clock at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    #[inline]
    pub fn advance(&self, ms: u64) {
        self.offset.fetch_add(ms, Ordering::Release);
    }

    #[inline]
    pub fn set(&self, ms: u64) {
        self.offset.store(ms, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
