//! Rolling window of recent triggers and the context derived from it.
//!
//! The window is shared between the trigger producer and the decision path.
//! Both take the same short mutex: a push is O(1) amortized, a snapshot evicts
//! aged entries and reads the count and running velocity sum in one critical
//! section, so a decision never sees a half-updated window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Context, Density, Energy, Trigger};
use crate::error::ValidationError;

/// Largest window the engine accepts
pub const MAX_WINDOW_CAPACITY: usize = 65_536;

/// Bucket boundaries for density (hit count) and energy (mean velocity)
///
/// A value below `low` lands in the lowest bucket, below `high` in the
/// middle bucket, otherwise in the highest.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Thresholds {
    /// Hit counts splitting Sparse / Medium / Busy
    pub density: (usize, usize),
    /// Mean velocities splitting Chill / Groove / High
    pub energy: (f64, f64),
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (low, high) = self.density;
        if low > high {
            return Err(ValidationError::Thresholds {
                name: "density",
                low: low as f64,
                high: high as f64,
            });
        }

        let (low, high) = self.energy;
        if !(low.is_finite() && high.is_finite()) || low < 0.0 || low > high {
            return Err(ValidationError::Thresholds {
                name: "energy",
                low,
                high,
            });
        }
        Ok(())
    }

    /// Map a hit count and mean velocity onto one of the nine contexts
    pub fn classify(&self, count: usize, mean_velocity: Option<f64>) -> Context {
        let Some(mean) = mean_velocity.filter(|_| count > 0) else {
            return Context::LOWEST;
        };

        let density = Density::from_bucket(bucket(
            count as f64,
            self.density.0 as f64,
            self.density.1 as f64,
        ));
        let energy = Energy::from_bucket(bucket(mean, self.energy.0, self.energy.1));
        Context { density, energy }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            density: (3, 8),
            energy: (64.0, 96.0),
        }
    }
}

fn bucket(value: f64, low: f64, high: f64) -> usize {
    if value < low {
        0
    } else if value < high {
        1
    } else {
        2
    }
}

/// Bounded, time-limited sequence of recent hits
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entries: VecDeque<(Instant, u8)>,
    capacity: usize,
    span: Duration,
    /// Sum of velocities currently in the window
    velocity_sum: u64,
}

impl RollingWindow {
    pub fn new(capacity: usize, span: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(MAX_WINDOW_CAPACITY)),
            capacity,
            span,
            velocity_sum: 0,
        }
    }

    /// Record a hit, evicting the oldest one when full
    pub fn push(&mut self, timestamp: Instant, velocity: u8) {
        if self.entries.len() == self.capacity {
            self.pop_front();
        }
        self.entries.push_back((timestamp, velocity));
        self.velocity_sum += u64::from(velocity);
    }

    /// Drop hits older than the span, measured back from `now`
    pub fn evict_aged(&mut self, now: Instant) {
        while let Some(&(timestamp, _)) = self.entries.front() {
            if now.saturating_duration_since(timestamp) > self.span {
                self.pop_front();
            } else {
                break;
            }
        }
    }

    fn pop_front(&mut self) {
        if let Some((_, velocity)) = self.entries.pop_front() {
            self.velocity_sum -= u64::from(velocity);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.velocity_sum = 0;
    }

    pub fn mean_velocity(&self) -> Option<f64> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.velocity_sum as f64 / self.entries.len() as f64)
        }
    }

    pub fn last_velocity(&self) -> Option<u8> {
        self.entries.back().map(|&(_, velocity)| velocity)
    }
}

/// Consistent view of the window at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    pub context: Context,
    pub count: usize,
    pub mean_velocity: Option<f64>,
    pub last_velocity: Option<u8>,
}

/// Thread-safe context source fed by triggers
pub struct ContextTracker {
    window: Mutex<RollingWindow>,
    thresholds: Thresholds,
    /// Triggers recorded since the last `take_pending`
    pending: AtomicUsize,
}

impl ContextTracker {
    pub fn new(thresholds: Thresholds, capacity: usize, span: Duration) -> Self {
        Self {
            window: Mutex::new(RollingWindow::new(capacity, span)),
            thresholds,
            pending: AtomicUsize::new(0),
        }
    }

    /// Record a trigger
    pub fn on_trigger(&self, trigger: Trigger) {
        self.lock_window().push(trigger.timestamp, trigger.velocity);
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Context as of now
    pub fn current_context(&self) -> Context {
        self.context_at(Instant::now())
    }

    /// Context as of `now`
    pub fn context_at(&self, now: Instant) -> Context {
        self.snapshot_at(now).context
    }

    /// Evict aged hits and read the window in one critical section
    pub fn snapshot_at(&self, now: Instant) -> WindowSnapshot {
        let (count, mean_velocity, last_velocity) = {
            let mut window = self.lock_window();
            window.evict_aged(now);
            (window.len(), window.mean_velocity(), window.last_velocity())
        };

        WindowSnapshot {
            context: self.thresholds.classify(count, mean_velocity),
            count,
            mean_velocity,
            last_velocity,
        }
    }

    /// Number of triggers since the previous call, resetting the count
    pub fn take_pending(&self) -> usize {
        self.pending.swap(0, Ordering::AcqRel)
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Forget every recorded hit
    pub fn reset(&self) {
        self.lock_window().clear();
        self.pending.store(0, Ordering::Release);
    }

    fn lock_window(&self) -> MutexGuard<'_, RollingWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
