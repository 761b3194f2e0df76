//! Streaming request-count statistics
//!
//! Single-pass, constant-memory accumulator (Welford's online algorithm)
//! for per-connection request counts. One accumulator covers all
//! connections, plus one per destination.

use std::sync::Arc;

use parking_lot::Mutex;

/// Streaming aggregate of integer samples.
///
/// Tracks count, min, max, mean and the running sum of squared deviations
/// (M2) without retaining raw samples.
#[derive(Debug, Clone, Default)]
pub struct Statistic {
    count: u64,
    min: u64,
    max: u64,
    mean: f64,
    m2: f64,
}

impl Statistic {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn add(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;

        let delta = value as f64 - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value as f64 - self.mean;
        self.m2 += delta * delta2;
    }

    /// Combine another accumulator into this one.
    ///
    /// Parallel form of the online update: the result is identical to having
    /// added both sample streams to a single accumulator.
    pub fn merge(&mut self, other: &Statistic) {
        if other.count == 0 {
            return;
        }

        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let total = self.count + other.count;
        let delta = other.mean - self.mean;

        self.m2 += other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / total as f64;
        self.mean += delta * other.count as f64 / total as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = total;
    }

    /// Number of samples seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Smallest sample, 0 when empty.
    pub fn min(&self) -> u64 {
        self.min
    }

    /// Largest sample, 0 when empty.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Arithmetic mean, 0 when empty.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation, 0 for fewer than two samples.
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    /// Copy of the derived fields in reporting order.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            count: self.count,
            min: self.min,
            mean: self.mean,
            max: self.max,
            stddev: self.stddev(),
        }
    }
}

impl PartialEq for Statistic {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.min == other.min
            && self.max == other.max
            && self.mean == other.mean
            && self.stddev() == other.stddev()
    }
}

/// Point-in-time copy of the derived fields, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    pub count: u64,
    pub min: u64,
    pub mean: f64,
    pub max: u64,
    pub stddev: f64,
}

/// Cloneable handle to a lock-guarded [`Statistic`].
///
/// `snapshot` copies all derived fields under the lock, so an out-of-band
/// reader (the SIGUSR1 live-report path) never races concurrent `add`s.
#[derive(Debug, Clone, Default)]
pub struct SharedStatistic {
    inner: Arc<Mutex<Statistic>>,
}

impl SharedStatistic {
    /// Create an empty shared accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn add(&self, value: u64) {
        self.inner.lock().add(value);
    }

    /// Race-free copy of the derived fields.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }
}
