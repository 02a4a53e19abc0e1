//! Per-bus performance counters
//!
//! Updated after every transaction attempt, read by telemetry through
//! [`BusStats::snapshot`]. Best effort: relaxed atomics, no ordering with
//! the bus traffic itself.

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::transfer::TransferResult;

/// Live counters of one bus
#[derive(Debug, Default)]
pub struct BusStats {
    attempted: AtomicU32,
    succeeded: AtomicU32,
    errors: AtomicU32,
    busy_us: AtomicU64,
}

/// Point-in-time copy of [`BusStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsSnapshot {
    /// Transactions started (rejected ones included)
    pub attempted: u32,
    /// Transactions that ended in success
    pub succeeded: u32,
    /// Transactions that ended in anything else, timeouts included
    pub errors: u32,
    /// Cumulative duration of the successful transactions
    pub busy_us: u64,
}

impl BusStats {
    /// Zeroed counters
    pub const fn new() -> Self {
        Self {
            attempted: AtomicU32::new(0),
            succeeded: AtomicU32::new(0),
            errors: AtomicU32::new(0),
            busy_us: AtomicU64::new(0),
        }
    }

    /// Account one finished attempt
    pub fn record(&self, result: TransferResult, elapsed_us: u64) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        if result.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.busy_us.fetch_add(elapsed_us, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the current values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            busy_us: self.busy_us.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.attempted.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.busy_us.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success_and_failure() {
        let stats = BusStats::new();
        stats.record(TransferResult::Done, 120);
        stats.record(TransferResult::Done, 80);
        stats.record(TransferResult::Nack, 500);
        stats.record(TransferResult::InProgress, 50_000);

        let snap = stats.snapshot();
        assert_eq!(snap.attempted, 4);
        assert_eq!(snap.succeeded, 2);
        assert_eq!(snap.errors, 2);
        // Only successful transactions count towards busy time
        assert_eq!(snap.busy_us, 200);
    }

    #[test]
    fn test_reset() {
        let stats = BusStats::new();
        stats.record(TransferResult::ArbLost, 10);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
