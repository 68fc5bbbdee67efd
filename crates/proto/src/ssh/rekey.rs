//! Rekey scheduling (RFC 4253 Section 9).
//!
//! Keys are refreshed after a volume of data or a span of time, whichever
//! comes first. The controller only tracks usage; the session runs the key
//! exchange and calls [`RekeyController::reset`] once new keys are in place.

use std::time::{Duration, Instant};

/// Default byte limit: 1 GiB.
pub const DEFAULT_REKEY_BYTES: u64 = 1 << 30;

/// Default time limit: 1 hour.
pub const DEFAULT_REKEY_TIME: Duration = Duration::from_secs(3600);

/// Limits after which a rekey is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RekeyThresholds {
    /// Bytes sent and received under one set of keys
    pub bytes: u64,
    /// Time one set of keys stays in use
    pub time: Duration,
}

impl Default for RekeyThresholds {
    fn default() -> Self {
        Self {
            bytes: DEFAULT_REKEY_BYTES,
            time: DEFAULT_REKEY_TIME,
        }
    }
}

/// Why a rekey is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekeyReason {
    /// Byte limit reached
    Bytes,
    /// Time limit reached
    Time,
}

impl RekeyReason {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RekeyReason::Bytes => "bytes",
            RekeyReason::Time => "time",
        }
    }
}

/// Tracks usage of the current keys.
#[derive(Debug, Clone)]
pub struct RekeyController {
    thresholds: RekeyThresholds,
    bytes: u64,
    since: Instant,
}

impl RekeyController {
    /// Starts tracking at `now`.
    pub fn new(thresholds: RekeyThresholds, now: Instant) -> Self {
        Self {
            thresholds,
            bytes: 0,
            since: now,
        }
    }

    /// Adds transferred bytes.
    pub fn record(&mut self, bytes: usize) {
        self.bytes = self.bytes.saturating_add(bytes as u64);
    }

    /// Bytes transferred under the current keys.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Time the current keys have been in use.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.since)
    }

    /// Returns the reason a rekey is due, if any.
    pub fn needs_rekey(&self, now: Instant) -> Option<RekeyReason> {
        if self.bytes >= self.thresholds.bytes {
            Some(RekeyReason::Bytes)
        } else if self.elapsed(now) >= self.thresholds.time {
            Some(RekeyReason::Time)
        } else {
            None
        }
    }

    /// Restarts tracking after a completed key exchange.
    pub fn reset(&mut self, now: Instant) {
        self.bytes = 0;
        self.since = now;
    }
}
