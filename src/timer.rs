//! Countdown authority
//!
//! Remaining time is always derived from an absolute end timestamp, so any
//! client (including one that just reconnected) computes the same value
//! without accumulating drift.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Source of "now" for the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and dry runs.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// End timestamp for an activation at `now`; `None` for unlimited questions
pub fn end_time_for(now: DateTime<Utc>, timer_seconds: Option<u32>) -> Option<DateTime<Utc>> {
    timer_seconds.map(|secs| now + Duration::seconds(i64::from(secs)))
}

/// `ceil((end - now) / 1s)`, never negative
pub fn remaining_seconds(end_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (end_time - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}

/// Whether the countdown for `end_time` has run out at `now`
pub fn is_expired(end_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    remaining_seconds(end_time, now) == 0
}

/// Countdown as pushed to clients on every heartbeat and reconnect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub end_time: DateTime<Utc>,
    pub server_now: DateTime<Utc>,
    pub remaining_seconds: u64,
}

impl Countdown {
    pub fn at(end_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            end_time,
            server_now: now,
            remaining_seconds: remaining_seconds(end_time, now),
        }
    }
}
