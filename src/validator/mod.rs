//! Two-layer plausibility checks.
//!
//! Layer 1 ([`canary`]) runs on freshly mapped single-source fields and drops
//! physically impossible readings before they are stored. Layer 2
//! ([`monotonic`]) runs on the final merged or aggregated map and holds
//! lifetime counters steady when a poll reports a smaller value.
//!
//! A rejected field keeps the last accepted value; every rejection is returned
//! as a [`ValidationEvent`] for the caller to publish.

use serde::Serialize;
use std::collections::HashMap;

pub mod canary;
pub mod monotonic;

pub use canary::Canary;

/// Last accepted value per field, for one device (or one battery module, or
/// one group). Owned by [`crate::state_cache::StateCache`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationState {
    pub canary: HashMap<String, f64>,
    pub monotonic: HashMap<String, f64>,
}

impl ValidationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_canary(&self, key: &str) -> Option<f64> {
        self.canary.get(key).copied()
    }

    pub fn last_monotonic(&self, key: &str) -> Option<f64> {
        self.monotonic.get(key).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    CanaryViolation,
    MonotonicityViolation,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationEvent {
    pub device_id: String,
    pub field: String,
    pub reason: RejectionReason,
    pub rejected_value: f64,
    pub retained_value: Option<f64>,
}

/// Which layers run for one group this poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationConfig {
    pub canary: bool,
    pub monotonic: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            canary: true,
            monotonic: true,
        }
    }
}
