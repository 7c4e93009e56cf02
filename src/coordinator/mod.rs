use crate::prelude::*;
use crate::snapshot;
use crate::state_cache::StateCache;

pub mod pipeline;

pub use pipeline::{
    finish_group, process_device, process_group, DevicePoll, DeviceResult, GroupPoll, PollOutcome,
};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Which sources a group is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    LocalOnly,
    CloudOnly,
    Hybrid,
}

impl DeploymentMode {
    pub fn uses(&self, source: Source) -> bool {
        match (self, source) {
            (Self::Hybrid, _) => true,
            (Self::LocalOnly, Source::RegisterTransport) => true,
            (Self::CloudOnly, Source::CloudApi) => true,
            _ => false,
        }
    }

    pub fn uses_registers(&self) -> bool {
        self.uses(Source::RegisterTransport)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Inverter,
    GridController,
}

#[derive(Debug, Default)]
pub struct PollStats {
    polls: u64,
    devices_reported: u64,
    failed_reads: u64,
    canary_rejections: u64,
    monotonic_rejections: u64,
}

impl PollStats {
    pub fn record(&mut self, outcome: &PollOutcome, members: usize) {
        self.polls += 1;
        self.devices_reported += outcome.devices.len() as u64;
        self.failed_reads += members.saturating_sub(outcome.devices.len()) as u64;
        for event in &outcome.events {
            match event.reason {
                RejectionReason::CanaryViolation => self.canary_rejections += 1,
                RejectionReason::MonotonicityViolation => self.monotonic_rejections += 1,
            }
        }
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn failed_reads(&self) -> u64 {
        self.failed_reads
    }

    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Group polls: {}", self.polls);
        info!("  Device maps emitted: {}", self.devices_reported);
        info!("  Failed device reads: {}", self.failed_reads);
        info!("  Validation:");
        info!("    Canary rejections: {}", self.canary_rejections);
        info!("    Monotonic rejections: {}", self.monotonic_rejections);
    }
}

#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    cache: StateCache,
    pub stats: Arc<Mutex<PollStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper) -> Self {
        Self {
            config,
            cache: StateCache::new(),
            stats: Arc::new(Mutex::new(PollStats::default())),
        }
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Make the validation state registry follow the configured device set.
    pub fn sync_states(&self) {
        let groups = self.config.enabled_groups();
        let devices = self.config.enabled_device_ids();

        for id in &devices {
            self.cache.add(id);
        }

        self.cache.retain(|id| {
            devices.iter().any(|d| {
                id == d.as_str()
                    || id
                        .strip_prefix(d.as_str())
                        .is_some_and(|rest| rest.starts_with("-battery"))
            }) || groups
                .iter()
                .any(|g| {
                    id == pipeline::group_state_id(g.name())
                        || id == pipeline::overlay_state_id(g.name())
                })
        });
    }

    /// Read and process every enabled group once.
    pub async fn poll(&self) -> Result<Vec<PollOutcome>> {
        let mut outcomes = Vec::new();
        for group in self.config.enabled_groups() {
            outcomes.push(self.poll_group(&group).await?);
        }
        Ok(outcomes)
    }

    /// Members are read and mapped in parallel; group stages start once all
    /// of them are back.
    pub async fn poll_group(&self, group: &config::Group) -> Result<PollOutcome> {
        let mode = group.mode();
        let validation = self.config.validation().for_mode(mode);
        let devices = group.enabled_devices();
        let members = devices.len();

        let handles = devices.into_iter().map(|device| {
            let cache = self.cache.clone();
            tokio::task::spawn_blocking(move || {
                let raw = snapshot::load_device(&device);
                let poll = DevicePoll::new(device.id(), device.kind(), raw);
                process_device(&cache, mode, validation, &poll)
            })
        });

        let mut results = Vec::with_capacity(members);
        for joined in futures::future::join_all(handles).await {
            results.push(joined.map_err(|err| anyhow!("device task failed: {}", err))?);
        }

        let outcome = finish_group(
            &self.cache,
            group.name(),
            group.primary(),
            validation,
            results,
        );

        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&outcome, members);

        Ok(outcome)
    }
}
