//! One poll, one group: raw field sets in, validated canonical maps out.
//!
//! [`process_device`] runs independently per member and only touches that
//! member's validation state, so members can be processed in parallel.
//! [`finish_group`] runs once every member of the poll has been processed.

use crate::aggregate::{self, BatteryRecord};
use crate::coordinator::{DeploymentMode, DeviceKind};
use crate::mapper::{self, MappedFields, CROSS_CHECK_TOLERANCE};
use crate::overlay::{self, OVERLAY_TABLE};
use crate::port::{filter, PortState};
use crate::prelude::*;
use crate::state_cache::StateCache;
use crate::derived;
use crate::validator::{canary, monotonic, ValidationConfig};

use serde::Serialize;
use std::collections::BTreeMap;

/// Raw data for one member this poll. An empty `raw` means the read failed.
#[derive(Clone, Debug, PartialEq)]
pub struct DevicePoll {
    pub device_id: String,
    pub kind: DeviceKind,
    pub raw: Vec<RawFieldSet>,
}

impl DevicePoll {
    pub fn new(device_id: &str, kind: DeviceKind, raw: Vec<RawFieldSet>) -> Self {
        Self {
            device_id: device_id.to_string(),
            kind,
            raw,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupPoll {
    pub group_id: String,
    pub mode: DeploymentMode,
    pub primary: Option<String>,
    pub members: Vec<DevicePoll>,
}

/// What one member produced this poll.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceResult {
    pub device_id: String,
    pub kind: Option<DeviceKind>,
    /// `None` when the member contributed nothing this poll.
    pub map: Option<CanonicalSensorMap>,
    pub batteries: Vec<(String, CanonicalSensorMap)>,
    pub events: Vec<ValidationEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PollOutcome {
    pub group_id: String,
    pub devices: BTreeMap<String, CanonicalSensorMap>,
    pub batteries: BTreeMap<String, CanonicalSensorMap>,
    pub group: Option<CanonicalSensorMap>,
    pub events: Vec<ValidationEvent>,
}

pub fn battery_id(device_id: &str, index: u16) -> String {
    format!("{}-battery{}", device_id, index)
}

pub fn group_state_id(group_id: &str) -> String {
    format!("group:{}", group_id)
}

/// State for the group counters taken from the grid controller.
pub fn overlay_state_id(group_id: &str) -> String {
    format!("group:{}:overlay", group_id)
}

/// Map one class's raw sets from every source, screen each with the canary
/// layer, then merge with register values winning over cloud values.
fn map_sources(
    id: &str,
    sets: &[&RawFieldSet],
    cache: &StateCache,
    validation: ValidationConfig,
    events: &mut Vec<ValidationEvent>,
) -> Option<CanonicalSensorMap> {
    if sets.is_empty() {
        return None;
    }

    let mut by_source: BTreeMap<Source, CanonicalSensorMap> = BTreeMap::new();
    for raw in sets {
        let MappedFields { mut map, canaries } = mapper::map(raw);
        if validation.canary {
            cache.with(id, |state| {
                canary::screen(id, &mut map, &canaries, state, events)
            });
        }
        by_source.entry(raw.source).or_default().extend(map);
    }

    let register = by_source.remove(&Source::RegisterTransport);
    let cloud = by_source.remove(&Source::CloudApi);

    match (register, cloud) {
        (Some(mut register), Some(cloud)) => {
            for d in mapper::cross_check(&register, &cloud, CROSS_CHECK_TOLERANCE) {
                debug!(
                    "{}: {} differs between registers ({}) and cloud ({})",
                    id, d.key, d.register, d.cloud
                );
            }
            register.fill_from(&cloud);
            Some(register)
        }
        (Some(map), None) | (None, Some(map)) => Some(map),
        (None, None) => None,
    }
}

pub fn process_device(
    cache: &StateCache,
    mode: DeploymentMode,
    validation: ValidationConfig,
    poll: &DevicePoll,
) -> DeviceResult {
    let id = poll.device_id.as_str();
    let mut result = DeviceResult {
        device_id: id.to_string(),
        kind: Some(poll.kind),
        ..Default::default()
    };

    if poll.raw.is_empty() {
        warn!("{}: no data this poll", id);
        return result;
    }

    let usable: Vec<&RawFieldSet> = poll.raw.iter().filter(|raw| mode.uses(raw.source)).collect();
    if usable.is_empty() {
        warn!("{}: nothing usable in {:?} mode", id, mode);
        return result;
    }

    let (modules, device_sets): (Vec<&RawFieldSet>, Vec<&RawFieldSet>) = usable
        .into_iter()
        .partition(|raw| raw.class == DeviceClass::Battery);

    let mut map = CanonicalSensorMap::new();
    for class in [
        DeviceClass::InverterRuntime,
        DeviceClass::InverterEnergy,
        DeviceClass::BatteryBank,
        DeviceClass::GridController,
    ] {
        let sets: Vec<&RawFieldSet> = device_sets.iter().copied().filter(|r| r.class == class).collect();
        if let Some(mapped) = map_sources(id, &sets, cache, validation, &mut result.events) {
            map.extend(mapped);
        }
    }

    match poll.kind {
        DeviceKind::Inverter => {
            derived::inverter_runtime(&mut map);
            derived::inverter_energy(&mut map);
            derived::battery_bank(&mut map);
        }
        DeviceKind::GridController => {
            derived::grid_controller(&mut map);
            match PortState::from_map(&map) {
                Some(ports) => filter::filter(&mut map, &ports),
                None => debug!("{}: no smart port status this poll", id),
            }
        }
    }

    if !modules.is_empty() {
        let records = process_batteries(id, &modules, cache, validation, &mut result);
        map.extend(aggregate::bank_diagnostics(&records));
    }

    if validation.monotonic {
        cache.with(id, |state| {
            monotonic::enforce(id, &mut map, state, &mut result.events)
        });
    }

    result.map = Some(map);
    result
}

/// Per-module maps for the modules that are present; ghosts are dropped
/// before anything is emitted or aggregated.
fn process_batteries(
    device_id: &str,
    modules: &[&RawFieldSet],
    cache: &StateCache,
    validation: ValidationConfig,
    result: &mut DeviceResult,
) -> Vec<BatteryRecord> {
    let mut by_index: BTreeMap<u16, Vec<&RawFieldSet>> = BTreeMap::new();
    for (position, raw) in modules.iter().enumerate() {
        let index = raw
            .unit
            .unwrap_or_else(|| u16::try_from(position).unwrap_or(u16::MAX));
        by_index.entry(index).or_default().push(*raw);
    }

    let mut records = Vec::new();
    for (index, sets) in by_index {
        let id = battery_id(device_id, index);
        let Some(mut map) = map_sources(&id, &sets, cache, validation, &mut result.events) else {
            continue;
        };
        derived::battery(&mut map);

        let record = BatteryRecord::from_map(index, &map);
        let present = record.is_present();
        records.push(record);
        if !present {
            continue;
        }

        if validation.monotonic {
            cache.with(&id, |state| {
                monotonic::enforce(&id, &mut map, state, &mut result.events)
            });
        }
        result.batteries.push((id, map));
    }

    aggregate::retain_present(records)
}

/// Group stages: aggregate the inverters, derive group flows, overlay the
/// grid controller (or fall back to the primary), then hold lifetime
/// counters steady.
pub fn finish_group(
    cache: &StateCache,
    group_id: &str,
    primary: Option<&str>,
    validation: ValidationConfig,
    results: Vec<DeviceResult>,
) -> PollOutcome {
    let mut outcome = PollOutcome {
        group_id: group_id.to_string(),
        ..Default::default()
    };
    let mut group_events = Vec::new();

    let inverters: Vec<(&str, &CanonicalSensorMap)> = results
        .iter()
        .filter(|r| r.kind == Some(DeviceKind::Inverter))
        .filter_map(|r| r.map.as_ref().map(|m| (r.device_id.as_str(), m)))
        .collect();
    let controller = results
        .iter()
        .filter(|r| r.kind == Some(DeviceKind::GridController))
        .find_map(|r| r.map.as_ref());

    if inverters.is_empty() && controller.is_none() {
        warn!("group {}: no member reported this poll", group_id);
    } else {
        let maps: Vec<&CanonicalSensorMap> = inverters.iter().map(|(_, m)| *m).collect();
        let mut group = aggregate::group(&maps);
        derived::group(&mut group);

        let fallback = primary
            .and_then(|p| inverters.iter().find(|(id, _)| *id == p))
            .or_else(|| inverters.first())
            .map(|(_, m)| *m);
        let overlaid_keys = overlay::reconcile(&mut group, controller, &OVERLAY_TABLE, fallback);

        if validation.monotonic {
            // controller readings are held against their own history
            let mut overlaid = CanonicalSensorMap::new();
            for key in overlaid_keys {
                if let Some(value) = group.remove(key) {
                    overlaid.insert(key, value);
                }
            }

            let histories = [
                (group_state_id(group_id), &mut group),
                (overlay_state_id(group_id), &mut overlaid),
            ];
            for (state_id, map) in histories {
                if map.is_empty() {
                    continue;
                }
                cache.with(&state_id, |state| {
                    monotonic::enforce(&state_id, map, state, &mut group_events)
                });
            }
            group.extend(overlaid);
        }
        outcome.group = Some(group);
    }

    for result in results {
        outcome.events.extend(result.events);
        outcome.batteries.extend(result.batteries);
        if let Some(map) = result.map {
            outcome.devices.insert(result.device_id, map);
        }
    }
    outcome.events.append(&mut group_events);

    outcome
}

/// Process a whole group on the calling thread.
pub fn process_group(
    cache: &StateCache,
    poll: &GroupPoll,
    validation: ValidationConfig,
) -> PollOutcome {
    let results = poll
        .members
        .iter()
        .map(|member| process_device(cache, poll.mode, validation, member))
        .collect();
    finish_group(
        cache,
        &poll.group_id,
        poll.primary.as_deref(),
        validation,
        results,
    )
}
