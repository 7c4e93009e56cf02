//! Captured transport payloads, replayed from disk.
//!
//! A register snapshot holds translated-data frames (start register plus the
//! little-endian payload bytes) and/or explicit register words:
//!
//! ```json
//! { "frames": [ { "register": 0, "values": [ 16, 0, 37, 9 ] } ],
//!   "registers": { "34": 6 },
//!   "batteries": [ { "registers": { "0": 5321, "2": 19250 } } ] }
//! ```
//!
//! A cloud snapshot holds the API objects as returned: `runtime`, `energy`
//! and `battery` (with its `batteryArray`) for an inverter, `midboxData` for
//! a grid controller.

use crate::prelude::*;

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
struct Frame {
    register: u16,
    values: Vec<u8>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RegisterSection {
    #[serde(default)]
    frames: Vec<Frame>,
    #[serde(default)]
    registers: BTreeMap<u16, u16>,
}

impl RegisterSection {
    /// Frames first, then explicit words; later entries win.
    fn block(&self) -> Result<RegisterBlock> {
        let mut block = RegisterBlock::new();
        for frame in &self.frames {
            block.extend_from_frame(frame.register, &frame.values)?;
        }
        for (register, value) in &self.registers {
            block.insert(*register, *value);
        }
        Ok(block)
    }

    fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.registers.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RegisterSnapshot {
    #[serde(default)]
    frames: Vec<Frame>,
    #[serde(default)]
    registers: BTreeMap<u16, u16>,
    #[serde(default)]
    batteries: Vec<RegisterSection>,
}

pub fn parse_registers(content: &str, kind: DeviceKind) -> Result<Vec<RawFieldSet>> {
    let snapshot: RegisterSnapshot = serde_json::from_str(content)?;
    let main = RegisterSection {
        frames: snapshot.frames,
        registers: snapshot.registers,
    };
    let mut sets = Vec::new();

    if !main.is_empty() {
        let block = main.block()?;
        match kind {
            DeviceKind::Inverter => {
                for class in [
                    DeviceClass::InverterRuntime,
                    DeviceClass::InverterEnergy,
                    DeviceClass::BatteryBank,
                ] {
                    sets.push(RawFieldSet::registers(class, block.clone()));
                }
            }
            DeviceKind::GridController => {
                sets.push(RawFieldSet::registers(DeviceClass::GridController, block));
            }
        }
    }

    if kind == DeviceKind::Inverter {
        for (index, section) in snapshot.batteries.iter().enumerate() {
            let block = section.block()?;
            let unit = u16::try_from(index)?;
            sets.push(RawFieldSet::registers(DeviceClass::Battery, block).with_unit(unit));
        }
    }

    Ok(sets)
}

/// `batIndex` as a module number, when it is one.
fn module_index(value: f64) -> Option<u16> {
    if value.fract() != 0.0 {
        return None;
    }
    u16::try_from(value as i64).ok()
}

fn object(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value {
        Some(Value::Object(object)) => Some(object.clone()),
        _ => None,
    }
}

pub fn parse_cloud(content: &str, kind: DeviceKind) -> Result<Vec<RawFieldSet>> {
    let root: Value = serde_json::from_str(content)?;
    let Value::Object(root) = root else {
        bail!("cloud snapshot is not a JSON object");
    };

    let mut sets = Vec::new();
    match kind {
        DeviceKind::Inverter => {
            if let Some(runtime) = object(root.get("runtime")) {
                sets.push(RawFieldSet::cloud(DeviceClass::InverterRuntime, runtime));
            }
            if let Some(energy) = object(root.get("energy")) {
                sets.push(RawFieldSet::cloud(DeviceClass::InverterEnergy, energy));
            }
            if let Some(mut battery) = object(root.get("battery")) {
                let modules = match battery.remove("batteryArray") {
                    Some(Value::Array(modules)) => modules,
                    _ => Vec::new(),
                };
                sets.push(RawFieldSet::cloud(DeviceClass::BatteryBank, battery));

                for (position, module) in modules.into_iter().enumerate() {
                    let Value::Object(module) = module else {
                        warn!("batteryArray[{}] is not an object, skipping", position);
                        continue;
                    };
                    let index = module.get("batIndex").and_then(crate::mapper::cloud::numeric);
                    let unit = match index.map(|i| (i, module_index(i))) {
                        Some((_, Some(unit))) => unit,
                        Some((index, None)) => {
                            warn!(
                                "batteryArray[{}] has batIndex {}, using its position",
                                position, index
                            );
                            u16::try_from(position)?
                        }
                        None => u16::try_from(position)?,
                    };
                    sets.push(RawFieldSet::cloud(DeviceClass::Battery, module).with_unit(unit));
                }
            }
        }
        DeviceKind::GridController => {
            if let Some(midbox) = object(root.get("midboxData")) {
                sets.push(RawFieldSet::cloud(DeviceClass::GridController, midbox));
            }
        }
    }

    Ok(sets)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|err| crate::file_error_with_source!(err, "error reading {}", path.display()))
}

pub fn load_registers(path: &Path, kind: DeviceKind) -> Result<Vec<RawFieldSet>> {
    parse_registers(&read(path)?, kind)
        .map_err(|err| crate::file_error_with_source!(err, "bad register snapshot {}", path.display()))
}

pub fn load_cloud(path: &Path, kind: DeviceKind) -> Result<Vec<RawFieldSet>> {
    parse_cloud(&read(path)?, kind)
        .map_err(|err| crate::file_error_with_source!(err, "bad cloud snapshot {}", path.display()))
}

/// Everything available for one device this poll. A source whose snapshot
/// cannot be read is left out; an empty result is a failed read.
pub fn load_device(device: &config::Device) -> Vec<RawFieldSet> {
    let mut sets = Vec::new();

    if let Some(path) = device.registers() {
        match load_registers(Path::new(path), device.kind()) {
            Ok(mut found) => sets.append(&mut found),
            Err(err) => warn!("{}: register snapshot unavailable: {}", device.id(), err),
        }
    }

    if let Some(path) = device.cloud() {
        match load_cloud(Path::new(path), device.kind()) {
            Ok(mut found) => sets.append(&mut found),
            Err(err) => warn!("{}: cloud snapshot unavailable: {}", device.id(), err),
        }
    }

    sets
}
