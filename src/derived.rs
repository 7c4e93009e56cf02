//! Metrics computed from already-canonical keys.
//!
//! Sign conventions follow [`crate::catalog`]: unit `battery_power` and
//! `bank_power` are charge − discharge, group `battery_net_power` is
//! discharge − charge, every `grid_power` is import − export.

use crate::port::{LOAD_PORTS, SOURCE_PORTS};
use crate::prelude::*;

/// `source + discharge + import − charge − export`, floored at zero.
///
/// Absent inputs count as zero; the result is `Unknown` only when every
/// input is absent.
pub fn energy_balance(
    source: Option<f64>,
    discharge: Option<f64>,
    import: Option<f64>,
    charge: Option<f64>,
    export: Option<f64>,
) -> SensorValue {
    let inputs = [source, discharge, import, charge, export];
    if inputs.iter().all(Option::is_none) {
        return SensorValue::Unknown;
    }

    let v = |x: Option<f64>| x.unwrap_or(0.0);
    let balance = v(source) + v(discharge) + v(import) - v(charge) - v(export);
    SensorValue::Value(balance.max(0.0))
}

/// Split `total` across two legs in proportion to their voltages. `None`
/// when there is no voltage to split by.
pub fn split_by_ratio(total: f64, v1: Option<f64>, v2: Option<f64>) -> Option<(f64, f64)> {
    let v1 = v1.unwrap_or(0.0);
    let v2 = v2.unwrap_or(0.0);
    let sum = v1 + v2;
    if sum <= 0.0 {
        return None;
    }
    Some((total * v1 / sum, total * v2 / sum))
}

/// `a − b`, treating one missing side as zero.
pub fn difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        _ => Some(a.unwrap_or(0.0) - b.unwrap_or(0.0)),
    }
}

/// Sum of the present values; `None` when nothing is present.
pub fn sum<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn insert_some(map: &mut CanonicalSensorMap, key: &str, value: Option<f64>) {
    if let Some(v) = value {
        map.insert(key, v);
    }
}

fn insert_if_absent(map: &mut CanonicalSensorMap, key: &str, value: Option<f64>) {
    if map.value(key).is_none() {
        insert_some(map, key, value);
    }
}

pub fn inverter_runtime(map: &mut CanonicalSensorMap) {
    let pv = sum(["pv1_power", "pv2_power", "pv3_power"].map(|k| map.value(k)));
    let charge = map.value("battery_charge_power");
    let discharge = map.value("battery_discharge_power");
    let import = map.value("grid_import_power");
    let export = map.value("grid_export_power");

    insert_some(map, "pv_total_power", pv);
    insert_some(map, "battery_power", difference(charge, discharge));
    insert_some(map, "grid_power", difference(import, export));
    map.insert(
        "consumption_power",
        energy_balance(pv, discharge, import, charge, export),
    );
}

/// Yield and consumption energies. Values a source reported directly win
/// over the computed ones.
pub fn inverter_energy(map: &mut CanonicalSensorMap) {
    let yield_today = sum(
        ["pv1_energy_today", "pv2_energy_today", "pv3_energy_today"].map(|k| map.value(k)),
    );
    let yield_total = sum(
        ["pv1_energy_total", "pv2_energy_total", "pv3_energy_total"].map(|k| map.value(k)),
    );
    insert_if_absent(map, "yield_today", yield_today.map(|v| codec::round(v, 1)));
    insert_if_absent(map, "yield_total", yield_total.map(|v| codec::round(v, 1)));

    for period in ["today", "total"] {
        let consumption_key = format!("consumption_{}", period);
        if map.value(&consumption_key).is_some() {
            continue;
        }

        let balance = energy_balance(
            map.value(&format!("yield_{}", period)),
            map.value(&format!("discharge_energy_{}", period)),
            map.value(&format!("grid_import_{}", period)),
            map.value(&format!("charge_energy_{}", period)),
            map.value(&format!("grid_export_{}", period)),
        );
        if let SensorValue::Value(v) = balance {
            map.insert(consumption_key, codec::round(v, 1));
        }
    }
}

pub fn battery(map: &mut CanonicalSensorMap) {
    if let (Some(max), Some(min)) = (map.value("max_cell_voltage"), map.value("min_cell_voltage")) {
        map.insert("cell_voltage_delta", codec::round(max - min, 3));
    }
    if let (Some(max), Some(min)) = (
        map.value("max_cell_temperature"),
        map.value("min_cell_temperature"),
    ) {
        map.insert("cell_temperature_delta", codec::round(max - min, 1));
    }
}

pub fn battery_bank(map: &mut CanonicalSensorMap) {
    let power = difference(
        map.value("bank_charge_power"),
        map.value("bank_discharge_power"),
    );
    insert_some(map, "bank_power", power);
}

fn legs(map: &CanonicalSensorMap, prefix: &str) -> Option<f64> {
    sum([
        map.value(&format!("{}_l1", prefix)),
        map.value(&format!("{}_l2", prefix)),
    ])
}

pub fn grid_controller(map: &mut CanonicalSensorMap) {
    for keys in LOAD_PORTS.iter().chain(SOURCE_PORTS.iter()) {
        let power = sum([map.value(keys.power_l1), map.value(keys.power_l2)]);
        insert_if_absent(map, keys.power, power);
    }

    // the cloud only reports the UPS total
    if map.value("ups_power_l1").is_none() && map.value("ups_power_l2").is_none() {
        if let Some(total) = map.value("ups_power") {
            let split = split_by_ratio(
                total,
                map.value("ups_voltage_l1"),
                map.value("ups_voltage_l2"),
            );
            match split {
                Some((l1, l2)) => {
                    map.insert("ups_power_l1", codec::round(l1, 1));
                    map.insert("ups_power_l2", codec::round(l2, 1));
                }
                None => {
                    map.set_unknown("ups_power_l1");
                    map.set_unknown("ups_power_l2");
                }
            }
        }
    }

    for prefix in ["grid_power", "ups_power", "load_power", "generator_power"] {
        let total = legs(map, prefix);
        insert_if_absent(map, prefix, total);
    }

    // positive grid power is import
    if let Some(grid) = map.value("grid_power") {
        map.insert("grid_import_power", grid.max(0.0));
        map.insert("grid_export_power", (-grid).max(0.0));
    }
}

/// Group-level flows, computed from the aggregated member maps.
pub fn group(map: &mut CanonicalSensorMap) {
    let pv = map.value("pv_total_power");
    let charge = map.value("battery_charge_power");
    let discharge = map.value("battery_discharge_power");
    let import = map.value("grid_import_power");
    let export = map.value("grid_export_power");

    insert_some(map, "battery_net_power", difference(discharge, charge));
    insert_some(map, "grid_power", difference(import, export));
    map.insert(
        "consumption_power",
        energy_balance(pv, discharge, import, charge, export),
    );
}
