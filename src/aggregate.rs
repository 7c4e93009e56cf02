use crate::catalog::Aggregation;
use crate::prelude::*;

use serde::Serialize;
use std::collections::BTreeSet;

// group aggregate {{{
/// Combine the members of a parallel group into one map.
///
/// Absent and `Unknown` member values are skipped. A key every member has
/// as `Unknown` stays `Unknown`; keys the catalog marks `Skip` are dropped.
pub fn group(members: &[&CanonicalSensorMap]) -> CanonicalSensorMap {
    let keys: BTreeSet<&str> = members.iter().flat_map(|m| m.keys()).collect();
    let mut out = CanonicalSensorMap::new();

    for key in keys {
        let rule = catalog::aggregation(key);
        if rule == Aggregation::Skip {
            continue;
        }

        let values: Vec<f64> = members.iter().filter_map(|m| m.value(key)).collect();
        out.insert(key, combine(rule, &values));
    }

    out
}

fn combine(rule: Aggregation, values: &[f64]) -> SensorValue {
    if values.is_empty() {
        return SensorValue::Unknown;
    }

    let value = match rule {
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Max => values.iter().copied().fold(f64::MIN, f64::max),
        Aggregation::Min => values.iter().copied().fold(f64::MAX, f64::min),
        Aggregation::Skip => return SensorValue::Unknown,
    };
    SensorValue::Value(value)
} // }}}

// battery bank {{{
/// One battery module's communication-derived readings.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatteryRecord {
    pub index: u16,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub soc: Option<f64>,
    pub soh: Option<f64>,
    pub cycle_count: Option<f64>,
    pub max_cell_voltage: Option<f64>,
    pub min_cell_voltage: Option<f64>,
    pub max_cell_temperature: Option<f64>,
    pub min_cell_temperature: Option<f64>,
}

impl BatteryRecord {
    pub fn from_map(index: u16, map: &CanonicalSensorMap) -> Self {
        Self {
            index,
            voltage: map.value("battery_voltage"),
            current: map.value("battery_current"),
            soc: map.value("state_of_charge"),
            soh: map.value("state_of_health"),
            cycle_count: map.value("cycle_count"),
            max_cell_voltage: map.value("max_cell_voltage"),
            min_cell_voltage: map.value("min_cell_voltage"),
            max_cell_temperature: map.value("max_cell_temperature"),
            min_cell_temperature: map.value("min_cell_temperature"),
        }
    }

    /// A module the BMS lost contact with reports nothing at all.
    pub fn is_present(&self) -> bool {
        [
            self.voltage,
            self.current,
            self.soc,
            self.soh,
            self.cycle_count,
            self.max_cell_voltage,
            self.min_cell_voltage,
            self.max_cell_temperature,
            self.min_cell_temperature,
        ]
        .iter()
        .any(Option::is_some)
    }

    pub fn cell_voltage_delta(&self) -> Option<f64> {
        Some(self.max_cell_voltage? - self.min_cell_voltage?)
    }
}

pub fn retain_present(records: Vec<BatteryRecord>) -> Vec<BatteryRecord> {
    records
        .into_iter()
        .filter(|record| {
            let present = record.is_present();
            if !present {
                debug!("battery {} reports nothing, excluding", record.index);
            }
            present
        })
        .collect()
}

fn bounds<I: IntoIterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    values.into_iter().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Cross-module diagnostics over the modules that are actually present.
///
/// Each diagnostic is `Unknown` when no present module carries its field.
pub fn bank_diagnostics(records: &[BatteryRecord]) -> CanonicalSensorMap {
    let present: Vec<&BatteryRecord> = records.iter().filter(|r| r.is_present()).collect();
    let mut out = CanonicalSensorMap::new();

    let field = |select: fn(&BatteryRecord) -> Option<f64>| bounds(present.iter().filter_map(|r| select(r)));
    let spread = |b: Option<(f64, f64)>, decimals| b.map(|(lo, hi)| codec::round(hi - lo, decimals));

    let voltage = field(|r| r.voltage);
    let soc = field(|r| r.soc);

    out.insert("bank_present_count", present.len() as f64);
    out.insert("bank_voltage_spread", spread(voltage, 2));
    out.insert("bank_soh_spread", spread(field(|r| r.soh), 1));
    out.insert("bank_cycle_count_spread", spread(field(|r| r.cycle_count), 0));
    out.insert(
        "bank_cell_voltage_delta_spread",
        spread(field(BatteryRecord::cell_voltage_delta), 3),
    );
    out.insert(
        "bank_highest_cell_temperature",
        field(|r| r.max_cell_temperature).map(|(_, hi)| hi),
    );
    out.insert("bank_min_battery_voltage", voltage.map(|(lo, _)| lo));
    out.insert("bank_max_battery_voltage", voltage.map(|(_, hi)| hi));
    out.insert("bank_min_soc", soc.map(|(lo, _)| lo));
    out.insert("bank_max_soc", soc.map(|(_, hi)| hi));

    out
} // }}}
