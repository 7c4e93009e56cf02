use crate::port::{PortKeys, PortMode, PortState, LOAD_PORTS, SOURCE_PORTS};
use crate::prelude::*;

pub const SMART_LOAD_POWER: &str = "smart_load_power";
pub const SMART_LOAD_ENERGY_TODAY: &str = "smart_load_energy_today";
pub const AC_COUPLE_POWER: &str = "ac_couple_power";
pub const AC_COUPLE_ENERGY_TODAY: &str = "ac_couple_energy_today";
pub const SMART_LOAD_ENERGY_TOTAL: &str = "smart_load_energy_total";
pub const AC_COUPLE_ENERGY_TOTAL: &str = "ac_couple_energy_total";

/// Keys a family's per-port readings are summed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FamilyTotals {
    pub power: &'static str,
    pub energy_today: &'static str,
    pub energy_total: &'static str,
}

impl FamilyTotals {
    fn all(&self) -> [&'static str; 3] {
        [self.power, self.energy_today, self.energy_total]
    }
}

pub static SMART_LOAD_TOTALS: FamilyTotals = FamilyTotals {
    power: SMART_LOAD_POWER,
    energy_today: SMART_LOAD_ENERGY_TODAY,
    energy_total: SMART_LOAD_ENERGY_TOTAL,
};

pub static AC_COUPLE_TOTALS: FamilyTotals = FamilyTotals {
    power: AC_COUPLE_POWER,
    energy_today: AC_COUPLE_ENERGY_TODAY,
    energy_total: AC_COUPLE_ENERGY_TOTAL,
};

/// Shape the per-port keys of a grid controller map to the configured port
/// modes, then recompute the per-family totals.
///
/// A port in the wrong family is reported as `Unknown` rather than `0.0`, so
/// a smart load port never shows up as an AC-coupled source producing nothing.
pub fn filter(map: &mut CanonicalSensorMap, ports: &PortState) {
    for (i, mode) in ports.modes().into_iter().enumerate() {
        let load = &LOAD_PORTS[i];
        let source = &SOURCE_PORTS[i];

        match mode {
            PortMode::Unused => {
                for key in load.all().into_iter().chain(source.all()) {
                    map.remove(key);
                }
            }
            PortMode::Load => {
                keep_family(map, load, None);
                mark_unknown(map, source);
            }
            PortMode::Source => {
                // firmware reports an AC-coupled port's readings in the load
                // family registers
                keep_family(map, source, Some(load));
                mark_unknown(map, load);
            }
        }
    }

    totals(map, ports, PortMode::Load, &SMART_LOAD_TOTALS);
    totals(map, ports, PortMode::Source, &AC_COUPLE_TOTALS);
}

fn keep_family(map: &mut CanonicalSensorMap, keys: &PortKeys, mirror: Option<&PortKeys>) {
    let mirrored = |map: &CanonicalSensorMap, i: usize| {
        mirror.and_then(|m| {
            let key = m.all()[i];
            map.value(key)
        })
    };

    for (i, key) in keys.all().into_iter().enumerate() {
        let value = map.value(key).or_else(|| mirrored(map, i));
        match value {
            Some(v) => map.insert(key, v),
            // power reads as flow; an unread energy counter stays unreported
            None if keys.power_keys().contains(&key) => map.insert(key, 0.0),
            None => {}
        }
    }
}

fn mark_unknown(map: &mut CanonicalSensorMap, keys: &PortKeys) {
    for key in keys.all() {
        map.set_unknown(key);
    }
}

fn totals(map: &mut CanonicalSensorMap, ports: &PortState, mode: PortMode, sums: &FamilyTotals) {
    let family = match mode {
        PortMode::Load => &LOAD_PORTS,
        PortMode::Source => &SOURCE_PORTS,
        PortMode::Unused => return,
    };

    if ports.count(mode) == 0 {
        for key in sums.all() {
            map.set_unknown(key);
        }
        return;
    }

    let contributors: Vec<&PortKeys> = ports
        .modes()
        .into_iter()
        .zip(family.iter())
        .filter(|(m, _)| *m == mode)
        .map(|(_, keys)| keys)
        .collect();

    let sum_of = |select: fn(&PortKeys) -> &'static str| -> Option<f64> {
        let values: Vec<f64> = contributors
            .iter()
            .filter_map(|keys| map.value(select(keys)))
            .collect();
        (!values.is_empty()).then(|| values.iter().sum())
    };

    let power = sum_of(|keys| keys.power);
    let energy_today = sum_of(|keys| keys.energy_today);
    let energy_total = sum_of(|keys| keys.energy_total);
    map.insert(sums.power, power);
    map.insert(sums.energy_today, energy_today);
    map.insert(sums.energy_total, energy_total);
}
