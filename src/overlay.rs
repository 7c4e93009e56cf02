use crate::derived;
use crate::prelude::*;

/// Copy `from` in the source map over `to` in the group map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayEntry {
    pub from: &'static str,
    pub to: &'static str,
}

/// `key` = sum of `parts`, all taken from the authoritative map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combination {
    pub key: &'static str,
    pub parts: &'static [&'static str],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayTable {
    pub entries: &'static [OverlayEntry],
    pub combinations: &'static [Combination],
    /// Copied from the group's primary member when there is no
    /// authoritative map this poll.
    pub fallback: &'static [OverlayEntry],
}

const fn e(from: &'static str, to: &'static str) -> OverlayEntry {
    OverlayEntry { from, to }
}

/// The grid controller measures at the service entrance, so its readings
/// replace the inverter-summed ones for the whole group.
pub static OVERLAY_TABLE: OverlayTable = OverlayTable {
    entries: &[
        e("grid_voltage_l1", "grid_voltage_l1"),
        e("grid_voltage_l2", "grid_voltage_l2"),
        e("grid_frequency", "grid_frequency"),
        e("grid_import_power", "grid_import_power"),
        e("grid_export_power", "grid_export_power"),
        e("grid_import_today", "grid_import_today"),
        e("grid_export_today", "grid_export_today"),
        e("grid_import_total", "grid_import_total"),
        e("grid_export_total", "grid_export_total"),
        e("smart_load_power", "smart_load_power"),
        e("ac_couple_power", "ac_couple_power"),
    ],
    combinations: &[
        Combination {
            key: "consumption_today",
            parts: &["load_energy_today", "ups_energy_today"],
        },
        Combination {
            key: "consumption_total",
            parts: &["load_energy_total", "ups_energy_total"],
        },
    ],
    fallback: &[
        e("grid_voltage_r", "grid_voltage_l1"),
        e("grid_voltage_s", "grid_voltage_l2"),
        e("grid_frequency", "grid_frequency"),
    ],
};

/// Overlay authoritative readings onto a group aggregate and return the
/// group keys taken from `authoritative`.
///
/// Whether the authoritative or the fallback path runs is decided once, by
/// the presence of `authoritative`. Combinations run after every entry has
/// been copied, then the net flows are recomputed from the overlaid values.
pub fn reconcile(
    group: &mut CanonicalSensorMap,
    authoritative: Option<&CanonicalSensorMap>,
    table: &OverlayTable,
    primary: Option<&CanonicalSensorMap>,
) -> Vec<&'static str> {
    let Some(authoritative) = authoritative else {
        if let Some(primary) = primary {
            copy_entries(group, primary, table.fallback);
        }
        return Vec::new();
    };

    let mut overlaid = copy_entries(group, authoritative, table.entries);

    for combination in table.combinations {
        let parts: Option<Vec<f64>> = combination
            .parts
            .iter()
            .map(|part| authoritative.value(part))
            .collect();
        if let Some(parts) = parts {
            group.insert(combination.key, codec::round(parts.iter().sum(), 1));
            overlaid.push(combination.key);
        }
    }

    let grid = derived::difference(
        group.value("grid_import_power"),
        group.value("grid_export_power"),
    );
    if let Some(grid) = grid {
        group.insert("grid_power", grid);
    }

    let flows = [
        group.value("pv_total_power"),
        group.value("battery_net_power"),
        grid,
    ];
    let consumption: SensorValue = derived::sum(flows).map(|v| v.max(0.0)).into();
    group.insert("consumption_power", consumption);

    overlaid
}

fn copy_entries(
    group: &mut CanonicalSensorMap,
    source: &CanonicalSensorMap,
    entries: &[OverlayEntry],
) -> Vec<&'static str> {
    let mut copied = Vec::new();
    for entry in entries {
        if let Some(value) = source.value(entry.from) {
            group.insert(entry.to, value);
            copied.push(entry.to);
        }
    }
    copied
}
