//! Canonical sensor keys shared by the register and cloud mappers.
//!
//! Every key a mapper, the port filter, the aggregator or the derived metric
//! calculator can emit is listed here with its unit, how it is combined across
//! a parallel group, and whether it is a lifetime counter.
//!
//! Sign conventions are per key and are not uniform:
//! * `battery_power` (per inverter) and `bank_power` are charge − discharge.
//! * `battery_net_power` (group only) is discharge − charge.
//! * `grid_power` is import − export everywhere.

use crate::port::{PortKeys, LOAD_PORTS, SOURCE_PORTS};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Watt,
    KilowattHour,
    Volt,
    Ampere,
    AmpHour,
    Hertz,
    Percent,
    Celsius,
    PowerFactor,
    Count,
    Code,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Watt => "W",
            Self::KilowattHour => "kWh",
            Self::Volt => "V",
            Self::Ampere => "A",
            Self::AmpHour => "Ah",
            Self::Hertz => "Hz",
            Self::Percent => "%",
            Self::Celsius => "°C",
            Self::PowerFactor | Self::Count | Self::Code => "",
        }
    }
}

/// How a key is combined across the members of a parallel group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    /// Intensive quantities: voltage, SOC, frequency, temperature.
    Mean,
    Max,
    Min,
    /// Per-unit identity or diagnostics that do not combine.
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorSpec {
    pub key: &'static str,
    pub unit: Unit,
    pub aggregation: Aggregation,
    /// Lifetime counter: must never decrease between polls.
    pub monotonic: bool,
}

impl SensorSpec {
    const fn new(key: &'static str, unit: Unit, aggregation: Aggregation) -> Self {
        Self {
            key,
            unit,
            aggregation,
            monotonic: false,
        }
    }

    const fn monotonic(self) -> Self {
        Self {
            monotonic: true,
            ..self
        }
    }
}

const fn sum(key: &'static str, unit: Unit) -> SensorSpec {
    SensorSpec::new(key, unit, Aggregation::Sum)
}

const fn mean(key: &'static str, unit: Unit) -> SensorSpec {
    SensorSpec::new(key, unit, Aggregation::Mean)
}

const fn max(key: &'static str, unit: Unit) -> SensorSpec {
    SensorSpec::new(key, unit, Aggregation::Max)
}

const fn min(key: &'static str, unit: Unit) -> SensorSpec {
    SensorSpec::new(key, unit, Aggregation::Min)
}

const fn skip(key: &'static str, unit: Unit) -> SensorSpec {
    SensorSpec::new(key, unit, Aggregation::Skip)
}

const fn total(key: &'static str) -> SensorSpec {
    sum(key, Unit::KilowattHour).monotonic()
}

use Unit::*;

static SENSORS: &[SensorSpec] = &[
    // inverter runtime {{{
    skip("status_code", Code),
    mean("pv1_voltage", Volt),
    mean("pv2_voltage", Volt),
    mean("pv3_voltage", Volt),
    sum("pv1_power", Watt),
    sum("pv2_power", Watt),
    sum("pv3_power", Watt),
    sum("pv_total_power", Watt),
    mean("battery_voltage", Volt),
    mean("state_of_charge", Percent),
    mean("state_of_health", Percent),
    sum("battery_charge_power", Watt),
    sum("battery_discharge_power", Watt),
    // charge − discharge
    sum("battery_power", Watt),
    // discharge − charge, group map only
    sum("battery_net_power", Watt),
    mean("grid_voltage_r", Volt),
    mean("grid_voltage_s", Volt),
    mean("grid_voltage_t", Volt),
    mean("grid_frequency", Hertz),
    sum("inverter_power", Watt),
    sum("rectifier_power", Watt),
    mean("power_factor", PowerFactor),
    mean("eps_voltage_r", Volt),
    mean("eps_voltage_s", Volt),
    mean("eps_voltage_t", Volt),
    mean("eps_frequency", Hertz),
    sum("eps_power", Watt),
    sum("grid_export_power", Watt),
    sum("grid_import_power", Watt),
    sum("grid_power", Watt),
    sum("consumption_power", Watt),
    mean("bus1_voltage", Volt),
    mean("bus2_voltage", Volt),
    mean("internal_temperature", Celsius),
    mean("radiator1_temperature", Celsius),
    mean("radiator2_temperature", Celsius),
    mean("battery_temperature", Celsius),
    sum("max_charge_current", Ampere),
    sum("max_discharge_current", Ampere),
    mean("generator_voltage", Volt),
    mean("generator_frequency", Hertz),
    sum("generator_power", Watt),
    mean("eps_l1_voltage", Volt),
    mean("eps_l2_voltage", Volt),
    sum("eps_l1_power", Watt),
    sum("eps_l2_power", Watt),
    // }}}
    // inverter energy {{{
    sum("pv1_energy_today", KilowattHour),
    sum("pv2_energy_today", KilowattHour),
    sum("pv3_energy_today", KilowattHour),
    sum("yield_today", KilowattHour),
    sum("inverter_energy_today", KilowattHour),
    sum("rectifier_energy_today", KilowattHour),
    sum("charge_energy_today", KilowattHour),
    sum("discharge_energy_today", KilowattHour),
    sum("eps_energy_today", KilowattHour),
    sum("grid_export_today", KilowattHour),
    sum("grid_import_today", KilowattHour),
    sum("consumption_today", KilowattHour),
    sum("generator_energy_today", KilowattHour),
    total("pv1_energy_total"),
    total("pv2_energy_total"),
    total("pv3_energy_total"),
    total("yield_total"),
    total("inverter_energy_total"),
    total("rectifier_energy_total"),
    total("charge_energy_total"),
    total("discharge_energy_total"),
    total("eps_energy_total"),
    total("grid_export_total"),
    total("grid_import_total"),
    total("consumption_total"),
    total("generator_energy_total"),
    // }}}
    // battery module {{{
    sum("battery_current", Ampere),
    skip("cycle_count", Count).monotonic(),
    max("max_cell_voltage", Volt),
    min("min_cell_voltage", Volt),
    skip("cell_voltage_delta", Volt),
    max("max_cell_temperature", Celsius),
    min("min_cell_temperature", Celsius),
    skip("cell_temperature_delta", Celsius),
    sum("remaining_capacity", AmpHour),
    sum("full_capacity", AmpHour),
    // }}}
    // battery bank {{{
    sum("bank_battery_count", Count),
    sum("bank_capacity", AmpHour),
    mean("bank_voltage", Volt),
    mean("bank_soc", Percent),
    sum("bank_current", Ampere),
    sum("bank_charge_power", Watt),
    sum("bank_discharge_power", Watt),
    // charge − discharge
    sum("bank_power", Watt),
    max("bank_max_cell_voltage", Volt),
    min("bank_min_cell_voltage", Volt),
    max("bank_max_cell_temperature", Celsius),
    min("bank_min_cell_temperature", Celsius),
    skip("bank_cycle_count", Count).monotonic(),
    mean("bank_charge_voltage_ref", Volt),
    mean("bank_discharge_cutoff_voltage", Volt),
    sum("bank_remaining_capacity", AmpHour),
    sum("bank_full_capacity", AmpHour),
    sum("bank_present_count", Count),
    skip("bank_voltage_spread", Volt),
    skip("bank_soh_spread", Percent),
    skip("bank_cycle_count_spread", Count),
    skip("bank_cell_voltage_delta_spread", Volt),
    max("bank_highest_cell_temperature", Celsius),
    min("bank_min_battery_voltage", Volt),
    max("bank_max_battery_voltage", Volt),
    min("bank_min_soc", Percent),
    max("bank_max_soc", Percent),
    // }}}
    // grid controller {{{
    mean("grid_voltage_l1", Volt),
    mean("grid_voltage_l2", Volt),
    mean("ups_voltage_l1", Volt),
    mean("ups_voltage_l2", Volt),
    mean("generator_voltage_l1", Volt),
    mean("generator_voltage_l2", Volt),
    sum("grid_current_l1", Ampere),
    sum("grid_current_l2", Ampere),
    sum("ups_current_l1", Ampere),
    sum("ups_current_l2", Ampere),
    sum("generator_current_l1", Ampere),
    sum("generator_current_l2", Ampere),
    sum("load_current_l1", Ampere),
    sum("load_current_l2", Ampere),
    sum("grid_power_l1", Watt),
    sum("grid_power_l2", Watt),
    sum("ups_power_l1", Watt),
    sum("ups_power_l2", Watt),
    sum("ups_power", Watt),
    sum("generator_power_l1", Watt),
    sum("generator_power_l2", Watt),
    sum("load_power_l1", Watt),
    sum("load_power_l2", Watt),
    sum("load_power", Watt),
    skip("smart_port1_status", Code),
    skip("smart_port2_status", Code),
    skip("smart_port3_status", Code),
    skip("smart_port4_status", Code),
    sum("smart_load_power", Watt),
    sum("ac_couple_power", Watt),
    sum("smart_load_energy_today", KilowattHour),
    sum("ac_couple_energy_today", KilowattHour),
    total("smart_load_energy_total"),
    total("ac_couple_energy_total"),
    sum("load_energy_today", KilowattHour),
    sum("ups_energy_today", KilowattHour),
    total("load_energy_total"),
    total("ups_energy_total"),
    // }}}
];

fn port_specs(ports: &'static [PortKeys; 4]) -> impl Iterator<Item = SensorSpec> {
    ports.iter().flat_map(|keys| {
        [
            sum(keys.power_l1, Watt),
            sum(keys.power_l2, Watt),
            sum(keys.power, Watt),
            sum(keys.energy_today, KilowattHour),
            total(keys.energy_total),
        ]
    })
}

fn index() -> &'static HashMap<&'static str, SensorSpec> {
    static INDEX: OnceLock<HashMap<&'static str, SensorSpec>> = OnceLock::new();
    INDEX.get_or_init(|| {
        SENSORS
            .iter()
            .copied()
            .chain(port_specs(&LOAD_PORTS))
            .chain(port_specs(&SOURCE_PORTS))
            .map(|spec| (spec.key, spec))
            .collect()
    })
}

pub fn spec(key: &str) -> Option<&'static SensorSpec> {
    index().get(key)
}

/// Keys outside the catalog are never combined.
pub fn aggregation(key: &str) -> Aggregation {
    spec(key).map_or(Aggregation::Skip, |s| s.aggregation)
}

pub fn is_monotonic(key: &str) -> bool {
    spec(key).is_some_and(|s| s.monotonic)
}
