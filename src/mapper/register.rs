use crate::mapper::{FieldMapper, MappedFields};
use crate::prelude::*;
use crate::validator::canary::{
    Canary, AC_LEG_VOLTAGE_MAX, BATTERY_PACK_VOLTAGE_MAX, LFP_CELL_VOLTAGE_MAX,
    PV_STRING_VOLTAGE_MAX,
};

use crate::codec::Divisor::{Hundred, One, Ten, Thousand};
use crate::codec::ScaleDescriptor as D;

/// Post-decode adjustment for values that are not a plain scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    Identity,
    /// 0..=1000 is leading (pf = v/1000), above 1000 lagging (pf = (2000-v)/1000).
    PowerFactor,
}

impl Transform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::PowerFactor => {
                if value <= 1000.0 {
                    value / 1000.0
                } else {
                    (2000.0 - value) / 1000.0
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegisterRule {
    pub key: &'static str,
    pub descriptor: ScaleDescriptor,
    pub transform: Transform,
    pub canary: Option<Canary>,
}

impl RegisterRule {
    const fn new(key: &'static str, descriptor: ScaleDescriptor) -> Self {
        Self {
            key,
            descriptor,
            transform: Transform::Identity,
            canary: None,
        }
    }

    const fn canary(self, canary: Canary) -> Self {
        Self {
            canary: Some(canary),
            ..self
        }
    }

    const fn transform(self, transform: Transform) -> Self {
        Self { transform, ..self }
    }
}

const fn r(key: &'static str, descriptor: ScaleDescriptor) -> RegisterRule {
    RegisterRule::new(key, descriptor)
}

const PV_V: Canary = Canary::VoltageCeiling(PV_STRING_VOLTAGE_MAX);
const AC_V: Canary = Canary::VoltageCeiling(AC_LEG_VOLTAGE_MAX);
const PACK_V: Canary = Canary::VoltageCeiling(BATTERY_PACK_VOLTAGE_MAX);
const CELL_V: Canary = Canary::VoltageCeiling(LFP_CELL_VOLTAGE_MAX);
const HZ: Canary = Canary::Frequency;
const PCT: Canary = Canary::Percent;
const PORT: Canary = Canary::Enum { max: 2 };

// inverter input registers {{{
static INVERTER_RUNTIME: &[RegisterRule] = &[
    r("status_code", D::u16(0, One)),
    r("pv1_voltage", D::u16(1, Ten)).canary(PV_V),
    r("pv2_voltage", D::u16(2, Ten)).canary(PV_V),
    r("pv3_voltage", D::u16(3, Ten)).canary(PV_V),
    r("battery_voltage", D::u16(4, Ten)).canary(PACK_V),
    // SOC low byte, SOH high byte
    r("state_of_charge", D::packed(5, 0, 8)).canary(PCT),
    r("state_of_health", D::packed(5, 8, 8)).canary(PCT),
    r("pv1_power", D::u16(7, One)),
    r("pv2_power", D::u16(8, One)),
    r("pv3_power", D::u16(9, One)),
    r("battery_charge_power", D::u16(10, One)),
    r("battery_discharge_power", D::u16(11, One)),
    r("grid_voltage_r", D::u16(12, Ten)).canary(AC_V),
    r("grid_voltage_s", D::u16(13, Ten)).canary(AC_V),
    r("grid_voltage_t", D::u16(14, Ten)).canary(AC_V),
    r("grid_frequency", D::u16(15, Hundred)).canary(HZ),
    r("inverter_power", D::u16(16, One)),
    r("rectifier_power", D::u16(17, One)),
    r("power_factor", D::u16(19, One)).transform(Transform::PowerFactor),
    r("eps_voltage_r", D::u16(20, Ten)).canary(AC_V),
    r("eps_voltage_s", D::u16(21, Ten)).canary(AC_V),
    r("eps_voltage_t", D::u16(22, Ten)).canary(AC_V),
    r("eps_frequency", D::u16(23, Hundred)).canary(HZ),
    r("eps_power", D::u16(24, One)),
    r("grid_export_power", D::u16(26, One)),
    r("grid_import_power", D::u16(27, One)),
    r("bus1_voltage", D::u16(38, Ten)),
    r("bus2_voltage", D::u16(39, Ten)),
    r("internal_temperature", D::i16(64, One)),
    r("radiator1_temperature", D::i16(65, One)),
    r("radiator2_temperature", D::i16(66, One)),
    r("battery_temperature", D::i16(67, One)),
    r("max_charge_current", D::u16(81, Hundred)),
    r("max_discharge_current", D::u16(82, Hundred)),
    r("generator_voltage", D::u16(121, Ten)).canary(AC_V),
    r("generator_frequency", D::u16(122, Hundred)).canary(HZ),
    r("generator_power", D::u16(123, One)),
    r("eps_l1_voltage", D::u16(127, Ten)).canary(AC_V),
    r("eps_l2_voltage", D::u16(128, Ten)).canary(AC_V),
    r("eps_l1_power", D::u16(129, One)),
    r("eps_l2_power", D::u16(130, One)),
];

static INVERTER_ENERGY: &[RegisterRule] = &[
    r("pv1_energy_today", D::u16(28, Ten)),
    r("pv2_energy_today", D::u16(29, Ten)),
    r("pv3_energy_today", D::u16(30, Ten)),
    r("inverter_energy_today", D::u16(31, Ten)),
    r("rectifier_energy_today", D::u16(32, Ten)),
    r("charge_energy_today", D::u16(33, Ten)),
    r("discharge_energy_today", D::u16(34, Ten)),
    r("eps_energy_today", D::u16(35, Ten)),
    r("grid_export_today", D::u16(36, Ten)),
    r("grid_import_today", D::u16(37, Ten)),
    r("pv1_energy_total", D::u32_le(40, Ten)),
    r("pv2_energy_total", D::u32_le(42, Ten)),
    r("pv3_energy_total", D::u32_le(44, Ten)),
    r("inverter_energy_total", D::u32_le(46, Ten)),
    r("rectifier_energy_total", D::u32_le(48, Ten)),
    r("charge_energy_total", D::u32_le(50, Ten)),
    r("discharge_energy_total", D::u32_le(52, Ten)),
    r("eps_energy_total", D::u32_le(54, Ten)),
    r("grid_export_total", D::u32_le(56, Ten)),
    r("grid_import_total", D::u32_le(58, Ten)),
    r("generator_energy_today", D::u16(124, Ten)),
    r("generator_energy_total", D::u32_le(125, Ten)),
];

static BATTERY_BANK: &[RegisterRule] = &[
    r("bank_voltage", D::u16(4, Ten)).canary(PACK_V),
    r("bank_soc", D::packed(5, 0, 8)).canary(PCT),
    r("bank_charge_power", D::u16(10, One)),
    r("bank_discharge_power", D::u16(11, One)),
    r("bank_charge_voltage_ref", D::u16(83, Ten)).canary(PACK_V),
    r("bank_discharge_cutoff_voltage", D::u16(84, Ten)).canary(PACK_V),
    r("bank_battery_count", D::u16(96, One)),
    r("bank_capacity", D::u16(97, One)),
    // the BMS reports 0.1 A steps here, not the 0.01 A the register map claims
    r("bank_current", D::i16(98, Ten)),
    r("bank_max_cell_voltage", D::u16(101, Thousand)).canary(CELL_V),
    r("bank_min_cell_voltage", D::u16(102, Thousand)).canary(CELL_V),
    r("bank_max_cell_temperature", D::i16(103, Ten)),
    r("bank_min_cell_temperature", D::i16(104, Ten)),
    r("bank_cycle_count", D::u16(106, One)),
];
// }}}

// battery module block, offsets from the module's first register {{{
static BATTERY: &[RegisterRule] = &[
    r("battery_voltage", D::u16(0, Hundred)).canary(PACK_V),
    r("battery_current", D::i16(1, Ten)),
    r("state_of_charge", D::packed(2, 0, 8)).canary(PCT),
    r("state_of_health", D::packed(2, 8, 8)).canary(PCT),
    r("cycle_count", D::u16(3, One)),
    r("max_cell_voltage", D::u16(4, Thousand)).canary(CELL_V),
    r("min_cell_voltage", D::u16(5, Thousand)).canary(CELL_V),
    r("max_cell_temperature", D::i16(6, Ten)),
    r("min_cell_temperature", D::i16(7, Ten)),
    r("remaining_capacity", D::u16(8, One)),
    r("full_capacity", D::u16(9, One)),
];
// }}}

// grid controller input registers {{{
static GRID_CONTROLLER: &[RegisterRule] = &[
    r("grid_voltage_l1", D::u16(1, Ten)).canary(AC_V),
    r("grid_voltage_l2", D::u16(2, Ten)).canary(AC_V),
    r("ups_voltage_l1", D::u16(3, Ten)).canary(AC_V),
    r("ups_voltage_l2", D::u16(4, Ten)).canary(AC_V),
    r("generator_voltage_l1", D::u16(5, Ten)).canary(AC_V),
    r("generator_voltage_l2", D::u16(6, Ten)).canary(AC_V),
    r("grid_current_l1", D::u16(7, Hundred)),
    r("grid_current_l2", D::u16(8, Hundred)),
    r("ups_current_l1", D::u16(9, Hundred)),
    r("ups_current_l2", D::u16(10, Hundred)),
    r("generator_current_l1", D::u16(11, Hundred)),
    r("generator_current_l2", D::u16(12, Hundred)),
    r("load_current_l1", D::u16(13, Hundred)),
    r("load_current_l2", D::u16(14, Hundred)),
    r("grid_power_l1", D::i16(15, One)),
    r("grid_power_l2", D::i16(16, One)),
    r("ups_power_l1", D::i16(17, One)),
    r("ups_power_l2", D::i16(18, One)),
    r("generator_power_l1", D::i16(19, One)),
    r("generator_power_l2", D::i16(20, One)),
    r("load_power_l1", D::i16(21, One)),
    r("load_power_l2", D::i16(22, One)),
    // smart port legs are reported in the load family whatever the port mode
    r("smart_load1_power_l1", D::i16(23, One)),
    r("smart_load1_power_l2", D::i16(24, One)),
    r("smart_load2_power_l1", D::i16(25, One)),
    r("smart_load2_power_l2", D::i16(26, One)),
    r("smart_load3_power_l1", D::i16(27, One)),
    r("smart_load3_power_l2", D::i16(28, One)),
    r("smart_load4_power_l1", D::i16(29, One)),
    r("smart_load4_power_l2", D::i16(30, One)),
    r("grid_frequency", D::u16(31, Hundred)).canary(HZ),
    r("generator_frequency", D::u16(32, Hundred)).canary(HZ),
    r("smart_port1_status", D::packed(34, 0, 2)).canary(PORT),
    r("smart_port2_status", D::packed(34, 2, 2)).canary(PORT),
    r("smart_port3_status", D::packed(34, 4, 2)).canary(PORT),
    r("smart_port4_status", D::packed(34, 6, 2)).canary(PORT),
    r("grid_import_today", D::u16(40, Ten)),
    r("grid_export_today", D::u16(41, Ten)),
    r("load_energy_today", D::u16(42, Ten)),
    r("ups_energy_today", D::u16(43, Ten)),
    r("generator_energy_today", D::u16(44, Ten)),
    r("smart_load1_energy_today", D::u16(48, Ten)),
    r("smart_load2_energy_today", D::u16(49, Ten)),
    r("smart_load3_energy_today", D::u16(50, Ten)),
    r("smart_load4_energy_today", D::u16(51, Ten)),
    r("grid_import_total", D::u32_le(60, Ten)),
    r("grid_export_total", D::u32_le(62, Ten)),
    r("load_energy_total", D::u32_le(64, Ten)),
    r("ups_energy_total", D::u32_le(66, Ten)),
    r("generator_energy_total", D::u32_le(68, Ten)),
    r("smart_load1_energy_total", D::u32_le(70, Ten)),
    r("smart_load2_energy_total", D::u32_le(72, Ten)),
    r("smart_load3_energy_total", D::u32_le(74, Ten)),
    r("smart_load4_energy_total", D::u32_le(76, Ten)),
];
// }}}

pub fn table(class: DeviceClass) -> &'static [RegisterRule] {
    match class {
        DeviceClass::InverterRuntime => INVERTER_RUNTIME,
        DeviceClass::InverterEnergy => INVERTER_ENERGY,
        DeviceClass::BatteryBank => BATTERY_BANK,
        DeviceClass::Battery => BATTERY,
        DeviceClass::GridController => GRID_CONTROLLER,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterMapper;

impl FieldMapper for RegisterMapper {
    fn map(&self, raw: &RawFieldSet) -> MappedFields {
        let mut mapped = MappedFields::default();

        let Some(block) = raw.block() else {
            warn!("register mapper given non-register data for {:?}", raw.class);
            return mapped;
        };

        // a module that dropped off the BMS bus reads back all zeros
        if raw.class == DeviceClass::Battery && block.all_zero() {
            debug!("battery {:?} block is all zero, skipping", raw.unit);
            return mapped;
        }

        for rule in table(raw.class) {
            let Some(value) = codec::decode(block, &rule.descriptor) else {
                continue;
            };
            mapped.map.insert(rule.key, rule.transform.apply(value));
            if let Some(canary) = rule.canary {
                mapped.canaries.push((rule.key, canary));
            }
        }

        mapped
    }
}
