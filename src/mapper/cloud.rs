use crate::mapper::{FieldMapper, MappedFields};
use crate::prelude::*;
use crate::validator::canary::{
    Canary, AC_LEG_VOLTAGE_MAX, BATTERY_PACK_VOLTAGE_MAX, LFP_CELL_VOLTAGE_MAX,
    PV_STRING_VOLTAGE_MAX,
};

use crate::codec::Divisor::{self, Hundred, One, Ten, Thousand};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CloudRule {
    pub key: &'static str,
    pub field: &'static str,
    pub divisor: Divisor,
    pub canary: Option<Canary>,
}

impl CloudRule {
    const fn canary(self, canary: Canary) -> Self {
        Self {
            canary: Some(canary),
            ..self
        }
    }
}

const fn f(key: &'static str, field: &'static str, divisor: Divisor) -> CloudRule {
    CloudRule {
        key,
        field,
        divisor,
        canary: None,
    }
}

const PV_V: Canary = Canary::VoltageCeiling(PV_STRING_VOLTAGE_MAX);
const AC_V: Canary = Canary::VoltageCeiling(AC_LEG_VOLTAGE_MAX);
const PACK_V: Canary = Canary::VoltageCeiling(BATTERY_PACK_VOLTAGE_MAX);
const CELL_V: Canary = Canary::VoltageCeiling(LFP_CELL_VOLTAGE_MAX);
const HZ: Canary = Canary::Frequency;
const PCT: Canary = Canary::Percent;
const PORT: Canary = Canary::Enum { max: 2 };

// inverter runtime / energy {{{
static INVERTER_RUNTIME: &[CloudRule] = &[
    f("status_code", "status", One),
    f("pv1_voltage", "vpv1", Ten).canary(PV_V),
    f("pv2_voltage", "vpv2", Ten).canary(PV_V),
    f("pv3_voltage", "vpv3", Ten).canary(PV_V),
    f("pv1_power", "ppv1", One),
    f("pv2_power", "ppv2", One),
    f("pv3_power", "ppv3", One),
    f("battery_voltage", "vBat", Ten).canary(PACK_V),
    f("state_of_charge", "soc", One).canary(PCT),
    f("state_of_health", "soh", One).canary(PCT),
    f("battery_charge_power", "pCharge", One),
    f("battery_discharge_power", "pDisCharge", One),
    f("grid_voltage_r", "vacr", Ten).canary(AC_V),
    f("grid_voltage_s", "vacs", Ten).canary(AC_V),
    f("grid_voltage_t", "vact", Ten).canary(AC_V),
    f("grid_frequency", "fac", Hundred).canary(HZ),
    f("inverter_power", "pinv", One),
    f("rectifier_power", "prec", One),
    f("eps_voltage_r", "vepsr", Ten).canary(AC_V),
    f("eps_voltage_s", "vepss", Ten).canary(AC_V),
    f("eps_voltage_t", "vepst", Ten).canary(AC_V),
    f("eps_frequency", "feps", Hundred).canary(HZ),
    f("eps_power", "peps", One),
    f("grid_export_power", "pToGrid", One),
    f("grid_import_power", "pToUser", One),
    f("bus1_voltage", "vBus1", Ten),
    f("bus2_voltage", "vBus2", Ten),
    f("internal_temperature", "tinner", One),
    f("radiator1_temperature", "tradiator1", One),
    f("radiator2_temperature", "tradiator2", One),
    f("battery_temperature", "tBat", One),
    f("max_charge_current", "maxChgCurr", Hundred),
    f("max_discharge_current", "maxDischgCurr", Hundred),
    f("generator_voltage", "genVolt", Ten).canary(AC_V),
    f("generator_frequency", "genFreq", Hundred).canary(HZ),
    f("generator_power", "genPower", One),
];

static INVERTER_ENERGY: &[CloudRule] = &[
    f("yield_today", "todayYielding", Ten),
    f("inverter_energy_today", "todayInverting", Ten),
    f("rectifier_energy_today", "todayAcCharging", Ten),
    f("charge_energy_today", "todayCharging", Ten),
    f("discharge_energy_today", "todayDischarging", Ten),
    f("eps_energy_today", "todayEps", Ten),
    f("grid_export_today", "todayExport", Ten),
    f("grid_import_today", "todayImport", Ten),
    f("consumption_today", "todayUsage", Ten),
    f("yield_total", "totalYielding", Ten),
    f("inverter_energy_total", "totalInverting", Ten),
    f("rectifier_energy_total", "totalAcCharging", Ten),
    f("charge_energy_total", "totalCharging", Ten),
    f("discharge_energy_total", "totalDischarging", Ten),
    f("eps_energy_total", "totalEps", Ten),
    f("grid_export_total", "totalExport", Ten),
    f("grid_import_total", "totalImport", Ten),
    f("consumption_total", "totalUsage", Ten),
];
// }}}

// batteries {{{
static BATTERY_BANK: &[CloudRule] = &[
    f("bank_battery_count", "totalNumber", One),
    f("bank_soc", "soc", One).canary(PCT),
    f("bank_voltage", "vBat", Ten).canary(PACK_V),
    f("bank_charge_power", "pCharge", One),
    f("bank_discharge_power", "pDisCharge", One),
    f("bank_remaining_capacity", "remainCapacity", One),
    f("bank_full_capacity", "fullCapacity", One),
];

static BATTERY: &[CloudRule] = &[
    f("battery_voltage", "totalVoltage", Hundred).canary(PACK_V),
    f("battery_current", "current", Ten),
    f("state_of_charge", "soc", One).canary(PCT),
    f("state_of_health", "soh", One).canary(PCT),
    f("cycle_count", "cycleCnt", One),
    f("max_cell_voltage", "batMaxCellVoltage", Thousand).canary(CELL_V),
    f("min_cell_voltage", "batMinCellVoltage", Thousand).canary(CELL_V),
    f("max_cell_temperature", "batMaxCellTemp", Ten),
    f("min_cell_temperature", "batMinCellTemp", Ten),
    f("remaining_capacity", "currentRemainCapacity", One),
    f("full_capacity", "currentFullCapacity", One),
];
// }}}

// grid controller midboxData {{{
static GRID_CONTROLLER: &[CloudRule] = &[
    f("grid_voltage_l1", "gridL1RmsVolt", Ten).canary(AC_V),
    f("grid_voltage_l2", "gridL2RmsVolt", Ten).canary(AC_V),
    f("ups_voltage_l1", "upsL1RmsVolt", Ten).canary(AC_V),
    f("ups_voltage_l2", "upsL2RmsVolt", Ten).canary(AC_V),
    f("generator_voltage_l1", "genL1RmsVolt", Ten).canary(AC_V),
    f("generator_voltage_l2", "genL2RmsVolt", Ten).canary(AC_V),
    // cloud currents are 0.1 A, the registers carry 0.01 A
    f("grid_current_l1", "gridL1RmsCurr", Ten),
    f("grid_current_l2", "gridL2RmsCurr", Ten),
    f("ups_current_l1", "upsL1RmsCurr", Ten),
    f("ups_current_l2", "upsL2RmsCurr", Ten),
    f("generator_current_l1", "genL1RmsCurr", Ten),
    f("generator_current_l2", "genL2RmsCurr", Ten),
    f("load_current_l1", "loadL1RmsCurr", Ten),
    f("load_current_l2", "loadL2RmsCurr", Ten),
    f("grid_power_l1", "gridL1ActivePower", One),
    f("grid_power_l2", "gridL2ActivePower", One),
    f("generator_power_l1", "genL1ActivePower", One),
    f("generator_power_l2", "genL2ActivePower", One),
    f("load_power_l1", "loadL1ActivePower", One),
    f("load_power_l2", "loadL2ActivePower", One),
    // single figure, split per leg afterwards
    f("ups_power", "upsPower", One),
    f("smart_load1_power_l1", "smartLoad1L1ActivePower", One),
    f("smart_load1_power_l2", "smartLoad1L2ActivePower", One),
    f("smart_load2_power_l1", "smartLoad2L1ActivePower", One),
    f("smart_load2_power_l2", "smartLoad2L2ActivePower", One),
    f("smart_load3_power_l1", "smartLoad3L1ActivePower", One),
    f("smart_load3_power_l2", "smartLoad3L2ActivePower", One),
    f("smart_load4_power_l1", "smartLoad4L1ActivePower", One),
    f("smart_load4_power_l2", "smartLoad4L2ActivePower", One),
    f("ac_couple1_power_l1", "acCouple1L1ActivePower", One),
    f("ac_couple1_power_l2", "acCouple1L2ActivePower", One),
    f("ac_couple2_power_l1", "acCouple2L1ActivePower", One),
    f("ac_couple2_power_l2", "acCouple2L2ActivePower", One),
    f("ac_couple3_power_l1", "acCouple3L1ActivePower", One),
    f("ac_couple3_power_l2", "acCouple3L2ActivePower", One),
    f("ac_couple4_power_l1", "acCouple4L1ActivePower", One),
    f("ac_couple4_power_l2", "acCouple4L2ActivePower", One),
    f("smart_port1_status", "smartPort1Status", One).canary(PORT),
    f("smart_port2_status", "smartPort2Status", One).canary(PORT),
    f("smart_port3_status", "smartPort3Status", One).canary(PORT),
    f("smart_port4_status", "smartPort4Status", One).canary(PORT),
    f("grid_frequency", "gridFreq", Hundred).canary(HZ),
    f("generator_frequency", "genFreq", Hundred).canary(HZ),
    f("grid_import_today", "eGridImportToday", Ten),
    f("grid_export_today", "eGridExportToday", Ten),
    f("load_energy_today", "eLoadToday", Ten),
    f("ups_energy_today", "eUpsToday", Ten),
    f("generator_energy_today", "eGenToday", Ten),
    f("grid_import_total", "eGridImportTotal", Ten),
    f("grid_export_total", "eGridExportTotal", Ten),
    f("load_energy_total", "eLoadTotal", Ten),
    f("ups_energy_total", "eUpsTotal", Ten),
    f("generator_energy_total", "eGenTotal", Ten),
    f("smart_load1_energy_today", "eSmartLoad1Today", Ten),
    f("smart_load2_energy_today", "eSmartLoad2Today", Ten),
    f("smart_load3_energy_today", "eSmartLoad3Today", Ten),
    f("smart_load4_energy_today", "eSmartLoad4Today", Ten),
    f("ac_couple1_energy_today", "eACcouple1Today", Ten),
    f("ac_couple2_energy_today", "eACcouple2Today", Ten),
    f("ac_couple3_energy_today", "eACcouple3Today", Ten),
    f("ac_couple4_energy_today", "eACcouple4Today", Ten),
    f("smart_load1_energy_total", "eSmartLoad1Total", Ten),
    f("smart_load2_energy_total", "eSmartLoad2Total", Ten),
    f("smart_load3_energy_total", "eSmartLoad3Total", Ten),
    f("smart_load4_energy_total", "eSmartLoad4Total", Ten),
    f("ac_couple1_energy_total", "eACcouple1Total", Ten),
    f("ac_couple2_energy_total", "eACcouple2Total", Ten),
    f("ac_couple3_energy_total", "eACcouple3Total", Ten),
    f("ac_couple4_energy_total", "eACcouple4Total", Ten),
];
// }}}

pub fn table(class: DeviceClass) -> &'static [CloudRule] {
    match class {
        DeviceClass::InverterRuntime => INVERTER_RUNTIME,
        DeviceClass::InverterEnergy => INVERTER_ENERGY,
        DeviceClass::BatteryBank => BATTERY_BANK,
        DeviceClass::Battery => BATTERY,
        DeviceClass::GridController => GRID_CONTROLLER,
    }
}

/// The cloud API sends numbers both bare and as strings, and uses `null` or
/// `""` for fields the device does not have.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CloudMapper;

impl FieldMapper for CloudMapper {
    fn map(&self, raw: &RawFieldSet) -> MappedFields {
        let mut mapped = MappedFields::default();

        let Some(object) = raw.json() else {
            warn!("cloud mapper given non-JSON data for {:?}", raw.class);
            return mapped;
        };

        for rule in table(raw.class) {
            let Some(value) = object.get(rule.field).and_then(numeric) else {
                continue;
            };
            mapped.map.insert(rule.key, value / rule.divisor.as_f64());
            if let Some(canary) = rule.canary {
                mapped.canaries.push((rule.key, canary));
            }
        }

        mapped
    }
}
