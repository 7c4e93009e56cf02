use crate::prelude::*;
use crate::validator::ValidationState;

pub const PV_STRING_VOLTAGE_MAX: f64 = 600.0;
pub const AC_LEG_VOLTAGE_MAX: f64 = 300.0;
pub const BATTERY_PACK_VOLTAGE_MAX: f64 = 100.0;
pub const LFP_CELL_VOLTAGE_MAX: f64 = 5.0;

pub const FREQUENCY_MIN: f64 = 30.0;
pub const FREQUENCY_MAX: f64 = 90.0;

/// Plausibility rule attached to a mapped field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Canary {
    /// State of charge / health in `0..=100`; above 100 means the neighbouring
    /// byte leaked in.
    Percent,
    /// 0 Hz is an inverter running off grid and is valid.
    Frequency,
    VoltageCeiling(f64),
    /// Integer code in `0..=max`.
    Enum { max: u16 },
}

impl Canary {
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        match *self {
            Self::Percent => (0.0..=100.0).contains(&value),
            Self::Frequency => value == 0.0 || (FREQUENCY_MIN..=FREQUENCY_MAX).contains(&value),
            Self::VoltageCeiling(ceiling) => value <= ceiling,
            Self::Enum { max } => value >= 0.0 && value.fract() == 0.0 && value <= f64::from(max),
        }
    }
}

/// Apply each field's canary rule to `map` in place.
///
/// Accepted values become the new fallback for their field. A rejected value
/// is replaced by the previous accepted one, or removed when there is none.
pub fn screen(
    device_id: &str,
    map: &mut CanonicalSensorMap,
    rules: &[(&'static str, Canary)],
    state: &mut ValidationState,
    events: &mut Vec<ValidationEvent>,
) {
    for (key, rule) in rules {
        let Some(value) = map.value(key) else {
            continue;
        };

        if rule.accepts(value) {
            state.canary.insert((*key).to_string(), value);
            continue;
        }

        let retained = state.last_canary(key);
        match retained {
            Some(previous) => map.insert(*key, previous),
            None => {
                map.remove(key);
            }
        }

        warn!(
            "{}: rejecting {}={} ({:?}), keeping {:?}",
            device_id, key, value, rule, retained
        );

        events.push(ValidationEvent {
            device_id: device_id.to_string(),
            field: (*key).to_string(),
            reason: RejectionReason::CanaryViolation,
            rejected_value: value,
            retained_value: retained,
        });
    }
}
