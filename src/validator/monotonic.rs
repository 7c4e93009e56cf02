use crate::prelude::*;
use crate::validator::ValidationState;

/// Hold every lifetime counter in `map` at or above its last accepted value.
///
/// Only runs on merged or aggregated maps: two sources can each look
/// monotonic on their own while the merged value steps backwards.
pub fn enforce(
    device_id: &str,
    map: &mut CanonicalSensorMap,
    state: &mut ValidationState,
    events: &mut Vec<ValidationEvent>,
) {
    let counters: Vec<(String, f64)> = map
        .iter()
        .filter(|(key, _)| catalog::is_monotonic(key))
        .filter_map(|(key, value)| value.value().map(|v| (key.to_string(), v)))
        .collect();

    for (key, value) in counters {
        match state.last_monotonic(&key) {
            Some(previous) if value < previous => {
                warn!(
                    "{}: counter {} went backwards ({} < {}), keeping previous",
                    device_id, key, value, previous
                );
                map.insert(key.as_str(), previous);
                events.push(ValidationEvent {
                    device_id: device_id.to_string(),
                    field: key,
                    reason: RejectionReason::MonotonicityViolation,
                    rejected_value: value,
                    retained_value: Some(previous),
                });
            }
            _ => {
                state.monotonic.insert(key, value);
            }
        }
    }
}
