mod common;
use common::*;

use eg4_normalizer::coordinator::{
    self, process_device, process_group, Coordinator, DeviceResult, PollOutcome,
};

fn inverter(id: &str, block: RegisterBlock) -> DevicePoll {
    DevicePoll::new(id, DeviceKind::Inverter, Factory::inverter_sets(block))
}

fn inverter_with_batteries(id: &str) -> DevicePoll {
    let mut raw = Factory::inverter_sets(Factory::inverter_block());
    raw.extend(Factory::battery_sets());
    DevicePoll::new(id, DeviceKind::Inverter, raw)
}

fn grid_controller(id: &str) -> DevicePoll {
    DevicePoll::new(id, DeviceKind::GridController, Factory::grid_controller_sets())
}

fn group_poll(mode: DeploymentMode, primary: Option<&str>, members: Vec<DevicePoll>) -> GroupPoll {
    GroupPoll {
        group_id: "home".to_string(),
        mode,
        primary: primary.map(str::to_string),
        members,
    }
}

#[test]
fn full_group() {
    common_setup();

    let cache = StateCache::new();
    let poll = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![
            inverter_with_batteries("inv1"),
            inverter("inv2", Factory::inverter_block()),
            grid_controller("gc1"),
        ],
    );

    let outcome = process_group(&cache, &poll, Factory::validation());

    assert_eq!(outcome.group_id, "home");
    assert!(outcome.events.is_empty());
    assert_eq!(
        outcome.devices.keys().collect::<Vec<_>>(),
        vec!["gc1", "inv1", "inv2"]
    );

    // the module that dropped off the bus is not reported
    assert_eq!(
        outcome.batteries.keys().collect::<Vec<_>>(),
        vec!["inv1-battery0", "inv1-battery2"]
    );
    let battery = &outcome.batteries["inv1-battery2"];
    assert_eq!(battery.value("battery_voltage"), Some(53.1));
    assert_eq!(battery.value("cell_voltage_delta"), Some(0.05));

    let inv1 = &outcome.devices["inv1"];
    assert_eq!(inv1.value("bank_present_count"), Some(2.0));
    assert_eq!(inv1.value("bank_battery_count"), Some(3.0));
    assert_eq!(inv1.value("bank_voltage_spread"), Some(0.11));
    assert_eq!(inv1.value("bank_power"), Some(800.0));
    assert_eq!(inv1.value("yield_today"), Some(22.3));
    assert!(!outcome.devices["inv2"].contains("bank_present_count"));

    let gc1 = &outcome.devices["gc1"];
    assert_eq!(gc1.value("smart_load_power"), Some(440.0));
    assert_eq!(gc1.value("ac_couple_power"), Some(780.0));
    assert_eq!(gc1.value("ac_couple2_power"), Some(780.0));
    assert!(gc1.is_unknown("smart_load2_power"));
    assert!(gc1.is_unknown("ac_couple1_power"));
    assert!(!gc1.contains("smart_load3_power"));
    assert_eq!(gc1.value("grid_import_power"), Some(1150.0));

    let group = outcome.group.as_ref().unwrap();
    assert_eq!(group.value("pv_total_power"), Some(5400.0));
    assert_eq!(group.value("battery_charge_power"), Some(1600.0));
    assert_eq!(group.value("battery_net_power"), Some(-1600.0));
    // the grid controller's readings win over the inverters'
    assert_eq!(group.value("grid_import_power"), Some(1150.0));
    assert_eq!(group.value("grid_export_power"), Some(0.0));
    assert_eq!(group.value("grid_power"), Some(1150.0));
    assert_eq!(group.value("consumption_power"), Some(4950.0));
    assert_eq!(group.value("consumption_today"), Some(19.0));
    assert_eq!(group.value("consumption_total"), Some(10000.0));
    assert_eq!(group.value("grid_voltage_l1"), Some(240.1));
    assert_eq!(group.value("smart_load_power"), Some(440.0));
    assert_eq!(group.value("state_of_charge"), Some(50.0));
    assert!(!group.contains("status_code"));
}

#[test]
fn group_without_grid_controller_uses_primary() {
    common_setup();

    let cache = StateCache::new();
    let poll = group_poll(
        DeploymentMode::LocalOnly,
        Some("inv2"),
        vec![
            inverter("inv1", Factory::inverter_block()),
            inverter("inv2", Factory::inverter_block_with(&[(12, 2410), (13, 2390)])),
        ],
    );

    let outcome = process_group(&cache, &poll, Factory::validation());
    let group = outcome.group.unwrap();

    assert_eq!(group.value("grid_voltage_r"), Some(240.75));
    assert_eq!(group.value("grid_voltage_l1"), Some(241.0));
    assert_eq!(group.value("grid_voltage_l2"), Some(239.0));
    // inverter-derived flows stand
    assert_eq!(group.value("grid_export_power"), Some(400.0));
    assert_eq!(group.value("grid_power"), Some(-400.0));
    assert_eq!(group.value("consumption_power"), Some(3400.0));
}

#[test]
fn first_inverter_is_default_primary() {
    common_setup();

    let cache = StateCache::new();
    let poll = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![
            inverter("inv1", Factory::inverter_block_with(&[(12, 2420)])),
            inverter("inv2", Factory::inverter_block()),
        ],
    );

    let outcome = process_group(&cache, &poll, Factory::validation());
    assert_eq!(outcome.group.unwrap().value("grid_voltage_l1"), Some(242.0));
}

#[test]
fn partial_poll() {
    common_setup();

    let cache = StateCache::new();
    let poll = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![
            inverter("inv1", Factory::inverter_block()),
            DevicePoll::new("inv2", DeviceKind::Inverter, Vec::new()),
        ],
    );

    let outcome = process_group(&cache, &poll, Factory::validation());

    assert_eq!(outcome.devices.len(), 1);
    assert!(outcome.devices.contains_key("inv1"));
    assert_eq!(
        outcome.group.unwrap().value("pv_total_power"),
        Some(2700.0)
    );
}

#[test]
fn nobody_reported() {
    common_setup();

    let cache = StateCache::new();
    let poll = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![DevicePoll::new("inv1", DeviceKind::Inverter, Vec::new())],
    );

    let outcome = process_group(&cache, &poll, Factory::validation());
    assert!(outcome.devices.is_empty());
    assert_eq!(outcome.group, None);
}

fn hybrid_raw() -> Vec<RawFieldSet> {
    let mut raw = Factory::inverter_sets(Factory::inverter_block());
    raw.push(RawFieldSet::cloud(
        DeviceClass::InverterRuntime,
        Factory::cloud_runtime(),
    ));
    raw.push(RawFieldSet::cloud(
        DeviceClass::InverterEnergy,
        Factory::cloud_energy(),
    ));
    raw
}

#[test]
fn hybrid_prefers_registers() {
    common_setup();

    let cache = StateCache::new();
    let poll = DevicePoll::new("inv1", DeviceKind::Inverter, hybrid_raw());
    let result = process_device(&cache, DeploymentMode::Hybrid, Factory::validation(), &poll);
    let map = result.map.unwrap();

    assert_eq!(map.value("state_of_charge"), Some(50.0));
    assert_eq!(map.value("internal_temperature"), Some(45.0));
    // only the cloud reports usage
    assert_eq!(map.value("consumption_today"), Some(18.0));
}

#[test]
fn mode_selects_sources() {
    common_setup();

    let poll = DevicePoll::new("inv1", DeviceKind::Inverter, hybrid_raw());

    let local = process_device(
        &StateCache::new(),
        DeploymentMode::LocalOnly,
        Factory::validation(),
        &poll,
    )
    .map
    .unwrap();
    assert_eq!(local.value("consumption_today"), Some(19.3));

    let cloud = process_device(
        &StateCache::new(),
        DeploymentMode::CloudOnly,
        Factory::validation(),
        &poll,
    )
    .map
    .unwrap();
    assert_eq!(cloud.value("state_of_charge"), Some(55.0));
    assert_eq!(cloud.value("yield_today"), Some(22.3));
    assert!(!cloud.contains("bank_voltage"));

    let nothing = process_device(
        &StateCache::new(),
        DeploymentMode::CloudOnly,
        Factory::validation(),
        &inverter("inv2", Factory::inverter_block()),
    );
    assert_eq!(nothing.map, None);
}

#[test]
fn canary_across_polls() {
    common_setup();

    let cache = StateCache::new();
    let first = inverter("inv1", Factory::inverter_block_with(&[(5, (100 << 8) | 42)]));
    let second = inverter("inv1", Factory::inverter_block_with(&[(5, (100 << 8) | 200)]));

    let result = process_device(&cache, DeploymentMode::LocalOnly, Factory::validation(), &first);
    assert!(result.events.is_empty());

    let result = process_device(&cache, DeploymentMode::LocalOnly, Factory::validation(), &second);
    let map = result.map.unwrap();
    assert_eq!(map.value("state_of_charge"), Some(42.0));
    assert_eq!(map.value("bank_soc"), Some(42.0));

    let event = result
        .events
        .iter()
        .find(|e| e.field == "state_of_charge")
        .unwrap();
    assert_eq!(event.device_id, "inv1");
    assert_eq!(event.reason, RejectionReason::CanaryViolation);
    assert_eq!(event.rejected_value, 200.0);
    assert_eq!(event.retained_value, Some(42.0));
}

#[test]
fn canary_disabled() {
    common_setup();

    let validation = ValidationConfig {
        canary: false,
        monotonic: true,
    };
    let poll = inverter("inv1", Factory::inverter_block_with(&[(5, (100 << 8) | 200)]));
    let result = process_device(&StateCache::new(), DeploymentMode::LocalOnly, validation, &poll);

    assert_eq!(result.map.unwrap().value("state_of_charge"), Some(200.0));
    assert!(result.events.is_empty());
}

#[test]
fn counters_never_go_backwards() {
    common_setup();

    let cache = StateCache::new();
    let first = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![inverter("inv1", Factory::inverter_block())],
    );
    let second = group_poll(
        DeploymentMode::LocalOnly,
        None,
        vec![inverter("inv1", Factory::inverter_block_with(&[(40, 12000)]))],
    );

    let outcome = process_group(&cache, &first, Factory::validation());
    assert!(outcome.events.is_empty());

    let outcome = process_group(&cache, &second, Factory::validation());
    let inv1 = &outcome.devices["inv1"];
    assert_eq!(inv1.value("pv1_energy_total"), Some(1234.5));
    assert_eq!(inv1.value("yield_total"), Some(7788.1));

    let event = outcome
        .events
        .iter()
        .find(|e| e.device_id == "inv1" && e.field == "pv1_energy_total")
        .unwrap();
    assert_eq!(event.reason, RejectionReason::MonotonicityViolation);
    assert_eq!(event.rejected_value, 1200.0);
    assert_eq!(event.retained_value, Some(1234.5));

    // members are held before they are summed, so the group sees no drop
    assert!(outcome.events.iter().all(|e| e.device_id == "inv1"));
    assert_eq!(
        outcome.group.unwrap().value("yield_total"),
        Some(7788.1)
    );
}

#[test]
fn group_counters_have_their_own_state() {
    common_setup();

    let cache = StateCache::new();
    let result = |total: f64, events: Vec<ValidationEvent>| DeviceResult {
        device_id: "inv1".to_string(),
        kind: Some(DeviceKind::Inverter),
        map: Some(Factory::map(&[("grid_import_total", total)])),
        events,
        ..Default::default()
    };

    let outcome = coordinator::finish_group(
        &cache,
        "home",
        None,
        Factory::validation(),
        vec![result(250.0, Vec::new())],
    );
    assert!(outcome.events.is_empty());

    // a member whose own state was reset reports a lower total
    let device_event = ValidationEvent {
        device_id: "inv1".to_string(),
        field: "state_of_charge".to_string(),
        reason: RejectionReason::CanaryViolation,
        rejected_value: 255.0,
        retained_value: Some(50.0),
    };
    let outcome = coordinator::finish_group(
        &cache,
        "home",
        None,
        Factory::validation(),
        vec![result(240.0, vec![device_event.clone()])],
    );

    assert_eq!(
        outcome.group.unwrap().value("grid_import_total"),
        Some(250.0)
    );
    assert_eq!(outcome.events.len(), 2);
    // device events come before group events
    assert_eq!(outcome.events[0], device_event);
    assert_eq!(outcome.events[1].device_id, "group:home");
    assert_eq!(outcome.events[1].field, "grid_import_total");
    assert_eq!(outcome.events[1].retained_value, Some(250.0));
    assert!(cache.contains("group:home"));
}

#[test]
fn controller_dropout_does_not_latch_inverter_totals() {
    common_setup();

    let cache = StateCache::new();
    let results = |load_total: Option<f64>| {
        let mut results = vec![DeviceResult {
            device_id: "inv1".to_string(),
            kind: Some(DeviceKind::Inverter),
            map: Some(Factory::map(&[("consumption_total", 5001.0)])),
            ..Default::default()
        }];
        if let Some(load_total) = load_total {
            results.push(DeviceResult {
                device_id: "gc1".to_string(),
                kind: Some(DeviceKind::GridController),
                map: Some(Factory::map(&[
                    ("load_energy_total", load_total),
                    ("ups_energy_total", 200.0),
                ])),
                ..Default::default()
            });
        }
        results
    };
    let consumption_total = |outcome: PollOutcome| outcome.group.unwrap().value("consumption_total");

    let outcome =
        coordinator::finish_group(&cache, "home", None, Factory::validation(), results(Some(1000.0)));
    assert_eq!(consumption_total(outcome), Some(1200.0));

    // controller missed this poll: the inverter figure stands in
    let outcome = coordinator::finish_group(&cache, "home", None, Factory::validation(), results(None));
    assert!(outcome.events.is_empty());
    assert_eq!(consumption_total(outcome), Some(5001.0));

    let outcome =
        coordinator::finish_group(&cache, "home", None, Factory::validation(), results(Some(1001.0)));
    assert!(outcome.events.is_empty());
    assert_eq!(consumption_total(outcome), Some(1201.0));

    // a controller counter that really goes backwards is still held
    let outcome =
        coordinator::finish_group(&cache, "home", None, Factory::validation(), results(Some(900.0)));
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].device_id, "group:home:overlay");
    assert_eq!(outcome.events[0].field, "consumption_total");
    assert_eq!(outcome.events[0].rejected_value, 1100.0);
    assert_eq!(outcome.events[0].retained_value, Some(1201.0));
    assert_eq!(consumption_total(outcome), Some(1201.0));

    // a controller without energy readings leaves the inverter figure on
    // the inverter history
    let mut partial = results(None);
    partial.push(DeviceResult {
        device_id: "gc1".to_string(),
        kind: Some(DeviceKind::GridController),
        map: Some(Factory::map(&[("grid_voltage_l1", 240.1)])),
        ..Default::default()
    });
    let outcome = coordinator::finish_group(&cache, "home", None, Factory::validation(), partial);
    assert!(outcome.events.is_empty());
    assert_eq!(consumption_total(outcome), Some(5001.0));
}

#[test]
fn battery_counters_are_tracked_per_module() {
    common_setup();

    let cache = StateCache::new();
    let first = inverter_with_batteries("inv1");
    process_device(&cache, DeploymentMode::LocalOnly, Factory::validation(), &first);

    let mut raw = Factory::inverter_sets(Factory::inverter_block());
    let mut older = Factory::battery_a();
    older.insert(3, 100);
    raw.push(RawFieldSet::registers(DeviceClass::Battery, older).with_unit(0));
    let second = DevicePoll::new("inv1", DeviceKind::Inverter, raw);

    let result = process_device(&cache, DeploymentMode::LocalOnly, Factory::validation(), &second);
    let (id, battery) = &result.batteries[0];
    assert_eq!(id, "inv1-battery0");
    assert_eq!(battery.value("cycle_count"), Some(120.0));
    assert!(result
        .events
        .iter()
        .any(|e| e.device_id == "inv1-battery0" && e.field == "cycle_count"));
}

#[test]
fn finish_group_merges_results() {
    common_setup();

    let cache = StateCache::new();
    let results = vec![
        DeviceResult {
            device_id: "inv1".to_string(),
            kind: Some(DeviceKind::Inverter),
            map: Some(Factory::map(&[("pv_total_power", 1000.0)])),
            ..Default::default()
        },
        DeviceResult {
            device_id: "inv2".to_string(),
            kind: Some(DeviceKind::Inverter),
            ..Default::default()
        },
    ];

    let outcome = coordinator::finish_group(&cache, "home", None, Factory::validation(), results);
    assert_eq!(outcome.devices.len(), 1);
    assert_eq!(
        outcome.group.unwrap().value("pv_total_power"),
        Some(1000.0)
    );
}

// snapshot files on disk {{{
fn write_json(dir: &std::path::Path, name: &str, value: serde_json::Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path.to_string_lossy().to_string()
}

fn registers_json(words: &[(u16, u16)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = words
        .iter()
        .map(|(address, word)| (address.to_string(), json!(word)))
        .collect();
    serde_json::Value::Object(map)
}

fn write_config(dir: &std::path::Path, output: &str) -> String {
    let inv1 = write_json(
        dir,
        "inv1.json",
        json!({
            "registers": registers_json(&Factory::inverter_words()),
            "batteries": [
                { "registers": { "0": 5321, "1": 50, "2": 25404, "3": 120 } },
                { "registers": { "0": 0, "1": 0 } }
            ]
        }),
    );
    let gc1 = write_json(
        dir,
        "gc1.json",
        json!({ "registers": registers_json(&Factory::grid_controller_words()) }),
    );
    let missing = dir.join("missing.json");

    let yaml = format!(
        r#"
groups:
  - name: home
    mode: local_only
    devices:
      - id: inv1
        kind: inverter
        registers: {}
      - id: inv2
        kind: inverter
        registers: {}
      - id: gc1
        kind: grid_controller
        registers: {}
interval: 0
output: {}
"#,
        inv1,
        missing.display(),
        gc1,
        output
    );
    let path = dir.join("config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path.to_string_lossy().to_string()
}
// }}}

#[tokio::test]
async fn coordinator_polls_configured_groups() {
    common_setup();

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.jsonl");
    let config_file = write_config(dir.path(), &output.to_string_lossy());
    let config = ConfigWrapper::new(config_file).unwrap();

    let coordinator = Coordinator::new(config);
    coordinator.cache().add("removed-device");
    coordinator.sync_states();
    assert!(coordinator.cache().contains("inv1"));
    assert!(coordinator.cache().contains("gc1"));
    assert!(!coordinator.cache().contains("removed-device"));

    let outcomes = coordinator.poll().await.unwrap();
    assert_eq!(outcomes.len(), 1);

    let outcome = &outcomes[0];
    // inv2's snapshot is missing
    assert_eq!(
        outcome.devices.keys().collect::<Vec<_>>(),
        vec!["gc1", "inv1"]
    );
    assert_eq!(
        outcome.batteries.keys().collect::<Vec<_>>(),
        vec!["inv1-battery0"]
    );
    let group = outcome.group.as_ref().unwrap();
    assert_eq!(group.value("pv_total_power"), Some(2700.0));
    assert_eq!(group.value("grid_import_power"), Some(1150.0));

    // battery and group state survive a resync
    coordinator.sync_states();
    assert!(coordinator.cache().contains("inv1-battery0"));
    assert!(coordinator.cache().contains("group:home"));
    assert!(coordinator.cache().contains("group:home:overlay"));

    let stats = coordinator.stats.lock().unwrap();
    assert_eq!(stats.polls(), 1);
    assert_eq!(stats.failed_reads(), 1);
}

#[tokio::test]
async fn app_writes_one_line_per_group() {
    common_setup();

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.jsonl");
    let config_file = write_config(dir.path(), &output.to_string_lossy());

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let options = Options {
        config_file,
        runtime: None,
        once: true,
    };
    eg4_normalizer::app(shutdown_rx, options).await.unwrap();
    drop(shutdown_tx);

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);

    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["group_id"], "home");
    assert!(record["timestamp"].is_string());
    assert_eq!(record["group"]["pv_total_power"], 2700.0);
    // applicable but unknown is null
    assert!(record["devices"]["gc1"]["ac_couple1_power"].is_null());
    assert!(record["devices"]["gc1"]
        .as_object()
        .unwrap()
        .contains_key("ac_couple1_power"));
}
