mod common;
use common::*;

use eg4_normalizer::snapshot;

#[test]
fn inverter_register_snapshot() {
    common_setup();

    let content = r#"{
        "frames": [ { "register": 0, "values": [16, 0, 0, 0] } ],
        "registers": { "1": 3805, "5": 12850 },
        "batteries": [
            { "registers": { "0": 5321, "2": 25404 } },
            { "frames": [ { "register": 0, "values": [0, 0, 0, 0] } ] }
        ]
    }"#;

    let sets = snapshot::parse_registers(content, DeviceKind::Inverter).unwrap();
    let classes: Vec<DeviceClass> = sets.iter().map(|s| s.class).collect();
    assert_eq!(
        classes,
        vec![
            DeviceClass::InverterRuntime,
            DeviceClass::InverterEnergy,
            DeviceClass::BatteryBank,
            DeviceClass::Battery,
            DeviceClass::Battery,
        ]
    );

    let main = sets[0].block().unwrap();
    assert_eq!(main.get(0), Some(16));
    // explicit words win over frame words
    assert_eq!(main.get(1), Some(3805));
    assert_eq!(main.get(5), Some(12850));
    assert!(sets.iter().all(|s| s.source == Source::RegisterTransport));

    assert_eq!(sets[3].unit, Some(0));
    assert_eq!(sets[4].unit, Some(1));
    assert!(sets[4].block().unwrap().all_zero());
}

#[test]
fn grid_controller_register_snapshot() {
    common_setup();

    let sets = snapshot::parse_registers(
        r#"{ "registers": { "34": 73 }, "batteries": [ { "registers": { "0": 1 } } ] }"#,
        DeviceKind::GridController,
    )
    .unwrap();

    // grid controllers have no battery modules
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].class, DeviceClass::GridController);
    assert_eq!(sets[0].block().unwrap().get(34), Some(Factory::PORT_WORD));
}

#[test]
fn bad_frame_is_an_error() {
    common_setup();

    let err = snapshot::parse_registers(
        r#"{ "frames": [ { "register": 0, "values": [1, 2, 3] } ] }"#,
        DeviceKind::Inverter,
    )
    .unwrap_err();
    assert!(err.to_string().contains("whole number of words"));
}

#[test]
fn inverter_cloud_snapshot() {
    common_setup();

    let content = json!({
        "runtime": { "soc": 55, "vpv1": "3800" },
        "energy": { "todayYielding": 223 },
        "battery": {
            "soc": 55,
            "totalNumber": 2,
            "batteryArray": [
                { "batIndex": 4, "totalVoltage": 5321, "soc": 60 },
                "garbage",
                { "totalVoltage": 5310 }
            ]
        }
    })
    .to_string();

    let sets = snapshot::parse_cloud(&content, DeviceKind::Inverter).unwrap();
    assert!(sets.iter().all(|s| s.source == Source::CloudApi));
    assert_eq!(sets.len(), 5);
    assert_eq!(sets[0].class, DeviceClass::InverterRuntime);
    assert_eq!(sets[1].class, DeviceClass::InverterEnergy);

    assert_eq!(sets[2].class, DeviceClass::BatteryBank);
    assert!(!sets[2].json().unwrap().contains_key("batteryArray"));

    assert_eq!(sets[3].class, DeviceClass::Battery);
    assert_eq!(sets[3].unit, Some(4));
    // no batIndex: position in the array
    assert_eq!(sets[4].unit, Some(2));
}

#[test]
fn bad_battery_index_uses_position() {
    common_setup();

    let content = json!({
        "battery": {
            "batteryArray": [
                { "batIndex": 0, "totalVoltage": 5321 },
                { "batIndex": -1, "totalVoltage": 5310 },
                { "batIndex": 0.5, "totalVoltage": 5300 },
                { "batIndex": "3", "totalVoltage": 5290 }
            ]
        }
    })
    .to_string();

    let sets = snapshot::parse_cloud(&content, DeviceKind::Inverter).unwrap();
    let units: Vec<Option<u16>> = sets
        .iter()
        .filter(|s| s.class == DeviceClass::Battery)
        .map(|s| s.unit)
        .collect();
    assert_eq!(units, vec![Some(0), Some(1), Some(2), Some(3)]);
}

#[test]
fn grid_controller_cloud_snapshot() {
    common_setup();

    let content = json!({ "midboxData": Factory::cloud_midbox(), "runtime": {} }).to_string();
    let sets = snapshot::parse_cloud(&content, DeviceKind::GridController).unwrap();

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].class, DeviceClass::GridController);
    assert_eq!(
        sets[0].json().unwrap().get("upsPower"),
        Some(&json!(600))
    );
}

#[test]
fn cloud_snapshot_must_be_an_object() {
    common_setup();

    assert!(snapshot::parse_cloud("[1, 2]", DeviceKind::Inverter).is_err());
    assert!(snapshot::parse_cloud("{", DeviceKind::Inverter).is_err());
}

#[test]
fn load_device_skips_missing_sources() {
    common_setup();

    let dir = tempfile::tempdir().unwrap();
    let cloud = dir.path().join("gc1-cloud.json");
    std::fs::write(&cloud, json!({ "midboxData": { "gridFreq": 6000 } }).to_string()).unwrap();

    let device = config::Device {
        id: "gc1".to_string(),
        kind: DeviceKind::GridController,
        enabled: true,
        registers: Some(dir.path().join("missing.json").to_string_lossy().to_string()),
        cloud: Some(cloud.to_string_lossy().to_string()),
    };

    let sets = snapshot::load_device(&device);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].source, Source::CloudApi);

    let err = snapshot::load_registers(&dir.path().join("missing.json"), DeviceKind::Inverter)
        .unwrap_err();
    assert!(err.to_string().contains("error reading"));
}
