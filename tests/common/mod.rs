#![allow(dead_code)]

pub use eg4_normalizer::coordinator::{DevicePoll, GroupPoll};
pub use eg4_normalizer::prelude::*;
pub use eg4_normalizer::state_cache::StateCache;
pub use eg4_normalizer::validator::ValidationConfig;
pub use serde_json::json;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    match actual {
        Some(v) => assert!(
            (v - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            v
        ),
        None => panic!("expected {}, got nothing", expected),
    }
}

pub struct Factory;
impl Factory {
    pub fn map(pairs: &[(&str, f64)]) -> CanonicalSensorMap {
        let mut map = CanonicalSensorMap::new();
        for (key, value) in pairs {
            map.insert(*key, *value);
        }
        map
    }

    pub fn block(words: &[(u16, u16)]) -> RegisterBlock {
        let mut block = RegisterBlock::new();
        for (address, word) in words {
            block.insert(*address, *word);
        }
        block
    }

    /// One inverter's input registers 0..=130: 2.7 kW of PV, charging at
    /// 800 W, exporting 200 W.
    pub fn inverter_words() -> Vec<(u16, u16)> {
        vec![
            (0, 16),
            (1, 3805),
            (2, 3790),
            (3, 0),
            (4, 532),
            (5, (100 << 8) | 50),
            (7, 1500),
            (8, 1200),
            (9, 0),
            (10, 800),
            (11, 0),
            (12, 2405),
            (13, 2398),
            (14, 0),
            (15, 5998),
            (16, 1900),
            (17, 0),
            (19, 1000),
            (20, 2400),
            (21, 2400),
            (22, 0),
            (23, 5999),
            (24, 300),
            (26, 200),
            (27, 0),
            (28, 125),
            (29, 98),
            (30, 0),
            (31, 150),
            (32, 0),
            (33, 60),
            (34, 40),
            (35, 10),
            (36, 30),
            (37, 20),
            (38, 3800),
            (39, 3790),
            (40, 12345),
            (41, 0),
            (42, 0),
            (43, 1),
            (44, 0),
            (45, 0),
            (46, 20000),
            (47, 0),
            (48, 0),
            (49, 0),
            (50, 5000),
            (51, 0),
            (52, 4000),
            (53, 0),
            (54, 100),
            (55, 0),
            (56, 3000),
            (57, 0),
            (58, 2500),
            (59, 0),
            (64, 45),
            (65, 40),
            (66, 41),
            (67, 25),
            (81, 20000),
            (82, 20000),
            (83, 560),
            (84, 480),
            (96, 3),
            (97, 840),
            (98, 150),
            (101, 3350),
            (102, 3310),
            (103, 250),
            (104, 220),
            (106, 120),
        ]
    }

    pub fn inverter_block() -> RegisterBlock {
        Self::block(&Self::inverter_words())
    }

    /// Factory inverter with some words replaced.
    pub fn inverter_block_with(overrides: &[(u16, u16)]) -> RegisterBlock {
        let mut block = Self::inverter_block();
        for (address, word) in overrides {
            block.insert(*address, *word);
        }
        block
    }

    pub fn inverter_sets(block: RegisterBlock) -> Vec<RawFieldSet> {
        [
            DeviceClass::InverterRuntime,
            DeviceClass::InverterEnergy,
            DeviceClass::BatteryBank,
        ]
        .into_iter()
        .map(|class| RawFieldSet::registers(class, block.clone()))
        .collect()
    }

    /// Module block: 53.21 V, 60 % / 99 %, 120 cycles, cells 3.350-3.320 V.
    pub fn battery_a() -> RegisterBlock {
        RegisterBlock::from_words(
            0,
            &[5321, 50, (99 << 8) | 60, 120, 3350, 3320, 260, 240, 95, 100],
        )
    }

    /// Module block: 53.10 V, 58 % / 97 %, 135 cycles, cells 3.360-3.310 V.
    pub fn battery_b() -> RegisterBlock {
        RegisterBlock::from_words(
            0,
            &[5310, 45, (97 << 8) | 58, 135, 3360, 3310, 280, 250, 92, 100],
        )
    }

    /// A module that stopped answering the BMS.
    pub fn battery_ghost() -> RegisterBlock {
        RegisterBlock::from_words(0, &[0; 10])
    }

    pub fn battery_sets() -> Vec<RawFieldSet> {
        [Self::battery_a(), Self::battery_ghost(), Self::battery_b()]
            .into_iter()
            .enumerate()
            .map(|(i, block)| {
                RawFieldSet::registers(DeviceClass::Battery, block).with_unit(i as u16)
            })
            .collect()
    }

    /// Port 1 load, port 2 AC-coupled source, port 3 unused, port 4 load.
    pub const PORT_WORD: u16 = 1 | (2 << 2) | (1 << 6);

    pub fn grid_controller_words() -> Vec<(u16, u16)> {
        vec![
            (1, 2401),
            (2, 2399),
            (3, 2400),
            (4, 2400),
            (5, 0),
            (6, 0),
            (7, 1250),
            (8, 1150),
            (15, 600),
            (16, 550),
            (17, 300),
            (18, 280),
            (21, 900),
            (22, 850),
            (23, 200),
            (24, 150),
            (25, 400),
            (26, 380),
            (27, 0),
            (28, 0),
            (29, 50),
            (30, 40),
            (31, 6000),
            (32, 0),
            (34, Self::PORT_WORD),
            (40, 85),
            (41, 12),
            (42, 150),
            (43, 40),
            (48, 23),
            (49, 31),
            (50, 0),
            (51, 5),
            (60, 45000),
            (61, 0),
            (62, 10000),
            (63, 0),
            (64, 14464),
            (65, 1),
            (66, 20000),
            (67, 0),
        ]
    }

    pub fn grid_controller_block() -> RegisterBlock {
        Self::block(&Self::grid_controller_words())
    }

    pub fn grid_controller_sets() -> Vec<RawFieldSet> {
        vec![RawFieldSet::registers(
            DeviceClass::GridController,
            Self::grid_controller_block(),
        )]
    }

    pub fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(object) => object,
            _ => panic!("not an object"),
        }
    }

    pub fn cloud_runtime() -> serde_json::Map<String, serde_json::Value> {
        Self::object(json!({
            "status": 16,
            "vpv1": 3800,
            "vpv2": "3790",
            "vpv3": null,
            "ppv1": 1490,
            "ppv2": 1210,
            "ppv3": "",
            "vBat": 531,
            "soc": 55,
            "soh": 100,
            "pCharge": 790,
            "pDisCharge": 0,
            "vacr": 2404,
            "fac": 5999,
            "pToGrid": 210,
            "pToUser": 0,
            "tinner": 44,
            "serverTime": "2024-06-01 12:00:00"
        }))
    }

    pub fn cloud_energy() -> serde_json::Map<String, serde_json::Value> {
        Self::object(json!({
            "todayYielding": 223,
            "todayCharging": 60,
            "todayDischarging": 40,
            "todayImport": 20,
            "todayExport": 30,
            "todayUsage": 180,
            "totalYielding": 77881,
            "totalImport": 2500,
            "totalExport": 3000
        }))
    }

    pub fn cloud_midbox() -> serde_json::Map<String, serde_json::Value> {
        Self::object(json!({
            "gridL1RmsVolt": 2401,
            "gridL2RmsVolt": 2399,
            "upsL1RmsVolt": 2400,
            "upsL2RmsVolt": 2400,
            "gridL1RmsCurr": 125,
            "gridL1ActivePower": 600,
            "gridL2ActivePower": 550,
            "upsPower": 600,
            "smartLoad1L1ActivePower": 200,
            "smartLoad1L2ActivePower": 150,
            "acCouple2L1ActivePower": 400,
            "acCouple2L2ActivePower": 380,
            "smartPort1Status": 1,
            "smartPort2Status": 2,
            "smartPort3Status": 0,
            "smartPort4Status": 0,
            "gridFreq": 6000,
            "eLoadToday": 150,
            "eUpsToday": 40
        }))
    }

    pub fn validation() -> ValidationConfig {
        ValidationConfig {
            canary: true,
            monotonic: true,
        }
    }
}
