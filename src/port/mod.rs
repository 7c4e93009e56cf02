use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

pub mod filter;

pub const PORT_COUNT: usize = 4;

/// Canonical keys of one port in one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortKeys {
    pub power_l1: &'static str,
    pub power_l2: &'static str,
    pub power: &'static str,
    pub energy_today: &'static str,
    pub energy_total: &'static str,
}

impl PortKeys {
    pub fn power_keys(&self) -> [&'static str; 3] {
        [self.power_l1, self.power_l2, self.power]
    }

    pub fn all(&self) -> [&'static str; 5] {
        [
            self.power_l1,
            self.power_l2,
            self.power,
            self.energy_today,
            self.energy_total,
        ]
    }
}

macro_rules! port_keys {
    ($prefix:literal, $n:literal) => {
        PortKeys {
            power_l1: concat!($prefix, $n, "_power_l1"),
            power_l2: concat!($prefix, $n, "_power_l2"),
            power: concat!($prefix, $n, "_power"),
            energy_today: concat!($prefix, $n, "_energy_today"),
            energy_total: concat!($prefix, $n, "_energy_total"),
        }
    };
}

pub static LOAD_PORTS: [PortKeys; PORT_COUNT] = [
    port_keys!("smart_load", 1),
    port_keys!("smart_load", 2),
    port_keys!("smart_load", 3),
    port_keys!("smart_load", 4),
];

pub static SOURCE_PORTS: [PortKeys; PORT_COUNT] = [
    port_keys!("ac_couple", 1),
    port_keys!("ac_couple", 2),
    port_keys!("ac_couple", 3),
    port_keys!("ac_couple", 4),
];

pub static STATUS_KEYS: [&str; PORT_COUNT] = [
    "smart_port1_status",
    "smart_port2_status",
    "smart_port3_status",
    "smart_port4_status",
];

// PortMode {{{
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    #[default]
    Unused = 0,
    Load = 1,
    Source = 2,
}

impl PortMode {
    /// Slot value 3 is reserved; it (and anything wider) is read as `Unused`.
    pub fn from_slot(port: usize, slot: u16) -> Self {
        match u8::try_from(slot).ok().map(Self::try_from) {
            Some(Ok(mode)) => mode,
            _ => {
                warn!(
                    "smart port {} reports reserved mode {}, treating as unused",
                    port + 1,
                    slot
                );
                Self::Unused
            }
        }
    }
} // }}}

// PortState {{{
/// Mode of each of the grid controller's four smart ports.
///
/// Users can reconfigure ports at any time, so this is rebuilt from every poll
/// and never cached.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PortState([PortMode; PORT_COUNT]);

impl PortState {
    pub fn new(modes: [PortMode; PORT_COUNT]) -> Self {
        Self(modes)
    }

    /// Slot `i` is bits `2i..2i+2` of the mode register.
    pub fn decode(raw: u16) -> Self {
        let mut slots = [0; PORT_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = codec::unpack(raw, (i * 2) as u8, 2);
        }
        Self::from_slots(slots)
    }

    pub fn from_slots(slots: [u16; PORT_COUNT]) -> Self {
        let mut modes = [PortMode::Unused; PORT_COUNT];
        for (i, (mode, slot)) in modes.iter_mut().zip(slots).enumerate() {
            *mode = PortMode::from_slot(i, slot);
        }
        Self(modes)
    }

    /// Build from the `smart_portN_status` keys of a mapped grid controller.
    /// `None` when the poll carried no port status at all.
    pub fn from_map(map: &CanonicalSensorMap) -> Option<Self> {
        let values: Vec<Option<f64>> = STATUS_KEYS.iter().map(|key| map.value(key)).collect();
        if values.iter().all(Option::is_none) {
            return None;
        }

        let mut slots = [0; PORT_COUNT];
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = match value {
                Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u16::MAX) => v as u16,
                Some(v) => {
                    warn!("smart port status {} is not a mode value", v);
                    u16::MAX
                }
                None => 0,
            };
        }
        Some(Self::from_slots(slots))
    }

    pub fn encode(&self) -> u16 {
        self.0.iter().enumerate().fold(0, |word, (i, mode)| {
            codec::pack(word, u16::from(u8::from(*mode)), (i * 2) as u8, 2)
        })
    }

    pub fn modes(&self) -> [PortMode; PORT_COUNT] {
        self.0
    }

    /// `port` is zero-based.
    pub fn mode(&self, port: usize) -> PortMode {
        self.0.get(port).copied().unwrap_or_default()
    }

    pub fn count(&self, mode: PortMode) -> usize {
        self.0.iter().filter(|m| **m == mode).count()
    }
} // }}}
