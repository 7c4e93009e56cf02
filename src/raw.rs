use crate::prelude::*;

use nom::{combinator::all_consuming, multi::many0, number::complete::le_u16, IResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    RegisterTransport,
    CloudApi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    InverterRuntime,
    InverterEnergy,
    Battery,
    BatteryBank,
    GridController,
}

// RegisterBlock {{{
/// Sparse register address -> word map. An address that is not in the map
/// was not read this poll.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterBlock {
    words: BTreeMap<u16, u16>,
}

impl RegisterBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(start: u16, words: &[u16]) -> Self {
        let mut block = Self::new();
        block.insert_words(start, words);
        block
    }

    /// Build from a translated-data frame: `values` holds little-endian word
    /// pairs starting at `register`.
    pub fn from_frame(register: u16, values: &[u8]) -> Result<Self> {
        let mut block = Self::new();
        block.extend_from_frame(register, values)?;
        Ok(block)
    }

    pub fn extend_from_frame(&mut self, register: u16, values: &[u8]) -> Result<()> {
        let parsed: IResult<&[u8], Vec<u16>> = all_consuming(many0(le_u16))(values);
        match parsed {
            Ok((_, words)) => {
                if usize::from(register) + words.len() > usize::from(u16::MAX) + 1 {
                    bail!(
                        "frame at register {} with {} words runs past the address space",
                        register,
                        words.len()
                    );
                }
                self.insert_words(register, &words);
                Ok(())
            }
            Err(err) => bail!(
                "frame at register {} is not a whole number of words (len={}): {:?}",
                register,
                values.len(),
                err
            ),
        }
    }

    fn insert_words(&mut self, start: u16, words: &[u16]) {
        for (address, word) in (start..=u16::MAX).zip(words) {
            self.words.insert(address, *word);
        }
    }

    pub fn insert(&mut self, address: u16, word: u16) {
        self.words.insert(address, word);
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        self.words.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Battery modules that dropped off the BMS bus report a block of zeros.
    pub fn all_zero(&self) -> bool {
        self.words.values().all(|word| *word == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.words.iter().map(|(address, word)| (*address, *word))
    }
} // }}}

#[derive(Clone, Debug, PartialEq)]
pub enum RawFields {
    Registers(RegisterBlock),
    Json(serde_json::Map<String, serde_json::Value>),
}

/// One poll's worth of raw data for one device class from one source.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFieldSet {
    pub source: Source,
    pub class: DeviceClass,
    /// Sub-unit index, set for battery modules.
    pub unit: Option<u16>,
    pub fields: RawFields,
}

impl RawFieldSet {
    pub fn registers(class: DeviceClass, block: RegisterBlock) -> Self {
        Self {
            source: Source::RegisterTransport,
            class,
            unit: None,
            fields: RawFields::Registers(block),
        }
    }

    pub fn cloud(class: DeviceClass, object: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            source: Source::CloudApi,
            class,
            unit: None,
            fields: RawFields::Json(object),
        }
    }

    pub fn with_unit(mut self, unit: u16) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn block(&self) -> Option<&RegisterBlock> {
        match &self.fields {
            RawFields::Registers(block) => Some(block),
            RawFields::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match &self.fields {
            RawFields::Json(object) => Some(object),
            RawFields::Registers(_) => None,
        }
    }
}
