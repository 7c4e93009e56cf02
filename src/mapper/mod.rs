//! Raw register words or cloud JSON in, canonical keys out.
//!
//! Each `(Source, DeviceClass)` pair has exactly one static rule table. Raw
//! fields that no rule names are ignored, so richer payloads than the tables
//! know about map cleanly.

use crate::prelude::*;
use crate::validator::Canary;

use enum_dispatch::enum_dispatch;

pub mod cloud;
pub mod register;

pub use cloud::CloudMapper;
pub use register::RegisterMapper;

/// Relative difference above which a hybrid register/cloud pair is reported.
pub const CROSS_CHECK_TOLERANCE: f64 = 0.05;

/// A mapped field set together with the canary rule of each mapped key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappedFields {
    pub map: CanonicalSensorMap,
    pub canaries: Vec<(&'static str, Canary)>,
}

impl MappedFields {
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[enum_dispatch]
pub trait FieldMapper {
    fn map(&self, raw: &RawFieldSet) -> MappedFields;
}

#[enum_dispatch(FieldMapper)]
#[derive(Clone, Copy, Debug)]
pub enum Mapper {
    RegisterMapper,
    CloudMapper,
}

impl Mapper {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::RegisterTransport => RegisterMapper.into(),
            Source::CloudApi => CloudMapper.into(),
        }
    }
}

pub fn map(raw: &RawFieldSet) -> MappedFields {
    Mapper::for_source(raw.source).map(raw)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Divergence {
    pub key: String,
    pub register: f64,
    pub cloud: f64,
}

/// Compare keys both sources produced. Values within `tolerance` of each
/// other (relative to the larger magnitude) are considered equal.
pub fn cross_check(
    register: &CanonicalSensorMap,
    cloud: &CanonicalSensorMap,
    tolerance: f64,
) -> Vec<Divergence> {
    register
        .iter()
        .filter_map(|(key, value)| {
            let r = value.value()?;
            let c = cloud.value(key)?;
            let scale = r.abs().max(c.abs());
            if scale == 0.0 || (r - c).abs() / scale <= tolerance {
                None
            } else {
                Some(Divergence {
                    key: key.to_string(),
                    register: r,
                    cloud: c,
                })
            }
        })
        .collect()
}
