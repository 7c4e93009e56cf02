pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;

pub use crate::catalog;
pub use crate::codec::{self, Divisor, ScaleDescriptor, Signedness, Width, WordOrder};
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator::{DeploymentMode, DeviceKind};
pub use crate::options::Options;
pub use crate::raw::{DeviceClass, RawFieldSet, RawFields, RegisterBlock, Source};
pub use crate::sensor::{CanonicalSensorMap, SensorValue};
pub use crate::validator::{RejectionReason, ValidationEvent};
