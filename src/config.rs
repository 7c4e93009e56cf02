use crate::prelude::*;
use crate::validator::ValidationConfig;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub groups: Vec<Group>,

    #[serde(default)]
    pub validation: Validation,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Seconds between polls; zero polls once and exits.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_interval")]
    pub interval: Duration,

    /// JSON lines go here instead of stdout when set
    pub output: Option<String>,
}

// Group {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Group {
    pub name: String,

    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub mode: DeploymentMode,

    /// Inverter whose grid readings stand in when no grid controller reports
    pub primary: Option<String>,

    pub devices: Vec<Device>,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn enabled_devices(&self) -> Vec<Device> {
        self.devices.iter().filter(|d| d.enabled()).cloned().collect()
    }
} // }}}

// Device {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,

    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    /// Register snapshot path
    pub registers: Option<String>,
    /// Cloud API snapshot path
    pub cloud: Option<String>,
}

impl Device {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn registers(&self) -> Option<&str> {
        self.registers.as_deref()
    }

    pub fn cloud(&self) -> Option<&str> {
        self.cloud.as_deref()
    }
} // }}}

// Validation {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Validation {
    /// Unset means "on when the group reads registers".
    pub canary: Option<bool>,

    #[serde(default = "Config::default_enabled")]
    pub monotonic: bool,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            canary: None,
            monotonic: Config::default_enabled(),
        }
    }
}

impl Validation {
    pub fn for_mode(&self, mode: DeploymentMode) -> ValidationConfig {
        ValidationConfig {
            canary: self.canary.unwrap_or_else(|| mode.uses_registers()),
            monotonic: self.monotonic,
        }
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn config(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn groups(&self) -> Vec<Group> {
        self.config().groups.clone()
    }

    pub fn set_groups(&self, new: Vec<Group>) {
        self.config().groups = new;
    }

    pub fn enabled_groups(&self) -> Vec<Group> {
        self.groups().into_iter().filter(|g| g.enabled()).collect()
    }

    pub fn group_with_name(&self, name: &str) -> Option<Group> {
        self.groups().into_iter().find(|g| g.name() == name)
    }

    /// Ids of every enabled device in every enabled group.
    pub fn enabled_device_ids(&self) -> Vec<String> {
        self.enabled_groups()
            .iter()
            .flat_map(|g| g.enabled_devices())
            .map(|d| d.id)
            .collect()
    }

    pub fn validation(&self) -> Validation {
        self.config().validation.clone()
    }

    pub fn loglevel(&self) -> String {
        self.config().loglevel.clone()
    }

    pub fn interval(&self) -> Duration {
        self.config().interval
    }

    pub fn output(&self) -> Option<String> {
        self.config().output.clone()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| crate::file_error!("error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!(
            "  Groups: {} configured, {} enabled",
            config.groups.len(),
            config.groups.iter().filter(|g| g.enabled).count()
        );
        for (i, group) in config.groups.iter().enumerate() {
            info!("    Group[{}]: {}", i, group.name);
            info!("      Enabled: {}", group.enabled);
            info!("      Mode: {:?}", group.mode);
            info!("      Primary: {}", group.primary.as_deref().unwrap_or_default());
            for device in &group.devices {
                info!(
                    "      Device {} ({:?}, {}): registers={} cloud={}",
                    device.id,
                    device.kind,
                    if device.enabled { "enabled" } else { "disabled" },
                    device.registers.as_deref().unwrap_or("-"),
                    device.cloud.as_deref().unwrap_or("-"),
                );
            }
        }
        info!(
            "  Canary checks: {}",
            match config.validation.canary {
                Some(true) => "enabled",
                Some(false) => "disabled",
                None => "per group mode",
            }
        );
        info!("  Monotonic checks: {}", config.validation.monotonic);
        info!("  Interval: {}s", config.interval.as_secs());
        info!("  Output: {}", config.output.as_deref().unwrap_or("stdout"));
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            bail!("at least one group must be configured");
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        for (i, group) in self.groups.iter().enumerate() {
            if group.name.is_empty() {
                bail!("groups[{}].name cannot be empty", i);
            }
            if !names.insert(group.name.as_str()) {
                bail!("group name {} is used more than once", group.name);
            }
            if group.devices.is_empty() {
                bail!("group {} has no devices", group.name);
            }

            for device in &group.devices {
                if device.id.is_empty() {
                    bail!("group {} has a device with an empty id", group.name);
                }
                if !ids.insert(device.id.as_str()) {
                    bail!("device id {} is used more than once", device.id);
                }

                match group.mode {
                    DeploymentMode::LocalOnly if device.registers.is_none() => {
                        bail!("device {} needs a registers snapshot in local_only mode", device.id)
                    }
                    DeploymentMode::CloudOnly if device.cloud.is_none() => {
                        bail!("device {} needs a cloud snapshot in cloud_only mode", device.id)
                    }
                    DeploymentMode::Hybrid
                        if device.registers.is_none() && device.cloud.is_none() =>
                    {
                        bail!("device {} needs a registers or cloud snapshot", device.id)
                    }
                    _ => {}
                }
            }

            if let Some(primary) = &group.primary {
                let is_inverter = group
                    .devices
                    .iter()
                    .any(|d| &d.id == primary && d.kind == DeviceKind::Inverter);
                if !is_inverter {
                    bail!(
                        "group {} primary {} is not an inverter in the group",
                        group.name,
                        primary
                    );
                }
            }
        }

        Ok(())
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_interval() -> Duration {
        Duration::from_secs(30)
    }
}
