//! Driver configuration management

use crate::instance::InstanceSettings;
use crate::transport::PollPolicy;
use crate::usb::DeviceMatch;
use anyhow::{Context, Result, anyhow};
use protocol::{CommandId, Completion, DEFAULT_SLAVE_ADDRESS, START_SEQUENCE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub polling: PollingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    pub log_level: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ID in hex, e.g. "0x10c4"
    #[serde(default = "UsbSettings::default_vendor_id")]
    pub vendor_id: String,
    /// Product ID in hex, e.g. "0x8244"
    #[serde(default = "UsbSettings::default_product_id")]
    pub product_id: String,
    /// HID interface number
    #[serde(default)]
    pub interface: u8,
    /// Timeout of a single control transfer in milliseconds
    #[serde(default = "UsbSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// I2C address the chip client talks to
    #[serde(default = "UsbSettings::default_slave_address")]
    pub slave_address: u16,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            interface: 0,
            timeout_ms: Self::default_timeout_ms(),
            slave_address: Self::default_slave_address(),
        }
    }
}

impl UsbSettings {
    fn default_vendor_id() -> String {
        format!("{:#06x}", protocol::USB_VENDOR_ID)
    }

    fn default_product_id() -> String {
        format!("{:#06x}", protocol::USB_PRODUCT_ID)
    }

    fn default_timeout_ms() -> u64 {
        1000
    }

    fn default_slave_address() -> u16 {
        DEFAULT_SLAVE_ADDRESS
    }
}

/// Busy-poll tuning
///
/// # Example Configuration
/// ```toml
/// [polling]
/// interval_ms = 3
/// command_attempts = 100
/// fail_on_exhaustion = true
///
/// [polling.completion]
/// power-down = "clear-to-send"
/// tune-status = { clear-to-send-echo = { offset = 3, value = 0 } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Sleep between two receives in milliseconds
    #[serde(default = "PollingSettings::default_interval_ms")]
    pub interval_ms: u64,
    /// Receive budget per start step
    #[serde(default = "PollingSettings::default_startup_attempts")]
    pub startup_attempts: u32,
    /// Receive budget per command
    #[serde(default = "PollingSettings::default_command_attempts")]
    pub command_attempts: u32,
    /// Raise NotReady instead of returning the last response when the budget runs out
    #[serde(default)]
    pub fail_on_exhaustion: bool,
    /// Completion overrides keyed by command name
    #[serde(default)]
    pub completion: BTreeMap<String, Completion>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
            startup_attempts: Self::default_startup_attempts(),
            command_attempts: Self::default_command_attempts(),
            fail_on_exhaustion: false,
            completion: BTreeMap::new(),
        }
    }
}

impl PollingSettings {
    fn default_interval_ms() -> u64 {
        PollPolicy::COMMAND.interval.as_millis() as u64
    }

    fn default_startup_attempts() -> u32 {
        PollPolicy::STARTUP.max_attempts
    }

    fn default_command_attempts() -> u32 {
        PollPolicy::COMMAND.max_attempts
    }

    fn policy(&self, max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts,
            fail_on_exhaustion: self.fail_on_exhaustion,
        }
    }
}

impl DriverConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/si4713-usb/driver.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("si4713-usb").join("driver.toml")
        } else {
            PathBuf::from(".config/si4713-usb/driver.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.driver.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.driver.log_level,
                valid_levels.join(", ")
            ));
        }

        Self::parse_hex_id(&self.usb.vendor_id, "vendor_id")?;
        Self::parse_hex_id(&self.usb.product_id, "product_id")?;

        if self.usb.timeout_ms == 0 {
            return Err(anyhow!("usb.timeout_ms must be greater than 0"));
        }
        if self.usb.slave_address > 0x7f {
            return Err(anyhow!(
                "Invalid slave_address {:#x}, must be a 7-bit address",
                self.usb.slave_address
            ));
        }

        if self.polling.startup_attempts == 0 || self.polling.command_attempts == 0 {
            return Err(anyhow!("Polling attempt budgets must be at least 1"));
        }

        self.completion_overrides()?;
        Ok(())
    }

    /// Parse a hex ID such as "0x10c4"
    fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}', must start with '0x' (e.g., '0x10c4')",
                    name,
                    id
                )
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
    }

    fn completion_overrides(&self) -> Result<HashMap<CommandId, Completion>> {
        self.polling
            .completion
            .iter()
            .map(|(name, completion)| {
                let id: CommandId = name
                    .parse()
                    .with_context(|| format!("Invalid [polling.completion] entry '{}'", name))?;
                Ok((id, *completion))
            })
            .collect()
    }

    /// Protocol settings for a new instance
    pub fn instance_settings(&self) -> Result<InstanceSettings> {
        Ok(InstanceSettings {
            startup_poll: self.polling.policy(self.polling.startup_attempts),
            command_poll: self.polling.policy(self.polling.command_attempts),
            completion_overrides: self.completion_overrides()?,
            start_sequence: &START_SEQUENCE,
        })
    }

    /// Which boards to bind
    pub fn device_match(&self) -> Result<DeviceMatch> {
        Ok(DeviceMatch {
            vendor_id: Self::parse_hex_id(&self.usb.vendor_id, "vendor_id")?,
            product_id: Self::parse_hex_id(&self.usb.product_id, "product_id")?,
            interface: self.usb.interface,
            timeout: Duration::from_millis(self.usb.timeout_ms),
        })
    }
}

/// Load a configuration file, expanding a leading `~`
pub fn load_config(path: &str) -> Result<DriverConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    DriverConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.driver.log_level, "info");
        assert_eq!(config.usb.vendor_id, "0x10c4");
        assert_eq!(config.usb.product_id, "0x8244");
        assert_eq!(config.usb.slave_address, 0x63);
        assert_eq!(config.polling.interval_ms, 3);
        assert_eq!(config.polling.startup_attempts, 15);
        assert_eq!(config.polling.command_attempts, 100);
        assert!(!config.polling.fail_on_exhaustion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(DriverConfig::parse_hex_id("0x10c4", "vid").unwrap(), 0x10c4);
        assert_eq!(DriverConfig::parse_hex_id("0X8244", "pid").unwrap(), 0x8244);
        assert!(DriverConfig::parse_hex_id("10c4", "vid").is_err());
        assert!(DriverConfig::parse_hex_id("0x", "vid").is_err());
        assert!(DriverConfig::parse_hex_id("0x12345", "vid").is_err());
        assert!(DriverConfig::parse_hex_id("0xGHIJ", "vid").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = DriverConfig::default();
        config
            .polling
            .completion
            .insert("power-down".to_string(), Completion::ClearToSend);
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DriverConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.driver.log_level, parsed.driver.log_level);
        assert_eq!(config.usb.timeout_ms, parsed.usb.timeout_ms);
        assert_eq!(
            parsed.polling.completion.get("power-down"),
            Some(&Completion::ClearToSend)
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DriverConfig::default();
        config.driver.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.driver.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_completion_command_rejected() {
        let mut config = DriverConfig::default();
        config
            .polling
            .completion
            .insert("self-destruct".to_string(), Completion::Accepted);
        assert!(config.validate().is_err());
        assert!(config.instance_settings().is_err());
    }

    #[test]
    fn test_instance_settings_from_polling() {
        let mut config = DriverConfig::default();
        config.polling.interval_ms = 5;
        config.polling.command_attempts = 7;
        config.polling.fail_on_exhaustion = true;
        config
            .polling
            .completion
            .insert("power-down".to_string(), Completion::ClearToSend);

        let settings = config.instance_settings().unwrap();
        assert_eq!(settings.command_poll.interval, Duration::from_millis(5));
        assert_eq!(settings.command_poll.max_attempts, 7);
        assert!(settings.command_poll.fail_on_exhaustion);
        assert_eq!(settings.startup_poll.max_attempts, 15);
        assert_eq!(
            settings.completion_for(CommandId::PowerDown),
            Completion::ClearToSend
        );
        assert_eq!(
            settings.completion_for(CommandId::PowerUp),
            Completion::ClearToSend
        );
    }

    #[test]
    fn test_device_match_from_usb() {
        let mut config = DriverConfig::default();
        config.usb.timeout_ms = 250;
        config.usb.interface = 1;
        let filter = config.device_match().unwrap();
        assert!(filter.matches(0x10c4, 0x8244));
        assert_eq!(filter.interface, 1);
        assert_eq!(filter.timeout, Duration::from_millis(250));
    }
}
