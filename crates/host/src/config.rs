//! Host configuration management

use crate::usb::{DeviceClassifier, HotplugBackend, ReconnectPolicy};
use anyhow::{Context, Result, anyhow};
use protocol::AccessoryIdentification;
use protocol::aoa::{ACCESSORY_PRODUCT_IDS, GOOGLE_VENDOR_ID};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How events are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Strings announced to the phone during the accessory handshake
    #[serde(default)]
    pub accessory: AccessoryIdentification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "HostSettings::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub output: OutputFormat,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            output: OutputFormat::default(),
        }
    }
}

impl HostSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Vendor ids treated as scanners ("0x18d1" form)
    #[serde(default = "UsbSettings::default_vendor_ids")]
    pub vendor_ids: Vec<String>,
    /// Product ids of devices already in accessory mode
    #[serde(default = "UsbSettings::default_configured_product_ids")]
    pub configured_product_ids: Vec<String>,
    /// Polls for a reconfigured device before giving up
    #[serde(default = "UsbSettings::default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "UsbSettings::default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Bulk read timeout in ms, after which sessions re-check for shutdown (0 = block forever)
    #[serde(default = "UsbSettings::default_read_poll_interval_ms")]
    pub read_poll_interval_ms: u64,
    #[serde(default)]
    pub hotplug: HotplugBackend,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_ids: Self::default_vendor_ids(),
            configured_product_ids: Self::default_configured_product_ids(),
            reconnect_attempts: Self::default_reconnect_attempts(),
            reconnect_interval_ms: Self::default_reconnect_interval_ms(),
            read_poll_interval_ms: Self::default_read_poll_interval_ms(),
            hotplug: HotplugBackend::default(),
        }
    }
}

impl UsbSettings {
    fn default_vendor_ids() -> Vec<String> {
        vec![format!("{:#06x}", GOOGLE_VENDOR_ID)]
    }

    fn default_configured_product_ids() -> Vec<String> {
        ACCESSORY_PRODUCT_IDS
            .iter()
            .map(|id| format!("{:#06x}", id))
            .collect()
    }

    fn default_reconnect_attempts() -> u32 {
        5
    }

    fn default_reconnect_interval_ms() -> u64 {
        1000
    }

    fn default_read_poll_interval_ms() -> u64 {
        1000
    }
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-barcode/host.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HostConfig = toml::from_str(&content)
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
            config_dir.join("usb-barcode").join("host.toml")
        } else {
            PathBuf::from(".config/usb-barcode/host.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.usb.vendor_ids.is_empty() {
            return Err(anyhow!("usb.vendor_ids must not be empty"));
        }
        if self.usb.configured_product_ids.is_empty() {
            return Err(anyhow!("usb.configured_product_ids must not be empty"));
        }
        for id in &self.usb.vendor_ids {
            parse_hex_id(id, "vendor id")?;
        }
        for id in &self.usb.configured_product_ids {
            parse_hex_id(id, "product id")?;
        }

        if self.usb.reconnect_attempts == 0 {
            return Err(anyhow!("usb.reconnect_attempts must be at least 1"));
        }

        // Strings go out zero-terminated
        for (which, value) in self.accessory.strings() {
            if value.contains('\0') {
                return Err(anyhow!("Accessory string {:?} contains a NUL byte", which));
            }
        }

        Ok(())
    }

    /// Classifier for the configured id sets
    pub fn classifier(&self) -> Result<DeviceClassifier> {
        let vendor_ids = self
            .usb
            .vendor_ids
            .iter()
            .map(|id| parse_hex_id(id, "vendor id"))
            .collect::<Result<Vec<_>>>()?;
        let product_ids = self
            .usb
            .configured_product_ids
            .iter()
            .map(|id| parse_hex_id(id, "product id"))
            .collect::<Result<Vec<_>>>()?;
        Ok(DeviceClassifier::new(vendor_ids, product_ids))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.usb.reconnect_attempts,
            interval: Duration::from_millis(self.usb.reconnect_interval_ms),
        }
    }

    /// Bulk read timeout; zero blocks until data or disconnect
    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usb.read_poll_interval_ms)
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Parse a hex id such as `0x18d1`
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x18d1')",
            name,
            id
        ));
    };

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

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DeviceRole;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.host.output, OutputFormat::Json);
        assert_eq!(config.usb.vendor_ids, vec!["0x18d1"]);
        assert_eq!(config.usb.configured_product_ids, vec!["0x2d00", "0x2d01"]);
        assert_eq!(config.usb.hotplug, HotplugBackend::Libusb);
        assert_eq!(config.accessory.model, "CompanionScanner");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x18d1", "VID").unwrap(), 0x18d1);
        assert_eq!(parse_hex_id("0X2D00", "PID").unwrap(), 0x2d00);
        assert_eq!(parse_hex_id("0x1", "PID").unwrap(), 1);
        assert!(parse_hex_id("18d1", "VID").is_err());
        assert!(parse_hex_id("0x", "VID").is_err());
        assert!(parse_hex_id("0x12345", "VID").is_err());
        assert!(parse_hex_id("0xGHIJ", "VID").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = HostConfig::default();
        config.host.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.host.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_usb_settings() {
        let mut config = HostConfig::default();
        config.usb.vendor_ids.clear();
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.usb.configured_product_ids = vec!["2d00".to_string()];
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.usb.reconnect_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.accessory.serial = "a\0b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_values() {
        let mut config = HostConfig::default();
        config.usb.vendor_ids.push("0x04e8".to_string());
        config.usb.reconnect_interval_ms = 250;

        let classifier = config.classifier().unwrap();
        assert_eq!(classifier.classify(0x04e8, 0x6860), DeviceRole::Unconfigured);
        assert_eq!(classifier.classify(0x18d1, 0x2d01), DeviceRole::Configured);

        let policy = config.reconnect_policy();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(config.read_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HostConfig = toml::from_str(
            r#"
            [usb]
            hotplug = "udev"

            [accessory]
            serial = "booth-3"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.usb.hotplug, HotplugBackend::Udev);
        assert_eq!(config.usb.reconnect_attempts, 5);
        assert_eq!(config.accessory.serial, "booth-3");
        assert_eq!(config.accessory.manufacturer, "Goldfish-Intelligence");
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.host.log_level, parsed.host.log_level);
        assert_eq!(config.usb.vendor_ids, parsed.usb.vendor_ids);
        assert_eq!(config.accessory, parsed.accessory);
    }
}
