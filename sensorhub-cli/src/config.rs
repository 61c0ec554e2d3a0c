//! Configuration file support for sensorhub.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SENSORHUB_*)
//! 3. Local config file (./sensorhub.toml)
//! 4. Global config file (~/.config/sensorhub/config.toml)
//!
//! ```toml
//! [device]
//! path = "/dev/msp430"
//!
//! [firmware]
//! image_prefix = "/system/etc/firmware/mspfirmware"
//! version_prefix = "/system/etc/firmware/mspversion"
//! factory_image = "/system/etc/firmware/mspfirmwarefactory.bin"
//!
//! [transfer]
//! max_attempts = 3
//! retry_delay_ms = 1000
//! flash_start = 0x0800_0000
//! packet_len = 256
//!
//! [register]
//! max_payload = 511
//!
//! [debug]
//! dynamic_debug_control = "/sys/kernel/debug/dynamic_debug/control"
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use sensorhub::Settings;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
const LOCAL_CONFIG: &str = "sensorhub.toml";

/// Device configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    /// Device node of the sensor hub driver.
    pub path: Option<PathBuf>,
}

/// Firmware file locations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirmwareConfig {
    /// Primary image prefix (variant and `.bin` are appended).
    pub image_prefix: Option<PathBuf>,
    /// Version descriptor prefix (variant and `.txt` are appended).
    pub version_prefix: Option<PathBuf>,
    /// Factory image.
    pub factory_image: Option<PathBuf>,
}

/// Download policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferConfig {
    /// Maximum download attempts.
    pub max_attempts: Option<usize>,
    /// Pause between attempts in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Flash base address.
    pub flash_start: Option<u32>,
    /// Packet length in bytes.
    pub packet_len: Option<usize>,
}

/// Register access limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterConfig {
    /// Largest payload accepted by `readwrite`.
    pub max_payload: Option<u16>,
}

/// Debug toggling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Kernel dynamic-debug control file.
    pub dynamic_debug_control: Option<PathBuf>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Firmware file locations.
    #[serde(default)]
    pub firmware: FirmwareConfig,
    /// Download policy.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Register limits.
    #[serde(default)]
    pub register: RegisterConfig,
    /// Debug toggling.
    #[serde(default)]
    pub debug: DebugConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sensorhub").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; values set in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.device.path, other.device.path);

        take(&mut self.firmware.image_prefix, other.firmware.image_prefix);
        take(&mut self.firmware.version_prefix, other.firmware.version_prefix);
        take(&mut self.firmware.factory_image, other.firmware.factory_image);

        take(&mut self.transfer.max_attempts, other.transfer.max_attempts);
        take(&mut self.transfer.retry_delay_ms, other.transfer.retry_delay_ms);
        take(&mut self.transfer.flash_start, other.transfer.flash_start);
        take(&mut self.transfer.packet_len, other.transfer.packet_len);

        take(&mut self.register.max_payload, other.register.max_payload);

        take(
            &mut self.debug.dynamic_debug_control,
            other.debug.dynamic_debug_control,
        );
    }

    /// Library settings: defaults overridden by every value set here.
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::default();

        if let Some(path) = &self.device.path {
            settings.device.clone_from(path);
        }

        let firmware = &mut settings.firmware;
        if let Some(prefix) = &self.firmware.image_prefix {
            firmware.image_prefix.clone_from(prefix);
        }
        if let Some(prefix) = &self.firmware.version_prefix {
            firmware.version_prefix.clone_from(prefix);
        }
        if let Some(image) = &self.firmware.factory_image {
            firmware.factory_image.clone_from(image);
        }

        let transfer = &mut settings.transfer;
        if let Some(attempts) = self.transfer.max_attempts {
            transfer.max_attempts = attempts;
        }
        if let Some(ms) = self.transfer.retry_delay_ms {
            transfer.retry_delay = Duration::from_millis(ms);
        }
        if let Some(address) = self.transfer.flash_start {
            transfer.flash_start = address;
        }
        if let Some(len) = self.transfer.packet_len {
            transfer.packet_len = len;
        }

        if let Some(max) = self.register.max_payload {
            settings.max_register_payload = max;
        }
        if let Some(control) = &self.debug.dynamic_debug_control {
            settings
                .dynamic_debug_control
                .clone_from(control);
        }

        settings
    }
}
