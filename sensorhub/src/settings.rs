//! Runtime settings: device and firmware paths, transfer and register limits.
//!
//! Defaults reproduce the fixed locations used on the device image; the CLI
//! overrides them from its configuration file and flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::firmware::image::MAX_PACKET_LEN;
use crate::protocol::register::MAX_PAYLOAD;

/// Flash base address of the sensor hub.
pub const FLASH_START_ADDRESS: u32 = 0x0800_0000;

/// Download attempts before giving up.
pub const DOWNLOAD_RETRIES: usize = 3;

/// Pause between download attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Firmware and descriptor file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePaths {
    /// Prefix of the primary image; the variant name and `.bin` are appended.
    pub image_prefix: PathBuf,
    /// Prefix of the version descriptor; the variant name and `.txt` are appended.
    pub version_prefix: PathBuf,
    /// Factory image.
    pub factory_image: PathBuf,
}

impl Default for FirmwarePaths {
    fn default() -> Self {
        Self {
            image_prefix: PathBuf::from("/system/etc/firmware/mspfirmware"),
            version_prefix: PathBuf::from("/system/etc/firmware/mspversion"),
            factory_image: PathBuf::from("/system/etc/firmware/mspfirmwarefactory.bin"),
        }
    }
}

impl FirmwarePaths {
    /// Primary image for a firmware variant.
    pub fn image_for(&self, variant: &str) -> PathBuf {
        with_suffix(&self.image_prefix, variant, ".bin")
    }

    /// Version descriptor for a firmware variant.
    pub fn version_for(&self, variant: &str) -> PathBuf {
        with_suffix(&self.version_prefix, variant, ".txt")
    }
}

fn with_suffix(prefix: &std::path::Path, variant: &str, ext: &str) -> PathBuf {
    let mut name = prefix
        .as_os_str()
        .to_os_string();
    name.push(variant);
    name.push(ext);
    PathBuf::from(name)
}

/// Firmware download policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Maximum number of download attempts.
    pub max_attempts: usize,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Flash address the image is written to.
    pub flash_start: u32,
    /// Packet length, at most 256.
    pub packet_len: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_attempts: DOWNLOAD_RETRIES,
            retry_delay: RETRY_DELAY,
            flash_start: FLASH_START_ADDRESS,
            packet_len: MAX_PACKET_LEN,
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Device node of the sensor hub driver.
    pub device: PathBuf,
    /// Firmware file locations.
    pub firmware: FirmwarePaths,
    /// Download policy.
    pub transfer: TransferSettings,
    /// Largest register payload accepted by `readwrite`.
    pub max_register_payload: u16,
    /// Kernel dynamic-debug control file toggled by the `debug` command.
    pub dynamic_debug_control: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/msp430"),
            firmware: FirmwarePaths::default(),
            transfer: TransferSettings::default(),
            max_register_payload: MAX_PAYLOAD,
            dynamic_debug_control: PathBuf::from("/sys/kernel/debug/dynamic_debug/control"),
        }
    }
}

impl Settings {
    /// Check the limits.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.max_attempts == 0 {
            return Err(Error::Config("transfer.max_attempts must be at least 1".into()));
        }
        if !(1..=MAX_PACKET_LEN).contains(&self.transfer.packet_len) {
            return Err(Error::Config(format!(
                "transfer.packet_len must be in 1..={MAX_PACKET_LEN}"
            )));
        }
        if !(1..=MAX_PAYLOAD).contains(&self.max_register_payload) {
            return Err(Error::Config(format!(
                "register.max_payload must be in 1..={MAX_PAYLOAD}"
            )));
        }
        Ok(())
    }
}
