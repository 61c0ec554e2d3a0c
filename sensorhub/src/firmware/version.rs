//! Firmware version reconciliation.
//!
//! The expected version lives in a small text descriptor next to the firmware
//! image (`<version_prefix><variant>.txt`, one two-digit hex number). The
//! installed version is queried from the hub. Comparison is purely numeric.

use std::fs;

use log::{debug, info, warn};

use crate::channel::DeviceChannel;
use crate::error::Result;
use crate::settings::FirmwarePaths;

/// Hint logged whenever the version check prevents a download.
pub const FORCE_DOWNLOAD_HINT: &str = "Use --force to ignore the version check, e.g. `sensorhub boot --force`";

/// Outcome of a version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UpdateDecision {
    /// Installed firmware is as new as the expected one.
    MatchNotNeeded,
    /// Installed firmware is older, or checking is disabled.
    MismatchUpdateNeeded,
    /// No usable version descriptor; treated as "no update available".
    Unknown,
}

impl UpdateDecision {
    /// Whether a download should be attempted.
    pub fn needs_update(self) -> bool {
        self == Self::MismatchUpdateNeeded
    }
}

/// Everything learned during one version check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VersionReport {
    /// Variant name reported by the hub (not queried when checking is disabled).
    pub variant: Option<String>,
    /// Version from the descriptor file.
    pub expected: Option<u32>,
    /// Version reported by the hub.
    pub installed: Option<u32>,
    /// Resulting decision.
    pub decision: UpdateDecision,
}

/// Decide from two known versions.
pub fn compare(expected: u32, installed: u32) -> UpdateDecision {
    if installed < expected {
        UpdateDecision::MismatchUpdateNeeded
    } else {
        UpdateDecision::MatchNotNeeded
    }
}

/// Parse a version descriptor: leading whitespace, then one or two hex digits.
pub fn parse_descriptor(text: &str) -> Option<u32> {
    let digits: String = text
        .trim_start()
        .chars()
        .take(2)
        .take_while(char::is_ascii_hexdigit)
        .collect();
    u32::from_str_radix(&digits, 16).ok()
}

/// Compares the expected firmware version on disk with the one on the hub.
#[derive(Debug, Clone, Copy)]
pub struct VersionOracle<'a> {
    paths: &'a FirmwarePaths,
}

impl<'a> VersionOracle<'a> {
    /// Create an oracle reading descriptors from `paths`.
    pub fn new(paths: &'a FirmwarePaths) -> Self {
        Self { paths }
    }

    /// Decide whether an update is required.
    ///
    /// With `policy_enabled == false` an update is always required.
    pub fn required<C: DeviceChannel + ?Sized>(
        &self,
        channel: &mut C,
        policy_enabled: bool,
    ) -> Result<UpdateDecision> {
        Ok(self
            .check(channel, policy_enabled)?
            .decision)
    }

    /// Run the check and return the full report.
    pub fn check<C: DeviceChannel + ?Sized>(
        &self,
        channel: &mut C,
        policy_enabled: bool,
    ) -> Result<VersionReport> {
        if !policy_enabled {
            debug!("Version check disabled, forcing update");
            return Ok(VersionReport {
                variant: None,
                expected: None,
                installed: None,
                decision: UpdateDecision::MismatchUpdateNeeded,
            });
        }

        let variant = channel.variant_name()?;
        let path = self
            .paths
            .version_for(&variant);
        debug!("Version descriptor: {}", path.display());

        let expected = match fs::read_to_string(&path) {
            Ok(text) => parse_descriptor(&text),
            Err(e) => {
                warn!("Version file not found at {}: {e}", path.display());
                info!("{FORCE_DOWNLOAD_HINT}");
                return Ok(VersionReport {
                    variant: Some(variant),
                    expected: None,
                    installed: None,
                    decision: UpdateDecision::Unknown,
                });
            },
        };
        let Some(expected) = expected else {
            warn!("Version file {} holds no hex version", path.display());
            info!("{FORCE_DOWNLOAD_HINT}");
            return Ok(VersionReport {
                variant: Some(variant),
                expected: None,
                installed: None,
                decision: UpdateDecision::Unknown,
            });
        };

        let (installed, decision) = match channel.installed_version() {
            Ok(installed) => (Some(installed), compare(expected, installed)),
            Err(e) => {
                // A hub that cannot report its version is assumed outdated.
                warn!("{e}");
                (None, UpdateDecision::MismatchUpdateNeeded)
            },
        };

        info!(
            "Version info: version in filesystem = {expected}, version in hardware = {}",
            installed.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        );
        if decision == UpdateDecision::MatchNotNeeded {
            debug!("{FORCE_DOWNLOAD_HINT}");
        }

        Ok(VersionReport {
            variant: Some(variant),
            expected: Some(expected),
            installed,
            decision,
        })
    }
}
