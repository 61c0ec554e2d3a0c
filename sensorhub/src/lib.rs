//! # sensorhub
//!
//! A library for updating and testing the firmware of an MSP430-class sensor
//! hub reached through a Linux character device.
//!
//! This crate provides:
//!
//! - Version reconciliation between the on-disk firmware descriptor and the hub
//! - Bootloader firmware download with bounded retries
//! - The generic register read/write framing
//! - Test hooks (single and multi byte reads/writes, boot and factory modes)
//!
//! ## Features
//!
//! - `native` (default): ioctl channel over the device node (Unix only)
//! - `serde`: Serialization support for reports
//!
//! ## Example
//!
//! ```rust,no_run
//! use sensorhub::{CommandDispatcher, Mode, Operation, Settings};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let operation = Operation::parse(Mode::Boot, false, &[] as &[&str], settings.max_register_payload)?;
//!
//!     #[cfg(all(feature = "native", unix))]
//!     {
//!         let channel = sensorhub::IoctlChannel::open(&settings.device)?;
//!         let mut dispatcher = CommandDispatcher::new(channel, settings);
//!         let report = dispatcher.run(operation)?;
//!         println!("{report:?}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod firmware;
pub mod mode;
pub mod protocol;
pub mod settings;

// Re-exports for convenience
#[cfg(all(feature = "native", unix))]
pub use channel::ioctl::IoctlChannel;
pub use {
    channel::{ControlOp, DeviceChannel},
    dispatch::{CommandDispatcher, Report},
    error::{Error, Result},
    firmware::{
        FirmwareImage, FirmwareTransfer, TransferOutcome, TransferState, TransferStats,
        UpdateDecision, VersionOracle, VersionReport,
    },
    mode::{ImageKind, Mode, Operation},
    protocol::{Direction, RegisterCommand, RegisterHeader},
    settings::{FirmwarePaths, Settings, TransferSettings},
};
