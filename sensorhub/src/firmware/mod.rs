//! Firmware images, version reconciliation and the bootloader download.

pub mod image;
pub mod transfer;
pub mod version;

pub use image::{FirmwareImage, MAX_PACKET_LEN};
pub use transfer::{FirmwareTransfer, TransferOutcome, TransferState, TransferStats};
pub use version::{UpdateDecision, VersionOracle, VersionReport};
