//! Bootloader download of a firmware image.
//!
//! One attempt walks the hub through:
//!
//! ```text
//! Idle -> BootloaderEntered -> Erased -> AddressSet -> Streaming -> Completed
//!   \__________________\___________\__________\____________\-----> Failed
//! ```
//!
//! A failed attempt rewinds the image, pauses and starts over, up to
//! `max_attempts` times. When the download gives up, because every attempt
//! failed or the image cannot be rewound, the hub is sent back to normal mode
//! on a best-effort basis.

use std::io::{Read, Seek};
use std::thread;

use log::{debug, error, info, trace, warn};

use crate::channel::DeviceChannel;
use crate::error::{Error, Result};
use crate::firmware::image::{FirmwareImage, MAX_PACKET_LEN};
use crate::protocol::hex;
use crate::settings::TransferSettings;

/// Position of the download state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No command issued yet in this attempt.
    Idle,
    /// The hub accepted the bootloader entry command.
    BootloaderEntered,
    /// Flash has been mass-erased.
    Erased,
    /// Start address set to the flash base.
    AddressSet,
    /// Packets are being written.
    Streaming,
    /// The whole image was written.
    Completed,
    /// The last attempt aborted.
    Failed,
}

/// Counters of a completed download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Packets written.
    pub packets: usize,
    /// Bytes written.
    pub bytes: u64,
    /// Attempt that succeeded (1-based).
    pub attempt: usize,
}

/// Result of [`FirmwareTransfer::download`].
#[derive(Debug)]
pub enum TransferOutcome {
    /// The image was written completely.
    Completed(TransferStats),
    /// Every attempt failed; normal mode restoration was attempted.
    RetryExhausted {
        /// Attempts made.
        attempts: usize,
        /// Error of the final attempt.
        last_error: Error,
    },
    /// A failure that retrying cannot fix (the image could not be rewound);
    /// normal mode restoration was attempted.
    Failed(Error),
}

impl TransferOutcome {
    /// Whether the image was written.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<TransferStats> {
        match self {
            Self::Completed(stats) => Ok(stats),
            Self::RetryExhausted {
                attempts,
                last_error,
            } => Err(Error::RetryExhausted {
                attempts,
                last: Box::new(last_error),
            }),
            Self::Failed(e) => Err(e),
        }
    }
}

/// Drives the bootloader protocol over a [`DeviceChannel`].
pub struct FirmwareTransfer<'a, C: DeviceChannel + ?Sized> {
    channel: &'a mut C,
    settings: TransferSettings,
    state: TransferState,
}

impl<'a, C: DeviceChannel + ?Sized> FirmwareTransfer<'a, C> {
    /// Create a transfer over `channel`.
    pub fn new(channel: &'a mut C, settings: TransferSettings) -> Self {
        Self {
            channel,
            settings,
            state: TransferState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Download `image` with bounded retries.
    ///
    /// # Arguments
    ///
    /// * `image` - Firmware image, read from its current position
    /// * `progress` - Progress callback (bytes_sent, total_bytes); `total_bytes` is 0 when unknown
    pub fn download<R, F>(&mut self, image: &mut FirmwareImage<R>, mut progress: F) -> TransferOutcome
    where
        R: Read + Seek,
        F: FnMut(u64, u64),
    {
        let max_attempts = self
            .settings
            .max_attempts
            .max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                info!("Download attempt {attempt}/{max_attempts}");
            }

            match self.try_download(image, &mut progress) {
                Ok((packets, bytes)) => {
                    self.state = TransferState::Completed;
                    let stats = TransferStats {
                        packets,
                        bytes,
                        attempt,
                    };
                    debug!(
                        "Download complete: {} packets, {} bytes",
                        stats.packets, stats.bytes
                    );
                    return TransferOutcome::Completed(stats);
                },
                Err(e) => {
                    self.state = TransferState::Failed;
                    warn!("Download failed (attempt {attempt}/{max_attempts}): {e}");
                    last_error = Some(e);

                    if attempt < max_attempts {
                        if let Err(e) = image.rewind() {
                            error!("Cannot rewind firmware image: {e}");
                            self.restore_normal_mode();
                            return TransferOutcome::Failed(e);
                        }
                        thread::sleep(self.settings.retry_delay);
                    }
                },
            }
        }

        error!("Firmware download failed");
        self.restore_normal_mode();

        TransferOutcome::RetryExhausted {
            attempts: max_attempts,
            last_error: last_error
                .unwrap_or_else(|| Error::Validation("no download attempt made".into())),
        }
    }

    /// Best-effort return to normal mode after the download gave up.
    fn restore_normal_mode(&mut self) {
        if let Err(e) = self.channel.restore_normal_mode() {
            warn!("Could not restore normal mode after failed download: {e}");
        }
    }

    /// Single attempt. Returns (packets, bytes) written.
    fn try_download<R, F>(&mut self, image: &mut FirmwareImage<R>, progress: &mut F) -> Result<(usize, u64)>
    where
        R: Read + Seek,
        F: FnMut(u64, u64),
    {
        self.state = TransferState::Idle;

        debug!("Switching hub to bootloader mode");
        self.channel.enter_bootloader()?;
        self.state = TransferState::BootloaderEntered;

        debug!("Erasing hub flash");
        self.channel.mass_erase()?;
        self.state = TransferState::Erased;

        let address = self
            .settings
            .flash_start;
        self.channel
            .set_start_address(address)?;
        self.state = TransferState::AddressSet;
        debug!("Start address set to 0x{address:08X}");

        self.state = TransferState::Streaming;
        let total = image
            .len()
            .unwrap_or(0);
        let mut packet = [0u8; MAX_PACKET_LEN];
        let mut packets = 0usize;
        let mut bytes = 0u64;

        loop {
            let len = image.next_packet(&mut packet)?;
            if len == 0 {
                break;
            }

            let data = &packet[..len];
            trace!("Sending packet {packets} of length {len}: {}", hex::dump(data));
            self.channel
                .write_packet_all(data)?;

            packets += 1;
            bytes += len as u64;
            progress(bytes, total);
        }

        Ok((packets, bytes))
    }
}
