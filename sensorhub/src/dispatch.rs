//! Top-level control flow: one [`Operation`] per run.

use std::fs;

use log::{debug, error, info, warn};

use crate::channel::{ControlOp, DeviceChannel};
use crate::error::Result;
use crate::firmware::image::FirmwareImage;
use crate::firmware::transfer::{FirmwareTransfer, TransferStats};
use crate::firmware::version::{UpdateDecision, VersionOracle, VersionReport};
use crate::mode::{ImageKind, Mode, Operation};
use crate::protocol::hex;
use crate::protocol::register::{Direction, RegisterCommand};
use crate::settings::Settings;

/// What a completed operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Control operation(s) issued, nothing to show.
    Done,
    /// Bytes read from the hub.
    Bytes(Vec<u8>),
    /// Version check result.
    Version(VersionReport),
    /// A firmware image was written.
    Installed {
        /// Image written.
        image: ImageKind,
        /// Transfer counters.
        stats: TransferStats,
        /// Post-flash re-check; `None` when it was not run or could not complete.
        verified: Option<bool>,
    },
    /// No update was needed; the reset transition ran instead.
    UpToDate {
        /// Image that was not written.
        image: ImageKind,
        /// Why no transfer happened.
        decision: UpdateDecision,
    },
    /// Recognized mode with nothing to do.
    Unsupported(Mode),
}

/// Owns the device channel for one run and executes operations on it.
///
/// The channel is released when the dispatcher is dropped, whichever way the
/// run ends.
pub struct CommandDispatcher<C: DeviceChannel> {
    channel: C,
    settings: Settings,
}

impl<C: DeviceChannel> CommandDispatcher<C> {
    /// Create a dispatcher over `channel`.
    pub fn new(channel: C, settings: Settings) -> Self {
        Self { channel, settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Borrow the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Give the channel back.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Execute `operation`.
    pub fn run(&mut self, operation: Operation) -> Result<Report> {
        self.run_with_progress(operation, |_, _| {})
    }

    /// Execute `operation`, reporting firmware download progress
    /// as (bytes_sent, total_bytes).
    pub fn run_with_progress<F>(&mut self, operation: Operation, progress: F) -> Result<Report>
    where
        F: FnMut(u64, u64),
    {
        debug!("Running {} on {}", operation.mode(), self.channel.name());

        match operation {
            Operation::Install { image, force } => self.install(image, force, progress),
            Operation::NormalReset => {
                debug!("Resetting hub to normal mode");
                self.channel
                    .restore_normal_mode()?;
                Ok(Report::Done)
            },
            Operation::TestBoot => {
                debug!("Sending hub to boot mode");
                self.channel
                    .command(ControlOp::TestBootMode)?;
                Ok(Report::Done)
            },
            Operation::TestRead { register, count } => self.test_read(register, count),
            Operation::TestWrite { bytes } => {
                for byte in bytes {
                    self.channel
                        .test_write(byte)?;
                    debug!("Test write {byte:02x}");
                }
                Ok(Report::Done)
            },
            Operation::TestMultiRead { address, count } => {
                let mut buf = vec![0u8; usize::from(count).max(2)];
                buf[0] = address;
                buf[1] = count;
                debug!("Read from address {address:02x}, {count} bytes");
                self.channel
                    .test_write_read(&mut buf)?;
                buf.truncate(usize::from(count));
                Ok(Report::Bytes(buf))
            },
            Operation::TestMultiWrite { bytes } => {
                debug!("Writing data: {}", hex::dump(&bytes));
                self.channel
                    .write_packet_all(&bytes)?;
                Ok(Report::Done)
            },
            Operation::Debug { level } => self.set_debug(level),
            Operation::FactoryMode => {
                info!("Switching to factory mode");
                self.channel
                    .command(ControlOp::SetFactoryMode)?;
                Ok(Report::Done)
            },
            Operation::GetVersion => Ok(Report::Version(
                VersionOracle::new(&self.settings.firmware).check(&mut self.channel, true)?,
            )),
            Operation::Register(cmd) => self.register(&cmd),
            Operation::Unsupported(mode) => {
                warn!("Mode '{mode}' has no device operation, nothing to do");
                Ok(Report::Unsupported(mode))
            },
        }
    }

    fn install<F>(&mut self, kind: ImageKind, force: bool, progress: F) -> Result<Report>
    where
        F: FnMut(u64, u64),
    {
        let path = match kind {
            ImageKind::Primary => {
                let variant = self
                    .channel
                    .variant_name()?;
                self.settings
                    .firmware
                    .image_for(&variant)
            },
            ImageKind::Factory => self
                .settings
                .firmware
                .factory_image
                .clone(),
        };
        info!("Firmware image {}", path.display());

        // A missing image means there is nothing to install.
        let (image, decision) = match FirmwareImage::open(&path) {
            Ok(image) => {
                let decision =
                    VersionOracle::new(&self.settings.firmware).required(&mut self.channel, !force)?;
                (Some(image), decision)
            },
            Err(e) => {
                warn!("{e}");
                (None, UpdateDecision::Unknown)
            },
        };

        let Some(image) = image.filter(|_| decision.needs_update()) else {
            debug!("No new firmware to download");
            self.run(kind.reset_transition())?;
            return Ok(Report::UpToDate {
                image: kind,
                decision,
            });
        };

        let mut image = image.with_packet_len(self.settings.transfer.packet_len);
        let stats = FirmwareTransfer::new(&mut self.channel, self.settings.transfer.clone())
            .download(&mut image, progress)
            .into_result()?;
        drop(image);

        let verified = match kind {
            ImageKind::Primary => {
                self.channel
                    .restore_normal_mode()?;
                self.verify()
            },
            ImageKind::Factory => {
                self.run(Operation::FactoryMode)?;
                None
            },
        };

        Ok(Report::Installed {
            image: kind,
            stats,
            verified,
        })
    }

    /// Post-flash re-check. A mismatch is logged and never fails the run.
    fn verify(&mut self) -> Option<bool> {
        match VersionOracle::new(&self.settings.firmware).required(&mut self.channel, true) {
            Ok(UpdateDecision::MatchNotNeeded) => {
                info!("Firmware download completed successfully");
                Some(true)
            },
            Ok(UpdateDecision::Unknown) => {
                warn!("Cannot verify the new firmware without a version descriptor");
                None
            },
            Ok(UpdateDecision::MismatchUpdateNeeded) => {
                error!("Firmware download error: hub does not report the expected version");
                Some(false)
            },
            Err(e) => {
                error!("Firmware download error: version re-check failed: {e}");
                None
            },
        }
    }

    fn test_read(&mut self, register: u8, count: u8) -> Result<Report> {
        debug!("Test read of register {register:02x}, {count} bytes");
        self.channel
            .test_write(register)?;

        let mut bytes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            bytes.push(
                self.channel
                    .test_read()?,
            );
        }
        debug!("Read: {}", hex::dump(&bytes));
        Ok(Report::Bytes(bytes))
    }

    fn set_debug(&mut self, level: u8) -> Result<Report> {
        info!("Set debug to {level}");
        self.channel
            .set_debug_level(i16::from(level))?;

        let control = &self.settings.dynamic_debug_control;
        let line = if level == 0 {
            "file msp430.c -p\n"
        } else {
            "file msp430.c +p\n"
        };
        if let Err(e) = fs::write(control, line) {
            warn!("Could not update {}: {e}", control.display());
        }
        Ok(Report::Done)
    }

    fn register(&mut self, cmd: &RegisterCommand) -> Result<Report> {
        let mut frame = cmd.encode();
        let header = cmd.header();
        debug!(
            "Register {:?} at 0x{:04X}, {} bytes",
            cmd.direction(),
            header.address,
            header.size
        );

        match cmd.direction() {
            Direction::Read => {
                self.channel
                    .read_register(&mut frame)?;
                let data = cmd
                    .payload(&frame)
                    .to_vec();
                debug!("Read data: {}", hex::dump(&data));
                Ok(Report::Bytes(data))
            },
            Direction::Write => {
                debug!("Write frame: {}", hex::dump(&frame));
                self.channel
                    .write_register(&mut frame)?;
                Ok(Report::Done)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockChannel;
    use crate::error::Error;
    use crate::protocol::register::MAX_PAYLOAD;
    use crate::settings::FirmwarePaths;
    use std::path::Path;
    use std::time::Duration;

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings {
            firmware: FirmwarePaths {
                image_prefix: dir.join("mspfirmware"),
                version_prefix: dir.join("mspversion"),
                factory_image: dir.join("mspfirmwarefactory.bin"),
            },
            dynamic_debug_control: dir.join("control"),
            ..Settings::default()
        };
        settings.transfer.retry_delay = Duration::ZERO;
        settings
    }

    fn parse(mode: Mode, force: bool, tokens: &[&str]) -> Operation {
        Operation::parse(mode, force, tokens, MAX_PAYLOAD).unwrap()
    }

    #[test]
    fn test_boot_without_update_only_resets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspfirmware_P1.bin"), [0u8; 300]).unwrap();
        fs::write(dir.path().join("mspversion_P1.txt"), "06").unwrap();

        let channel = MockChannel::new().with_installed(&[6]);
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::Boot, false, &[]))
            .unwrap();
        assert_eq!(
            report,
            Report::UpToDate {
                image: ImageKind::Primary,
                decision: UpdateDecision::MatchNotNeeded
            }
        );

        let channel = dispatcher.into_channel();
        assert_eq!(channel.count(ControlOp::RestoreNormalMode), 1);
        assert_eq!(channel.count(ControlOp::MassErase), 0);
        assert_eq!(channel.count(ControlOp::WritePacket), 0);
    }

    #[test]
    fn test_boot_installs_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0x5A; 300];
        fs::write(dir.path().join("mspfirmware_P1.bin"), &data).unwrap();
        fs::write(dir.path().join("mspversion_P1.txt"), "06").unwrap();

        // Before the flash the hub reports 5, afterwards 6.
        let channel = MockChannel::new().with_installed(&[5, 6]);
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::Boot, false, &[]))
            .unwrap();

        let Report::Installed {
            image,
            stats,
            verified,
        } = report
        else {
            panic!("expected install, got {report:?}");
        };
        assert_eq!(image, ImageKind::Primary);
        assert_eq!(stats.bytes, 300);
        assert_eq!(verified, Some(true));

        let channel = dispatcher.into_channel();
        assert_eq!(channel.packets.concat(), data);
        assert_eq!(channel.count(ControlOp::RestoreNormalMode), 1);
        assert_eq!(channel.count(ControlOp::QueryInstalledVersion), 2);
    }

    #[test]
    fn test_post_flash_mismatch_is_lenient() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspfirmware_P1.bin"), [1u8; 8]).unwrap();
        fs::write(dir.path().join("mspversion_P1.txt"), "06").unwrap();

        let channel = MockChannel::new().with_installed(&[5]);
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::Boot, false, &[]))
            .unwrap();
        assert!(matches!(
            report,
            Report::Installed {
                verified: Some(false),
                ..
            }
        ));
    }

    #[test]
    fn test_forced_boot_skips_version_check() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspfirmware_P1.bin"), [1u8; 8]).unwrap();

        // No descriptor at all: a forced install still downloads.
        let channel = MockChannel::new();
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::Boot, true, &[]))
            .unwrap();
        assert!(matches!(report, Report::Installed { verified: None, .. }));
        assert_eq!(dispatcher.channel().packets.len(), 1);
    }

    #[test]
    fn test_missing_image_downgrades_to_normal() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::Boot, true, &[]))
            .unwrap();
        assert_eq!(
            report,
            Report::UpToDate {
                image: ImageKind::Primary,
                decision: UpdateDecision::Unknown
            }
        );
        let channel = dispatcher.into_channel();
        assert_eq!(channel.count(ControlOp::QueryInstalledVersion), 0);
        assert_eq!(channel.count(ControlOp::RestoreNormalMode), 1);
    }

    #[test]
    fn test_bootfactory_without_image_switches_to_factory() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new();
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        dispatcher
            .run(parse(Mode::BootFactory, false, &[]))
            .unwrap();
        let channel = dispatcher.into_channel();
        assert_eq!(channel.ops(), vec![ControlOp::SetFactoryMode]);
    }

    #[test]
    fn test_bootfactory_install_ends_in_factory_mode() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspfirmwarefactory.bin"), [7u8; 20]).unwrap();

        let channel = MockChannel::new();
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::BootFactory, true, &[]))
            .unwrap();
        assert!(matches!(
            report,
            Report::Installed {
                image: ImageKind::Factory,
                ..
            }
        ));
        let channel = dispatcher.into_channel();
        assert_eq!(channel.ops().last(), Some(&ControlOp::SetFactoryMode));
        assert_eq!(channel.count(ControlOp::RestoreNormalMode), 0);
    }

    #[test]
    fn test_install_retry_exhaustion_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspfirmware_P1.bin"), [1u8; 8]).unwrap();

        let channel = MockChannel::new().failing(ControlOp::WritePacket);
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let err = dispatcher
            .run(parse(Mode::Boot, true, &[]))
            .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
        assert_eq!(
            dispatcher
                .channel()
                .count(ControlOp::RestoreNormalMode),
            1
        );
    }

    #[test]
    fn test_readwrite_read_single_byte() {
        let channel = MockChannel::new().with_register_reply(&[0x42]);
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        let report = dispatcher
            .run(parse(Mode::ReadWrite, false, &["00", "00", "00", "00", "01"]))
            .unwrap();
        assert_eq!(report, Report::Bytes(vec![0x42]));

        let channel = dispatcher.into_channel();
        assert_eq!(channel.ops(), vec![ControlOp::ReadRegister]);
        assert_eq!(channel.frames, vec![vec![0, 0, 0, 1, 0]]);
    }

    #[test]
    fn test_readwrite_write_frame() {
        let mut dispatcher = CommandDispatcher::new(MockChannel::new(), Settings::default());
        let report = dispatcher
            .run(parse(Mode::ReadWrite, false, &["01", "00", "0D", "00", "02", "CC", "DD"]))
            .unwrap();
        assert_eq!(report, Report::Done);
        assert_eq!(
            dispatcher.channel().frames,
            vec![vec![0x00, 0x0D, 0x00, 0x02, 0xCC, 0xDD]]
        );
    }

    #[test]
    fn test_tread_reads_count_bytes() {
        let channel = MockChannel::new().with_read_bytes(&[1, 2, 3]);
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        let report = dispatcher
            .run(parse(Mode::TestRead, false, &["1A", "03"]))
            .unwrap();
        assert_eq!(report, Report::Bytes(vec![1, 2, 3]));

        let channel = dispatcher.into_channel();
        assert_eq!(channel.test_writes, vec![0x1A]);
        assert_eq!(channel.count(ControlOp::TestRead), 3);
    }

    #[test]
    fn test_twrite_stops_at_first_failure() {
        let channel = MockChannel::new().failing(ControlOp::TestWrite);
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        assert!(
            dispatcher
                .run(parse(Mode::TestWrite, false, &["01", "02"]))
                .is_err()
        );
        assert_eq!(dispatcher.channel().count(ControlOp::TestWrite), 1);
    }

    #[test]
    fn test_tmread_buffer_layout() {
        let channel = MockChannel::new().with_read_bytes(&[9, 8, 7]);
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        let report = dispatcher
            .run(parse(Mode::TestMultiRead, false, &["10", "03"]))
            .unwrap();
        assert_eq!(report, Report::Bytes(vec![9, 8, 7]));
        assert_eq!(dispatcher.channel().frames, vec![vec![0x10, 0x03, 0x00]]);
    }

    #[test]
    fn test_tmwrite_single_raw_write() {
        let mut dispatcher = CommandDispatcher::new(MockChannel::new(), Settings::default());
        dispatcher
            .run(parse(Mode::TestMultiWrite, false, &["01", "02", "03"]))
            .unwrap();
        assert_eq!(dispatcher.channel().packets, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_tmwrite_short_write_fails() {
        let channel = MockChannel::new().with_short_writes();
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        assert!(
            dispatcher
                .run(parse(Mode::TestMultiWrite, false, &["01", "02"]))
                .is_err()
        );
    }

    #[test]
    fn test_debug_toggles_dynamic_debug() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let control = settings
            .dynamic_debug_control
            .clone();

        let mut dispatcher = CommandDispatcher::new(MockChannel::new(), settings);
        dispatcher
            .run(parse(Mode::Debug, false, &["03"]))
            .unwrap();
        assert_eq!(fs::read_to_string(&control).unwrap(), "file msp430.c +p\n");

        dispatcher
            .run(parse(Mode::Debug, false, &["00"]))
            .unwrap();
        assert_eq!(fs::read_to_string(&control).unwrap(), "file msp430.c -p\n");
        assert_eq!(dispatcher.channel().debug_levels, vec![3, 0]);
    }

    #[test]
    fn test_debug_control_write_failure_is_not_fatal() {
        let mut settings = Settings::default();
        settings.dynamic_debug_control = "/nonexistent/dir/control".into();
        let mut dispatcher = CommandDispatcher::new(MockChannel::new(), settings);
        assert_eq!(
            dispatcher
                .run(parse(Mode::Debug, false, &["01"]))
                .unwrap(),
            Report::Done
        );
    }

    #[test]
    fn test_simple_control_modes() {
        for (mode, op) in [
            (Mode::Normal, ControlOp::RestoreNormalMode),
            (Mode::TestBoot, ControlOp::TestBootMode),
            (Mode::Factory, ControlOp::SetFactoryMode),
        ] {
            let mut dispatcher = CommandDispatcher::new(MockChannel::new(), Settings::default());
            assert_eq!(dispatcher.run(parse(mode, false, &[])).unwrap(), Report::Done);
            assert_eq!(dispatcher.channel().ops(), vec![op]);
        }
    }

    #[test]
    fn test_normal_reset_failure_is_channel_error() {
        let channel = MockChannel::new().failing(ControlOp::RestoreNormalMode);
        let mut dispatcher = CommandDispatcher::new(channel, Settings::default());
        let err = dispatcher
            .run(parse(Mode::Normal, false, &[]))
            .unwrap_err();
        assert!(matches!(err, Error::Channel { .. }));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_getversion_reports_both_versions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mspversion_P1.txt"), "0a").unwrap();

        let channel = MockChannel::new().with_installed(&[9]);
        let mut dispatcher = CommandDispatcher::new(channel, settings_in(dir.path()));
        let report = dispatcher
            .run(parse(Mode::GetVersion, false, &[]))
            .unwrap();
        let Report::Version(version) = report else {
            panic!("expected version report, got {report:?}");
        };
        assert_eq!(version.expected, Some(10));
        assert_eq!(version.installed, Some(9));
    }

    #[test]
    fn test_unsupported_mode_touches_nothing() {
        let mut dispatcher = CommandDispatcher::new(MockChannel::new(), Settings::default());
        let report = dispatcher
            .run(parse(Mode::Active, false, &[]))
            .unwrap();
        assert_eq!(report, Report::Unsupported(Mode::Active));
        assert!(dispatcher.channel().ops().is_empty());
    }
}
