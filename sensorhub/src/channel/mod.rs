//! Control channel abstraction.
//!
//! Everything the tool does to the sensor hub goes through [`DeviceChannel`]:
//! named control operations plus a raw byte write used for firmware packets.
//!
//! ```text
//! +------------------+  +------------------+  +------------------+
//! | FirmwareTransfer |  |  VersionOracle   |  | CommandDispatcher|
//! +--------+---------+  +--------+---------+  +--------+---------+
//!          |                     |                     |
//!          +----------+----------+----------+----------+
//!                     v                     v
//!            +--------+---------+  +--------+---------+
//!            | DeviceChannel    |  |   MockChannel    |
//!            |  (IoctlChannel)  |  |     (tests)      |
//!            +------------------+  +------------------+
//! ```

#[cfg(all(feature = "native", unix))]
pub mod ioctl;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;

use crate::error::Result;

/// Named operations on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Switch the hub into its flash bootloader.
    EnterBootloader,
    /// Erase the whole flash region.
    MassErase,
    /// Set the flash address the next packets are written to.
    SetStartAddress,
    /// Leave the bootloader and restart the application firmware.
    RestoreNormalMode,
    /// Test hook: put the hub in boot mode.
    TestBootMode,
    /// Test hook: read one byte.
    TestRead,
    /// Test hook: write one byte.
    TestWrite,
    /// Test hook: write an address and count, read the result back.
    TestWriteRead,
    /// Set the driver debug level.
    SetDebugLevel,
    /// Switch the hub into factory mode.
    SetFactoryMode,
    /// Generic register read.
    ReadRegister,
    /// Generic register write.
    WriteRegister,
    /// Query the installed firmware version.
    QueryInstalledVersion,
    /// Query the firmware variant name.
    QueryVariantName,
    /// Raw packet write.
    WritePacket,
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EnterBootloader => "enter bootloader",
            Self::MassErase => "mass erase",
            Self::SetStartAddress => "set start address",
            Self::RestoreNormalMode => "restore normal mode",
            Self::TestBootMode => "test boot mode",
            Self::TestRead => "test read",
            Self::TestWrite => "test write",
            Self::TestWriteRead => "test write-read",
            Self::SetDebugLevel => "set debug level",
            Self::SetFactoryMode => "set factory mode",
            Self::ReadRegister => "read register",
            Self::WriteRegister => "write register",
            Self::QueryInstalledVersion => "query installed version",
            Self::QueryVariantName => "query variant name",
            Self::WritePacket => "packet write",
        };
        f.write_str(name)
    }
}

/// Control channel to the sensor hub.
///
/// Every call blocks until the driver completes or fails. Failures surface as
/// [`Error::Channel`](crate::Error::Channel) carrying the OS error.
pub trait DeviceChannel {
    /// Issue an operation that takes no argument
    /// (`EnterBootloader`, `MassErase`, `RestoreNormalMode`, `TestBootMode`,
    /// `SetFactoryMode`).
    fn command(&mut self, op: ControlOp) -> Result<()>;

    /// Set the flash start address for the following packet writes.
    fn set_start_address(&mut self, address: u32) -> Result<()>;

    /// Test hook: read a single byte.
    fn test_read(&mut self) -> Result<u8>;

    /// Test hook: write a single byte.
    fn test_write(&mut self, byte: u8) -> Result<()>;

    /// Test hook: `buf` starts with `[address, count]`; the driver overwrites
    /// it with the bytes read.
    fn test_write_read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Set the driver debug level.
    fn set_debug_level(&mut self, level: i16) -> Result<()>;

    /// Generic register read; `frame` is header followed by a zeroed payload
    /// the driver fills.
    fn read_register(&mut self, frame: &mut [u8]) -> Result<()>;

    /// Generic register write; `frame` is header followed by the payload.
    fn write_register(&mut self, frame: &mut [u8]) -> Result<()>;

    /// Firmware version currently running on the hub.
    fn installed_version(&mut self) -> Result<u32>;

    /// Firmware variant name used to select image and descriptor files.
    fn variant_name(&mut self) -> Result<String>;

    /// Raw write of one packet. Returns the number of bytes accepted.
    fn write_packet(&mut self, data: &[u8]) -> Result<usize>;

    /// Human readable channel name (device node path).
    fn name(&self) -> &str;

    /// Enter the flash bootloader.
    fn enter_bootloader(&mut self) -> Result<()> {
        self.command(ControlOp::EnterBootloader)
    }

    /// Erase the whole flash.
    fn mass_erase(&mut self) -> Result<()> {
        self.command(ControlOp::MassErase)
    }

    /// Restart the application firmware.
    fn restore_normal_mode(&mut self) -> Result<()> {
        self.command(ControlOp::RestoreNormalMode)
    }

    /// Write a whole packet; a short write is a channel error.
    fn write_packet_all(&mut self, data: &[u8]) -> Result<()> {
        let written = self.write_packet(data)?;
        if written != data.len() {
            return Err(crate::Error::Channel {
                op: ControlOp::WritePacket,
                source: std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("short write: {written} of {} bytes", data.len()),
                ),
            });
        }
        Ok(())
    }
}

impl<C: DeviceChannel + ?Sized> DeviceChannel for &mut C {
    fn command(&mut self, op: ControlOp) -> Result<()> {
        (**self).command(op)
    }

    fn set_start_address(&mut self, address: u32) -> Result<()> {
        (**self).set_start_address(address)
    }

    fn test_read(&mut self) -> Result<u8> {
        (**self).test_read()
    }

    fn test_write(&mut self, byte: u8) -> Result<()> {
        (**self).test_write(byte)
    }

    fn test_write_read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).test_write_read(buf)
    }

    fn set_debug_level(&mut self, level: i16) -> Result<()> {
        (**self).set_debug_level(level)
    }

    fn read_register(&mut self, frame: &mut [u8]) -> Result<()> {
        (**self).read_register(frame)
    }

    fn write_register(&mut self, frame: &mut [u8]) -> Result<()> {
        (**self).write_register(frame)
    }

    fn installed_version(&mut self) -> Result<u32> {
        (**self).installed_version()
    }

    fn variant_name(&mut self) -> Result<String> {
        (**self).variant_name()
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write_packet(data)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
