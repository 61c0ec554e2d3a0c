//! Native channel over the sensor hub character device.
//!
//! Control operations are `ioctl` requests on the device node; firmware packets
//! are plain `write(2)` calls. The request numbers follow the driver header
//! (`linux/msp430.h`, ioctl type `'M'`).

#![allow(unsafe_code)]

use {
    crate::{
        channel::{ControlOp, DeviceChannel},
        error::{Error, Result},
    },
    log::trace,
    std::{
        fs::{File, OpenOptions},
        io::{self, Write},
        os::unix::io::{AsRawFd, RawFd},
        path::Path,
    },
};

/// Size of the buffer handed to the variant-name query.
const VARIANT_NAME_LEN: usize = 32;

/// Linux `_IOC` request encoding.
mod requests {
    const WRITE: u32 = 1;
    const READ: u32 = 2;

    const TYPE: u32 = 77;

    #[allow(clippy::cast_possible_truncation)]
    const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
        (dir << 30) | ((size as u32) << 16) | (TYPE << 8) | nr
    }

    const fn iow<T>(nr: u32) -> u32 {
        ioc(WRITE, nr, size_of::<T>())
    }

    const fn ior<T>(nr: u32) -> u32 {
        ioc(READ, nr, size_of::<T>())
    }

    const fn iowr<T>(nr: u32) -> u32 {
        ioc(READ | WRITE, nr, size_of::<T>())
    }

    pub(super) const BOOTLOADER_MODE: u32 = iow::<u8>(0);
    pub(super) const NORMAL_MODE: u32 = iow::<u8>(1);
    pub(super) const MASS_ERASE: u32 = iow::<u8>(2);
    pub(super) const SET_START_ADDR: u32 = iow::<u32>(3);
    pub(super) const TEST_READ: u32 = ior::<u8>(4);
    pub(super) const TEST_WRITE: u32 = iow::<u8>(5);
    pub(super) const TEST_WRITE_READ: u32 = iowr::<u16>(6);
    pub(super) const TEST_BOOT_MODE: u32 = iow::<u8>(8);
    pub(super) const SET_DEBUG: u32 = iow::<u8>(12);
    pub(super) const SET_FACTORY_MODE: u32 = iow::<u8>(20);
    pub(super) const GET_VERSION: u32 = ior::<u8>(22);
    pub(super) const GET_VERNAME: u32 = ior::<usize>(33);
    pub(super) const WRITE_REG: u32 = ior::<usize>(36);
    pub(super) const READ_REG: u32 = ior::<usize>(37);
}

/// Sensor hub device opened read/write.
///
/// The file descriptor is released when the channel is dropped or closed.
#[derive(Debug)]
pub struct IoctlChannel {
    file: Option<File>,
    path: String,
}

impl IoctlChannel {
    /// Open the device node.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            file: Some(file),
            path: path
                .display()
                .to_string(),
        })
    }

    /// Close the device. Further operations fail with a channel error.
    pub fn close(&mut self) {
        self.file
            .take();
    }

    fn fd(&self, op: ControlOp) -> Result<RawFd> {
        self.file
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| Error::Channel {
                op,
                source: io::Error::new(io::ErrorKind::NotConnected, "device closed"),
            })
    }

    fn ioctl<T>(&self, op: ControlOp, request: u32, arg: *mut T) -> Result<i32> {
        let fd = self.fd(op)?;
        trace!("ioctl {op} (0x{request:08X})");
        // SAFETY: `fd` is an open descriptor owned by `self.file` and `arg`
        // points to a live buffer at least as large as the driver copies for
        // `request`.
        let ret = unsafe { libc::ioctl(fd, request as _, arg) };
        if ret < 0 {
            return Err(Error::last_os(op));
        }
        Ok(ret)
    }

    fn ioctl_dummy(&self, op: ControlOp, request: u32) -> Result<i32> {
        // The driver ignores the argument of mode-switch requests.
        let mut dummy: libc::c_int = 100;
        self.ioctl(op, request, &raw mut dummy)
    }
}

impl DeviceChannel for IoctlChannel {
    fn command(&mut self, op: ControlOp) -> Result<()> {
        let request = match op {
            ControlOp::EnterBootloader => requests::BOOTLOADER_MODE,
            ControlOp::MassErase => requests::MASS_ERASE,
            ControlOp::RestoreNormalMode => requests::NORMAL_MODE,
            ControlOp::TestBootMode => requests::TEST_BOOT_MODE,
            ControlOp::SetFactoryMode => requests::SET_FACTORY_MODE,
            other => {
                return Err(Error::Channel {
                    op: other,
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "operation takes an argument",
                    ),
                });
            },
        };
        self.ioctl_dummy(op, request)?;
        Ok(())
    }

    fn set_start_address(&mut self, address: u32) -> Result<()> {
        let mut address = address;
        self.ioctl(
            ControlOp::SetStartAddress,
            requests::SET_START_ADDR,
            &raw mut address,
        )?;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn test_read(&mut self) -> Result<u8> {
        // The byte read is returned as the ioctl result.
        let ret = self.ioctl_dummy(ControlOp::TestRead, requests::TEST_READ)?;
        Ok((ret & 0xFF) as u8)
    }

    fn test_write(&mut self, byte: u8) -> Result<()> {
        let mut byte = byte;
        self.ioctl(ControlOp::TestWrite, requests::TEST_WRITE, &raw mut byte)?;
        Ok(())
    }

    fn test_write_read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ioctl(
            ControlOp::TestWriteRead,
            requests::TEST_WRITE_READ,
            buf.as_mut_ptr(),
        )?;
        Ok(())
    }

    fn set_debug_level(&mut self, level: i16) -> Result<()> {
        let mut level = level;
        self.ioctl(ControlOp::SetDebugLevel, requests::SET_DEBUG, &raw mut level)?;
        Ok(())
    }

    fn read_register(&mut self, frame: &mut [u8]) -> Result<()> {
        self.ioctl(
            ControlOp::ReadRegister,
            requests::READ_REG,
            frame.as_mut_ptr(),
        )?;
        Ok(())
    }

    fn write_register(&mut self, frame: &mut [u8]) -> Result<()> {
        self.ioctl(
            ControlOp::WriteRegister,
            requests::WRITE_REG,
            frame.as_mut_ptr(),
        )?;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn installed_version(&mut self) -> Result<u32> {
        // The version is returned as the ioctl result.
        let ret = self.ioctl_dummy(ControlOp::QueryInstalledVersion, requests::GET_VERSION)?;
        Ok(ret as u32)
    }

    fn variant_name(&mut self) -> Result<String> {
        let mut buf = [0u8; VARIANT_NAME_LEN];
        self.ioctl(
            ControlOp::QueryVariantName,
            requests::GET_VERNAME,
            buf.as_mut_ptr(),
        )?;
        Ok(parse_variant_name(&buf))
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::Channel {
                op: ControlOp::WritePacket,
                source: io::Error::new(io::ErrorKind::NotConnected, "device closed"),
            })?;
        file.write(data)
            .map_err(|source| Error::Channel {
                op: ControlOp::WritePacket,
                source,
            })
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Extract the NUL-terminated variant name returned by the driver.
fn parse_variant_name(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding() {
        // _IOW('M', 0, unsigned char)
        assert_eq!(requests::BOOTLOADER_MODE, 0x4001_4D00);
        // _IOW('M', 3, unsigned int)
        assert_eq!(requests::SET_START_ADDR, 0x4004_4D03);
        // _IOR('M', 4, unsigned char)
        assert_eq!(requests::TEST_READ, 0x8001_4D04);
        // _IOWR('M', 6, unsigned short)
        assert_eq!(requests::TEST_WRITE_READ, 0xC002_4D06);
    }

    #[test]
    fn test_parse_variant_name() {
        assert_eq!(parse_variant_name(b"_P2B\0\0\0garbage"), "_P2B");
        assert_eq!(parse_variant_name(b"_P1"), "_P1");
        assert_eq!(parse_variant_name(&[0u8; 4]), "");
    }

    #[test]
    fn test_open_missing_device() {
        let err = IoctlChannel::open("/nonexistent/msp430").unwrap_err();
        assert!(matches!(err, Error::DeviceOpen { .. }));
        assert!(err.to_string().contains("/nonexistent/msp430"));
    }

    #[test]
    fn test_closed_channel_reports_channel_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node");
        std::fs::write(&path, b"").unwrap();

        let mut channel = IoctlChannel::open(&path).unwrap();
        assert_eq!(channel.name(), path.display().to_string());
        channel.close();
        let err = channel.write_packet(&[1]).unwrap_err();
        assert!(matches!(
            err,
            Error::Channel {
                op: ControlOp::WritePacket,
                ..
            }
        ));
    }

    #[test]
    fn test_ioctl_on_regular_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node");
        std::fs::write(&path, b"").unwrap();

        let mut channel = IoctlChannel::open(&path).unwrap();
        let err = channel.mass_erase().unwrap_err();
        assert!(matches!(
            err,
            Error::Channel {
                op: ControlOp::MassErase,
                ..
            }
        ));
    }
}
