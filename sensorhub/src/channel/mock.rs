//! Recording channel for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;

use crate::channel::{ControlOp, DeviceChannel};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Times(usize),
}

/// In-memory [`DeviceChannel`] that records every call.
#[derive(Debug, Default)]
pub(crate) struct MockChannel {
    ops: Vec<ControlOp>,
    failures: HashMap<ControlOp, Failure>,
    pub(crate) packets: Vec<Vec<u8>>,
    pub(crate) frames: Vec<Vec<u8>>,
    pub(crate) test_writes: Vec<u8>,
    pub(crate) start_addresses: Vec<u32>,
    pub(crate) debug_levels: Vec<i16>,
    installed: VecDeque<u32>,
    variant: String,
    read_bytes: VecDeque<u8>,
    register_reply: Vec<u8>,
    short_writes: bool,
}

impl MockChannel {
    pub(crate) fn new() -> Self {
        Self {
            variant: "_P1".into(),
            installed: VecDeque::from([0]),
            ..Default::default()
        }
    }

    /// Installed versions reported by successive queries; the last one sticks.
    pub(crate) fn with_installed(mut self, versions: &[u32]) -> Self {
        self.installed = versions.iter().copied().collect();
        self
    }

    pub(crate) fn with_variant(mut self, variant: &str) -> Self {
        self.variant = variant.into();
        self
    }

    pub(crate) fn with_read_bytes(mut self, bytes: &[u8]) -> Self {
        self.read_bytes = bytes.iter().copied().collect();
        self
    }

    pub(crate) fn with_register_reply(mut self, bytes: &[u8]) -> Self {
        self.register_reply = bytes.to_vec();
        self
    }

    pub(crate) fn with_short_writes(mut self) -> Self {
        self.short_writes = true;
        self
    }

    /// Fail every call of `op`.
    pub(crate) fn failing(mut self, op: ControlOp) -> Self {
        self.failures.insert(op, Failure::Always);
        self
    }

    /// Fail the first `times` calls of `op`.
    pub(crate) fn failing_times(mut self, op: ControlOp, times: usize) -> Self {
        self.failures.insert(op, Failure::Times(times));
        self
    }

    pub(crate) fn ops(&self) -> Vec<ControlOp> {
        self.ops.clone()
    }

    pub(crate) fn count(&self, op: ControlOp) -> usize {
        self.ops.iter().filter(|o| **o == op).count()
    }

    fn record(&mut self, op: ControlOp) -> Result<()> {
        self.ops.push(op);
        let fail = match self.failures.get_mut(&op) {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            },
            _ => false,
        };
        if fail {
            return Err(Error::Channel {
                op,
                source: io::Error::from_raw_os_error(5),
            });
        }
        Ok(())
    }
}

impl DeviceChannel for MockChannel {
    fn command(&mut self, op: ControlOp) -> Result<()> {
        self.record(op)
    }

    fn set_start_address(&mut self, address: u32) -> Result<()> {
        self.record(ControlOp::SetStartAddress)?;
        self.start_addresses.push(address);
        Ok(())
    }

    fn test_read(&mut self) -> Result<u8> {
        self.record(ControlOp::TestRead)?;
        Ok(self.read_bytes.pop_front().unwrap_or(0))
    }

    fn test_write(&mut self, byte: u8) -> Result<()> {
        self.record(ControlOp::TestWrite)?;
        self.test_writes.push(byte);
        Ok(())
    }

    fn test_write_read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.record(ControlOp::TestWriteRead)?;
        self.frames.push(buf.to_vec());
        for (slot, byte) in buf.iter_mut().zip(self.read_bytes.drain(..)) {
            *slot = byte;
        }
        Ok(())
    }

    fn set_debug_level(&mut self, level: i16) -> Result<()> {
        self.record(ControlOp::SetDebugLevel)?;
        self.debug_levels.push(level);
        Ok(())
    }

    fn read_register(&mut self, frame: &mut [u8]) -> Result<()> {
        self.record(ControlOp::ReadRegister)?;
        self.frames.push(frame.to_vec());
        let payload = frame.get_mut(4..).unwrap_or_default();
        for (slot, byte) in payload.iter_mut().zip(&self.register_reply) {
            *slot = *byte;
        }
        Ok(())
    }

    fn write_register(&mut self, frame: &mut [u8]) -> Result<()> {
        self.record(ControlOp::WriteRegister)?;
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn installed_version(&mut self) -> Result<u32> {
        self.record(ControlOp::QueryInstalledVersion)?;
        let version = if self.installed.len() > 1 {
            self.installed.pop_front()
        } else {
            self.installed.front().copied()
        };
        Ok(version.unwrap_or(0))
    }

    fn variant_name(&mut self) -> Result<String> {
        self.record(ControlOp::QueryVariantName)?;
        Ok(self.variant.clone())
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<usize> {
        self.record(ControlOp::WritePacket)?;
        self.packets.push(data.to_vec());
        if self.short_writes {
            return Ok(data.len().saturating_sub(1));
        }
        Ok(data.len())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
