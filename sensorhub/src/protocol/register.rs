//! Generic register read/write framing.
//!
//! ## Frame Format
//!
//! ```text
//! +--------+--------+--------+--------+----------------------+
//! | ADDR_H | ADDR_L | SIZE_H | SIZE_L |  payload (SIZE bytes) |
//! +--------+--------+--------+--------+----------------------+
//! |   1    |   1    |   1    |   1    |   1..=511             |
//! +--------+--------+--------+--------+----------------------+
//! ```
//!
//! For writes the payload carries the data to store. For reads it is zeroed and
//! the driver fills it with the register contents.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::hex;

/// Header length in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted by the driver (its buffer is 512 bytes).
pub const MAX_PAYLOAD: u16 = 511;

/// Number of leading tokens of a `readwrite` invocation: type + 4 header bytes.
pub const LEADING_TOKENS: usize = 1 + HEADER_LEN;

/// Usage text printed when a `readwrite` invocation is malformed.
pub const USAGE: &str = "readwrite [type] [addr_hi] [addr_lo] [size_hi] [size_lo] [data...]\n\
     read version example: readwrite 00 00 01 00 01\n\
     write example:        readwrite 01 00 0D 00 02 CC DD";

/// Transfer direction of a register command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read `size` bytes starting at `address`.
    Read,
    /// Write `size` bytes starting at `address`.
    Write,
}

/// Address and size of a register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterHeader {
    /// Register address.
    pub address: u16,
    /// Payload size in bytes.
    pub size: u16,
}

impl RegisterHeader {
    /// Decode the header from exactly four hex tokens
    /// (address high, address low, size high, size low).
    ///
    /// Every token must decode to exactly one byte and `size` must satisfy
    /// `0 < size <= max_payload`.
    pub fn decode<S: AsRef<str>>(tokens: &[S], max_payload: u16) -> Result<Self> {
        if tokens.len() != HEADER_LEN {
            return Err(Error::Validation(format!(
                "register header needs {HEADER_LEN} tokens, got {}",
                tokens.len()
            )));
        }

        let mut raw = [0u8; HEADER_LEN];
        for (slot, token) in raw.iter_mut().zip(tokens) {
            let token = token.as_ref();
            *slot = hex::decode_byte(token).ok_or_else(|| {
                Error::Validation(format!("header token '{token}' is not a single hex byte"))
            })?;
        }

        let header = Self::from_bytes(raw);
        header.check(max_payload)?;
        Ok(header)
    }

    /// Build a header from its wire bytes without validating it.
    pub fn from_bytes(raw: [u8; HEADER_LEN]) -> Self {
        Self {
            address: BigEndian::read_u16(&raw[0..2]),
            size: BigEndian::read_u16(&raw[2..4]),
        }
    }

    /// Wire representation of the header.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        BigEndian::write_u16(&mut raw[0..2], self.address);
        BigEndian::write_u16(&mut raw[2..4], self.size);
        raw
    }

    fn check(self, max_payload: u16) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Validation("data size must be greater than 0".into()));
        }
        if self.size > max_payload {
            return Err(Error::Validation(format!(
                "data size {} too large, must be <= {max_payload}",
                self.size
            )));
        }
        Ok(())
    }
}

/// A validated register read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCommand {
    direction: Direction,
    header: RegisterHeader,
    data: Vec<u8>,
}

impl RegisterCommand {
    /// Create a read of `header.size` bytes.
    pub fn read(header: RegisterHeader, max_payload: u16) -> Result<Self> {
        header.check(max_payload)?;
        Ok(Self {
            direction: Direction::Read,
            header,
            data: Vec::new(),
        })
    }

    /// Create a write; `data` must hold exactly `header.size` bytes.
    pub fn write(header: RegisterHeader, data: Vec<u8>, max_payload: u16) -> Result<Self> {
        header.check(max_payload)?;
        if data.len() != usize::from(header.size) {
            return Err(Error::Validation(format!(
                "not enough data provided: size is {} but {} bytes given",
                header.size,
                data.len()
            )));
        }
        Ok(Self {
            direction: Direction::Write,
            header,
            data,
        })
    }

    /// Parse `[type] [addr_hi] [addr_lo] [size_hi] [size_lo] [data...]`.
    ///
    /// `type` is decimal: `0` reads, anything else writes.
    pub fn parse<S: AsRef<str>>(tokens: &[S], max_payload: u16) -> Result<Self> {
        if tokens.len() < LEADING_TOKENS {
            return Err(Error::Validation(format!(
                "not enough arguments\n{USAGE}"
            )));
        }

        let kind = tokens[0].as_ref();
        let direction = match kind.parse::<u32>() {
            Ok(0) => Direction::Read,
            Ok(_) => Direction::Write,
            Err(_) => {
                return Err(Error::Validation(format!(
                    "type '{kind}' must be 0 (read) or 1 (write)"
                )));
            },
        };

        let header = RegisterHeader::decode(&tokens[1..LEADING_TOKENS], max_payload)?;
        let rest = &tokens[LEADING_TOKENS..];

        match direction {
            Direction::Read => Self::read(header, max_payload),
            Direction::Write => {
                if rest.len() != usize::from(header.size) {
                    return Err(Error::Validation(format!(
                        "not enough data provided: size is {} but {} tokens given",
                        header.size,
                        rest.len()
                    )));
                }
                let data = rest
                    .iter()
                    .map(|token| {
                        let token = token.as_ref();
                        hex::decode_byte(token).ok_or_else(|| {
                            Error::Validation(format!(
                                "data token '{token}' is not a single hex byte"
                            ))
                        })
                    })
                    .collect::<Result<Vec<u8>>>()?;
                Self::write(header, data, max_payload)
            },
        }
    }

    /// Direction of the command.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Header of the command.
    pub fn header(&self) -> RegisterHeader {
        self.header
    }

    /// Total frame length (`size + 4`).
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + usize::from(self.header.size)
    }

    /// Encode the frame handed to the driver.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![0u8; self.frame_len()];
        frame[..HEADER_LEN].copy_from_slice(&self.header.to_bytes());
        if self.direction == Direction::Write {
            frame[HEADER_LEN..].copy_from_slice(&self.data);
        }
        frame
    }

    /// Payload part of a frame returned by the driver.
    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        let end = self.frame_len().min(frame.len());
        frame.get(HEADER_LEN..end).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_header_decode() {
        let header = RegisterHeader::decode(&tokens("12 34 00 02"), MAX_PAYLOAD).unwrap();
        assert_eq!(header.address, 0x1234);
        assert_eq!(header.size, 2);
        assert_eq!(header.to_bytes(), [0x12, 0x34, 0x00, 0x02]);
    }

    #[test]
    fn test_header_size_zero_rejected() {
        let err = RegisterHeader::decode(&tokens("00 00 00 00"), MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_header_size_512_rejected() {
        let err = RegisterHeader::decode(&tokens("00 00 02 00"), MAX_PAYLOAD).unwrap_err();
        assert!(err.to_string().contains("<= 511"), "{err}");
    }

    #[test]
    fn test_header_size_511_read_frame() {
        let cmd = RegisterCommand::parse(&tokens("00 00 00 01 FF"), MAX_PAYLOAD).unwrap();
        assert_eq!(cmd.direction(), Direction::Read);
        assert_eq!(cmd.header().size, 511);
        let frame = cmd.encode();
        assert_eq!(frame.len(), 515);
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x01, 0xFF]);
        assert!(frame[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_header_token_must_be_single_byte() {
        let err = RegisterHeader::decode(&tokens("0000 00 00 01"), MAX_PAYLOAD).unwrap_err();
        assert!(err.to_string().contains("'0000'"), "{err}");
        assert!(RegisterHeader::decode(&tokens("zz 00 00 01"), MAX_PAYLOAD).is_err());
    }

    #[test]
    fn test_custom_limit() {
        assert!(RegisterHeader::decode(&tokens("00 00 00 11"), 16).is_err());
        assert!(RegisterHeader::decode(&tokens("00 00 00 10"), 16).is_ok());
    }

    #[test]
    fn test_write_frame() {
        let cmd = RegisterCommand::parse(&tokens("01 00 0D 00 02 CC DD"), MAX_PAYLOAD).unwrap();
        assert_eq!(cmd.direction(), Direction::Write);
        assert_eq!(cmd.encode(), vec![0x00, 0x0D, 0x00, 0x02, 0xCC, 0xDD]);
    }

    #[test]
    fn test_write_token_shortfall() {
        let err = RegisterCommand::parse(&tokens("01 00 0D 00 03 CC DD"), MAX_PAYLOAD).unwrap_err();
        assert!(err.to_string().contains("not enough data"), "{err}");
    }

    #[test]
    fn test_write_excess_tokens() {
        assert!(RegisterCommand::parse(&tokens("01 00 0D 00 01 CC DD"), MAX_PAYLOAD).is_err());
    }

    #[test]
    fn test_write_bad_data_token() {
        assert!(RegisterCommand::parse(&tokens("01 00 0D 00 02 CC QQ"), MAX_PAYLOAD).is_err());
    }

    #[test]
    fn test_too_few_tokens_prints_usage() {
        let err = RegisterCommand::parse(&tokens("00 00 01 00"), MAX_PAYLOAD).unwrap_err();
        assert!(err.to_string().contains("readwrite 00 00 01 00 01"), "{err}");
    }

    #[test]
    fn test_bad_type() {
        assert!(RegisterCommand::parse(&tokens("rd 00 01 00 01"), MAX_PAYLOAD).is_err());
    }

    #[test]
    fn test_payload_slice() {
        let cmd = RegisterCommand::parse(&tokens("0 00 00 00 02"), MAX_PAYLOAD).unwrap();
        let frame = [0, 0, 0, 2, 0xAA, 0xBB];
        assert_eq!(cmd.payload(&frame), &[0xAA, 0xBB]);
        assert_eq!(cmd.payload(&frame[..3]), &[] as &[u8]);
    }
}
