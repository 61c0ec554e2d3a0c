//! Sequential packet reader over a firmware image.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Largest packet handed to the driver in one write.
pub const MAX_PACKET_LEN: usize = 256;

/// Firmware image consumed strictly in order, in packets of at most
/// `packet_len` bytes.
#[derive(Debug)]
pub struct FirmwareImage<R> {
    reader: R,
    packet_len: usize,
    len: Option<u64>,
    path: Option<PathBuf>,
}

impl FirmwareImage<BufReader<File>> {
    /// Open an image file.
    ///
    /// A file that cannot be opened is reported as
    /// [`Error::MissingResource`] so callers can treat it as "no update".
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::MissingResource {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .ok()
            .map(|m| m.len());

        let mut image = Self::new(BufReader::new(file));
        image.len = len;
        image.path = Some(path.to_path_buf());
        Ok(image)
    }
}

impl<R: Read + Seek> FirmwareImage<R> {
    /// Wrap a reader using the default packet length.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            packet_len: MAX_PACKET_LEN,
            len: None,
            path: None,
        }
    }

    /// Use a different packet length, clamped to `1..=MAX_PACKET_LEN`.
    #[must_use]
    pub fn with_packet_len(mut self, packet_len: usize) -> Self {
        self.packet_len = packet_len.clamp(1, MAX_PACKET_LEN);
        self
    }

    /// Image length in bytes, when known.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// Whether the image is known to be empty.
    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// File the image was opened from.
    pub fn path(&self) -> Option<&Path> {
        self.path
            .as_deref()
    }

    /// Packet length in use.
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    /// Read the next packet into `buf`; returns `0` at end of image.
    ///
    /// A packet is only short when the image ends inside it.
    pub fn next_packet(&mut self, buf: &mut [u8; MAX_PACKET_LEN]) -> Result<usize> {
        let want = &mut buf[..self.packet_len];
        let mut filled = 0;

        while filled < want.len() {
            match self.reader.read(&mut want[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(filled)
    }

    /// Seek back to the first byte for another attempt.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(0))?;
        Ok(())
    }
}
