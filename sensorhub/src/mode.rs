//! Mode words and typed operations.
//!
//! A run selects exactly one [`Mode`] from its command word. The mode and its
//! trailing tokens are turned into an [`Operation`] up front, so every hex
//! token is validated before the device is touched.

use std::fmt;

use crate::error::{Error, Result};
use crate::protocol::hex;
use crate::protocol::register::RegisterCommand;

/// Operating mode selected by the command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Install the primary image when an update is needed.
    Boot,
    /// Install the factory image when an update is needed.
    BootFactory,
    /// Restart the application firmware.
    Normal,
    /// Test hook: enter boot mode.
    TestBoot,
    /// Test hook: single-byte reads.
    TestRead,
    /// Test hook: single-byte writes.
    TestWrite,
    /// Test hook: write-read of several bytes.
    TestMultiRead,
    /// Test hook: raw multi-byte write.
    TestMultiWrite,
    /// Set the driver debug level.
    Debug,
    /// User profile data.
    UserData,
    /// Switch to factory mode.
    Factory,
    /// Active sensor mode.
    Active,
    /// Passive sensor mode.
    Passive,
    /// Query versions.
    GetVersion,
    /// Generic register read/write.
    ReadWrite,
    /// Unrecognized command word.
    Invalid,
}

impl Mode {
    /// Every recognized mode, in command word order.
    pub const ALL: [Self; 15] = [
        Self::Boot,
        Self::BootFactory,
        Self::Normal,
        Self::TestBoot,
        Self::TestRead,
        Self::TestWrite,
        Self::TestMultiRead,
        Self::TestMultiWrite,
        Self::Debug,
        Self::UserData,
        Self::Factory,
        Self::Active,
        Self::Passive,
        Self::GetVersion,
        Self::ReadWrite,
    ];

    /// Resolve a command word. Unknown words give [`Mode::Invalid`].
    pub fn from_word(word: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|mode| mode.word() == word)
            .unwrap_or(Self::Invalid)
    }

    /// Command word of this mode.
    pub fn word(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::BootFactory => "bootfactory",
            Self::Normal => "normal",
            Self::TestBoot => "tboot",
            Self::TestRead => "tread",
            Self::TestWrite => "twrite",
            Self::TestMultiRead => "tmread",
            Self::TestMultiWrite => "tmwrite",
            Self::Debug => "debug",
            Self::UserData => "udata",
            Self::Factory => "factory",
            Self::Active => "active",
            Self::Passive => "passive",
            Self::GetVersion => "getversion",
            Self::ReadWrite => "readwrite",
            Self::Invalid => "invalid",
        }
    }

    /// Whether `--force` applies to this mode.
    pub fn accepts_force(self) -> bool {
        matches!(self, Self::Boot | Self::BootFactory)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.word())
    }
}

/// Which image an install writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Variant-specific image, gated by the version check.
    Primary,
    /// Fixed factory image.
    Factory,
}

impl ImageKind {
    /// Operation performed instead of the install when no update is needed.
    pub fn reset_transition(self) -> Operation {
        match self {
            Self::Primary => Operation::NormalReset,
            Self::Factory => Operation::FactoryMode,
        }
    }
}

/// A fully validated command, ready for [`CommandDispatcher::run`].
///
/// [`CommandDispatcher::run`]: crate::CommandDispatcher::run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Firmware install; `force` skips the version check.
    Install {
        /// Image to write.
        image: ImageKind,
        /// Ignore the version check.
        force: bool,
    },
    /// Restore normal mode.
    NormalReset,
    /// Test hook: boot mode.
    TestBoot,
    /// Write `register`, then read `count` single bytes.
    TestRead {
        /// Register selected with a test write.
        register: u8,
        /// Bytes to read.
        count: u8,
    },
    /// One test write per byte.
    TestWrite {
        /// Bytes to write.
        bytes: Vec<u8>,
    },
    /// Write-read of `count` bytes starting at `address`.
    TestMultiRead {
        /// Start address.
        address: u8,
        /// Bytes to read.
        count: u8,
    },
    /// One raw write of all bytes.
    TestMultiWrite {
        /// Bytes to write.
        bytes: Vec<u8>,
    },
    /// Set the driver debug level and toggle kernel dynamic debug.
    Debug {
        /// Debug level; `0` disables.
        level: u8,
    },
    /// Switch to factory mode.
    FactoryMode,
    /// Report expected and installed versions.
    GetVersion,
    /// Generic register access.
    Register(RegisterCommand),
    /// Mode with no device action in this protocol.
    Unsupported(Mode),
}

impl Operation {
    /// Build the operation for `mode` from its trailing tokens.
    ///
    /// All decoding happens here. Errors are [`Error::Validation`] for bad
    /// tokens and [`Error::InvalidInvocation`] for unusable mode/flag
    /// combinations.
    pub fn parse<S: AsRef<str>>(
        mode: Mode,
        force: bool,
        tokens: &[S],
        max_register_payload: u16,
    ) -> Result<Self> {
        if force && !mode.accepts_force() {
            return Err(Error::InvalidInvocation(format!(
                "--force only applies to boot and bootfactory, not {mode}"
            )));
        }

        let op = match mode {
            Mode::Boot => Self::Install {
                image: ImageKind::Primary,
                force,
            },
            Mode::BootFactory => Self::Install {
                image: ImageKind::Factory,
                force,
            },
            Mode::Normal => Self::NormalReset,
            Mode::TestBoot => Self::TestBoot,
            Mode::TestRead => {
                let [register, count] = required_bytes::<2, _>(mode, tokens, &["register", "count"])?;
                Self::TestRead { register, count }
            },
            Mode::TestMultiRead => {
                let [address, count] = required_bytes::<2, _>(mode, tokens, &["address", "count"])?;
                Self::TestMultiRead { address, count }
            },
            Mode::TestWrite => Self::TestWrite {
                bytes: byte_list(mode, tokens)?,
            },
            Mode::TestMultiWrite => Self::TestMultiWrite {
                bytes: byte_list(mode, tokens)?,
            },
            Mode::Debug => {
                let [level] = required_bytes::<1, _>(mode, tokens, &["level"])?;
                Self::Debug { level }
            },
            Mode::Factory => Self::FactoryMode,
            Mode::GetVersion => Self::GetVersion,
            Mode::ReadWrite => Self::Register(RegisterCommand::parse(tokens, max_register_payload)?),
            Mode::UserData | Mode::Active | Mode::Passive => Self::Unsupported(mode),
            Mode::Invalid => {
                return Err(Error::InvalidInvocation(
                    "unknown mode; expected one of boot, bootfactory, normal, tboot, tread, \
                     twrite, tmread, tmwrite, debug, udata, factory, active, passive, \
                     getversion, readwrite"
                        .into(),
                ));
            },
        };

        Ok(op)
    }

    /// Mode this operation was built from.
    pub fn mode(&self) -> Mode {
        match self {
            Self::Install {
                image: ImageKind::Primary,
                ..
            } => Mode::Boot,
            Self::Install {
                image: ImageKind::Factory,
                ..
            } => Mode::BootFactory,
            Self::NormalReset => Mode::Normal,
            Self::TestBoot => Mode::TestBoot,
            Self::TestRead { .. } => Mode::TestRead,
            Self::TestWrite { .. } => Mode::TestWrite,
            Self::TestMultiRead { .. } => Mode::TestMultiRead,
            Self::TestMultiWrite { .. } => Mode::TestMultiWrite,
            Self::Debug { .. } => Mode::Debug,
            Self::FactoryMode => Mode::Factory,
            Self::GetVersion => Mode::GetVersion,
            Self::Register(_) => Mode::ReadWrite,
            Self::Unsupported(mode) => *mode,
        }
    }
}

/// First byte of a test-family token.
fn first_byte(mode: Mode, token: &str) -> Result<u8> {
    hex::decode_first(token)
        .ok_or_else(|| Error::Validation(format!("{mode}: '{token}' is not a hex byte")))
}

fn required_bytes<const N: usize, S: AsRef<str>>(
    mode: Mode,
    tokens: &[S],
    names: &[&str; N],
) -> Result<[u8; N]> {
    if tokens.len() < N {
        return Err(Error::Validation(format!(
            "{mode} needs <{}>",
            names.join("> <")
        )));
    }

    let mut out = [0u8; N];
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = first_byte(mode, token.as_ref())?;
    }
    Ok(out)
}

fn byte_list<S: AsRef<str>>(mode: Mode, tokens: &[S]) -> Result<Vec<u8>> {
    if tokens.is_empty() {
        return Err(Error::Validation(format!("{mode} needs at least one <byte>")));
    }
    tokens
        .iter()
        .map(|token| first_byte(mode, token.as_ref()))
        .collect()
}
