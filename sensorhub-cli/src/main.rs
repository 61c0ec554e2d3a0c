//! sensorhub CLI - Command-line tool for updating and testing MSP430 sensor hubs.
//!
//! ## Features
//!
//! - Version-checked firmware installation (primary and factory images)
//! - Generic register read/write
//! - Bring-up test hooks (single/multi byte reads and writes, boot mode)
//! - Driver debug level toggling
//! - Shell completion generation
//! - Environment variable and config file support
//!
//! ## Exit codes
//!
//! | code | meaning                                         |
//! |------|-------------------------------------------------|
//! | 0    | success                                         |
//! | 1    | command failed (channel error, retries exhausted) |
//! | 2    | invalid invocation or arguments                 |
//! | 3    | configuration error                             |
//! | 4    | device node could not be opened                 |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use sensorhub::{Mode, Operation};
use std::env;
use std::path::PathBuf;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::Config;

/// sensorhub - Firmware update and diagnostic tool for MSP430 sensor hubs.
///
/// Environment variables:
///   SENSORHUB_DEVICE   - Sensor hub device node (default: /dev/msp430)
///   SENSORHUB_CONFIG   - Path to a configuration file
#[derive(Parser)]
#[command(name = "sensorhub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Sensor hub device node.
    #[arg(short, long, global = true, env = "SENSORHUB_DEVICE", value_name = "PATH")]
    device: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, env = "SENSORHUB_CONFIG", value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Install the primary firmware image if the hub runs an older version.
    Boot {
        /// Download even if the installed version is current.
        #[arg(short, long)]
        force: bool,
    },

    /// Install the factory firmware image, then switch to factory mode.
    #[command(name = "bootfactory")]
    BootFactory {
        /// Download even if the installed version is current.
        #[arg(short, long)]
        force: bool,
    },

    /// Restart the hub in normal mode.
    Normal,

    /// Test hook: put the hub in boot mode.
    #[command(name = "tboot")]
    TestBoot,

    /// Test hook: select a register, then read single bytes.
    #[command(name = "tread")]
    TestRead {
        /// <register> <count>, hex bytes.
        tokens: Vec<String>,
    },

    /// Test hook: write single bytes, one request each.
    #[command(name = "twrite")]
    TestWrite {
        /// Hex bytes to write.
        tokens: Vec<String>,
    },

    /// Test hook: read several bytes starting at an address.
    #[command(name = "tmread")]
    TestMultiRead {
        /// <address> <count>, hex bytes.
        tokens: Vec<String>,
    },

    /// Test hook: write several bytes in one raw write.
    #[command(name = "tmwrite")]
    TestMultiWrite {
        /// Hex bytes to write.
        tokens: Vec<String>,
    },

    /// Set the driver debug level (00 disables kernel dynamic debug).
    Debug {
        /// <level>, hex byte.
        tokens: Vec<String>,
    },

    /// User profile data (no device operation).
    #[command(name = "udata")]
    UserData,

    /// Switch the hub to factory mode.
    Factory,

    /// Active mode (no device operation).
    Active,

    /// Passive mode (no device operation).
    Passive,

    /// Show expected and installed firmware versions.
    #[command(name = "getversion")]
    GetVersion {
        /// Output versions as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generic register access: <type> <addr_hi> <addr_lo> <size_hi> <size_lo> [data...].
    #[command(name = "readwrite")]
    ReadWrite {
        /// Type (0 = read, 1 = write), header bytes and data bytes.
        tokens: Vec<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Mode, force flag and trailing tokens of a device command.
    fn invocation(&self) -> Option<(Mode, bool, &[String])> {
        let none: &[String] = &[];
        let invocation = match self {
            Self::Boot { force } => (Mode::Boot, *force, none),
            Self::BootFactory { force } => (Mode::BootFactory, *force, none),
            Self::Normal => (Mode::Normal, false, none),
            Self::TestBoot => (Mode::TestBoot, false, none),
            Self::TestRead { tokens } => (Mode::TestRead, false, tokens.as_slice()),
            Self::TestWrite { tokens } => (Mode::TestWrite, false, tokens.as_slice()),
            Self::TestMultiRead { tokens } => (Mode::TestMultiRead, false, tokens.as_slice()),
            Self::TestMultiWrite { tokens } => (Mode::TestMultiWrite, false, tokens.as_slice()),
            Self::Debug { tokens } => (Mode::Debug, false, tokens.as_slice()),
            Self::UserData => (Mode::UserData, false, none),
            Self::Factory => (Mode::Factory, false, none),
            Self::Active => (Mode::Active, false, none),
            Self::Passive => (Mode::Passive, false, none),
            Self::GetVersion { .. } => (Mode::GetVersion, false, none),
            Self::ReadWrite { tokens } => (Mode::ReadWrite, false, tokens.as_slice()),
            Self::Completions { .. } => return None,
        };
        Some(invocation)
    }
}

/// Map an error to the process exit status.
fn exit_code(err: &anyhow::Error) -> i32 {
    let lib_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<sensorhub::Error>());

    match lib_error {
        Some(e) if e.is_usage() => 2,
        Some(sensorhub::Error::Config(_)) => 3,
        Some(sensorhub::Error::DeviceOpen { .. }) => 4,
        _ => 1,
    }
}

fn main() {
    // NO_COLOR and TTY detection
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "sensorhub v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let Some((mode, force, tokens)) = cli.command.invocation() else {
        if let Commands::Completions { shell } = &cli.command {
            commands::completions::cmd_completions(*shell);
        }
        return Ok(());
    };

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let mut settings = config.to_settings();
    if let Some(device) = &cli.device {
        settings.device.clone_from(device);
    }
    settings.validate()?;

    // Every token is checked before the device is opened.
    let operation = Operation::parse(mode, force, tokens, settings.max_register_payload)
        .with_context(|| format!("Invalid arguments for '{mode}'"))?;

    match (&cli.command, operation) {
        (_, Operation::Install { image, force }) => {
            commands::install::cmd_install(cli, settings, image, force)
        },
        (Commands::GetVersion { json }, op) => commands::version::cmd_getversion(cli, settings, op, *json),
        (_, op) => commands::device::cmd_device(cli, settings, op),
    }
}
