//! Command implementations.
//!
//! Each subcommand family is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod install;
pub(crate) mod version;

use {
    anyhow::Result,
    log::debug,
    sensorhub::{CommandDispatcher, IoctlChannel, Settings},
};

/// Open the device node and hand it to a dispatcher.
///
/// The device stays open until the dispatcher is dropped.
pub(crate) fn open_dispatcher(settings: Settings) -> Result<CommandDispatcher<IoctlChannel>> {
    let channel = IoctlChannel::open(&settings.device)?;
    debug!("Opened {}", settings.device.display());
    Ok(CommandDispatcher::new(channel, settings))
}
