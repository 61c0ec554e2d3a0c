//! Control, test and register command implementations.

use {
    crate::{Cli, commands::open_dispatcher},
    anyhow::{Context, Result},
    console::style,
    sensorhub::{Mode, Operation, Report, Settings, protocol::hex},
};

/// Status line printed after a command without data output.
fn done_message(mode: Mode) -> &'static str {
    match mode {
        Mode::Normal => "Hub reset to normal mode",
        Mode::TestBoot => "Hub sent to boot mode",
        Mode::Factory => "Switched to factory mode",
        Mode::Debug => "Debug level set",
        Mode::TestWrite | Mode::TestMultiWrite => "Data written",
        Mode::ReadWrite => "Register written",
        _ => "Done",
    }
}

/// Run a control, test or register operation and print its result.
///
/// Bytes read from the hub go to stdout as space separated hex pairs.
pub(crate) fn cmd_device(cli: &Cli, settings: Settings, operation: Operation) -> Result<()> {
    let mode = operation.mode();
    let mut dispatcher = open_dispatcher(settings)?;

    let report = dispatcher
        .run(operation)
        .with_context(|| format!("Command '{mode}' failed"))?;

    match report {
        Report::Bytes(bytes) => println!("{}", hex::dump(&bytes)),
        Report::Unsupported(_) => {
            if !cli.quiet {
                eprintln!(
                    "{} '{mode}' is not supported by this hub protocol",
                    style("⚠").yellow()
                );
            }
        },
        _ => {
            if !cli.quiet {
                eprintln!("{} {}", style("✓").green(), done_message(mode));
            }
        },
    }

    Ok(())
}
