//! Firmware install command implementation (`boot`, `bootfactory`).

use {
    crate::{Cli, commands::open_dispatcher, use_fancy_output},
    anyhow::{Context, Result},
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    sensorhub::{ImageKind, Operation, Report, Settings, UpdateDecision},
};

/// Progress bar for the packet stream, hidden when quiet or not on a terminal.
fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

fn image_name(image: ImageKind) -> &'static str {
    match image {
        ImageKind::Primary => "primary",
        ImageKind::Factory => "factory",
    }
}

/// Install command implementation.
pub(crate) fn cmd_install(cli: &Cli, settings: Settings, image: ImageKind, force: bool) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Checking {} firmware on {}",
            style("📦").cyan(),
            image_name(image),
            settings.device.display()
        );
    }

    let mut dispatcher = open_dispatcher(settings)?;

    let pb = progress_bar(cli.quiet);
    pb.set_message("Downloading");
    let report = dispatcher
        .run_with_progress(Operation::Install { image, force }, |sent, total| {
            if total > 0 && pb.length() != Some(total) {
                pb.set_length(total);
            }
            pb.set_position(sent);
        })
        .with_context(|| format!("Installing {} firmware failed", image_name(image)))?;

    match report {
        Report::Installed {
            stats, verified, ..
        } => {
            pb.finish_with_message("Complete");
            if !cli.quiet {
                eprintln!(
                    "{} Wrote {} bytes in {} packets (attempt {})",
                    style("✓").green(),
                    stats.bytes,
                    stats.packets,
                    stats.attempt
                );
                match verified {
                    Some(true) => eprintln!(
                        "\n{} Firmware download completed successfully",
                        style("🎉").green().bold()
                    ),
                    Some(false) => eprintln!(
                        "{} Hub does not report the expected version after download",
                        style("⚠").yellow()
                    ),
                    None => {},
                }
            }
        },
        Report::UpToDate { decision, .. } => {
            pb.finish_and_clear();
            if !cli.quiet {
                let reason = match decision {
                    UpdateDecision::MatchNotNeeded => "Firmware is up to date",
                    _ => "No firmware available to install",
                };
                eprintln!("{} {reason}", style("ℹ").blue());
            }
        },
        other => {
            pb.finish_and_clear();
            log::debug!("Unexpected install report: {other:?}");
        },
    }

    Ok(())
}
