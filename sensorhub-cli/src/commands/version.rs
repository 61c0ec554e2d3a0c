//! Version query command implementation (`getversion`).

use {
    crate::{Cli, commands::open_dispatcher},
    anyhow::{Result, bail},
    console::style,
    sensorhub::{Operation, Report, Settings, UpdateDecision, VersionReport},
};

fn decision_str(decision: UpdateDecision) -> &'static str {
    match decision {
        UpdateDecision::MatchNotNeeded => "up to date",
        UpdateDecision::MismatchUpdateNeeded => "update needed",
        UpdateDecision::Unknown => "unknown",
    }
}

fn version_str(version: Option<u32>) -> String {
    version.map_or_else(|| "-".to_string(), |v| format!("{v} (0x{v:02X})"))
}

/// Plain text report, one field per line.
fn render(report: &VersionReport) -> String {
    format!(
        "variant:   {}\nexpected:  {}\ninstalled: {}\nstatus:    {}",
        report
            .variant
            .as_deref()
            .unwrap_or("-"),
        version_str(report.expected),
        version_str(report.installed),
        decision_str(report.decision)
    )
}

/// Getversion command implementation.
pub(crate) fn cmd_getversion(cli: &Cli, settings: Settings, operation: Operation, json: bool) -> Result<()> {
    let mut dispatcher = open_dispatcher(settings)?;
    let Report::Version(report) = dispatcher.run(operation)? else {
        bail!("version query returned no version report");
    };

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    if !cli.quiet {
        eprintln!("{}", style("Firmware versions").bold().underlined());
    }
    println!("{}", render(&report));
    Ok(())
}
