//! Plain-text rendering of query results.

use std::io::{self, Write};

use trackhub_core::model::{TrackingEvent, TrackingNumber};
use trackhub_core::service::BatchReport;
use trackhub_core::sync::SyncReport;

/// Write every result of a batch, preceded by the truncation notice if any.
///
/// # Errors
///
/// Propagates write failures of `out`.
pub fn write_batch<W: Write>(out: &mut W, report: &BatchReport) -> io::Result<()> {
    if let Some(truncation) = report.truncation {
        writeln!(out, "note: {truncation}")?;
    }

    if report.results.is_empty() {
        return writeln!(out, "no tracking numbers found");
    }

    for result in &report.results {
        writeln!(out, "{} [{}]", result.tracking_number, result.route)?;
        for event in &result.events {
            writeln!(out, "  {}", event_line(event))?;
        }
        if let Some(message) = result.error_message() {
            writeln!(out, "  error: {message}")?;
        } else if result.is_empty() {
            writeln!(out, "  no tracking events yet")?;
        }
    }

    writeln!(out, "{} results", report.results.len())
}

/// Write the mirror outcome per pushed shipment.
///
/// # Errors
///
/// Propagates write failures of `out`.
pub fn write_sync<W: Write>(out: &mut W, pushed: &[(TrackingNumber, SyncReport)]) -> io::Result<()> {
    for (tracking_number, report) in pushed {
        writeln!(out, "synced {tracking_number}: {report}")?;
    }
    Ok(())
}

fn event_line(event: &TrackingEvent) -> String {
    let time = event
        .occurred_at
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    [time.as_str(), event.location.as_str(), event.description.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
