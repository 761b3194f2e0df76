//! Report formatting
//!
//! Fixed-width text rendering of the accumulated statistics. Pure
//! functions of the aggregate snapshot and the per-destination map.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::stats::{Snapshot, Statistic};

/// Width of the destination label column.
const LABEL_WIDTH: usize = 21;

/// The five statistic fields: count, min, avg, max, stddev.
pub fn statistic_line(snapshot: &Snapshot) -> String {
    format!(
        "{:6} {:6} {:6.1} {:6} {:6.1}",
        snapshot.count, snapshot.min, snapshot.mean, snapshot.max, snapshot.stddev
    )
}

/// Per-connection line printed the instant a close is detected.
pub fn live_line(destination: &str, requests: u64) -> String {
    format!("{destination:<LABEL_WIDTH$} {requests}")
}

/// The full two-section report.
pub fn render(aggregate: &Snapshot, per_destination: &BTreeMap<String, Statistic>) -> String {
    let mut out = String::new();

    out.push_str("Aggregate: (connections, min, avg, max, stddev)\n");
    out.push_str(&statistic_line(aggregate));
    out.push_str("\n\n");
    out.push_str("Per-connection: (connections, min, avg, max, stddev)");

    for (destination, statistic) in per_destination {
        let _ = write!(
            out,
            "\n{destination:<LABEL_WIDTH$} {}",
            statistic_line(&statistic.snapshot())
        );
    }

    out
}
