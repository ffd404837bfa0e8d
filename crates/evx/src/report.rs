//! 📊 report.rs — the end-of-shift summary. "So, how'd it go?"
//!
//! 🚀 When the pool drains and the last batch lands, somebody should say how many
//! rows made it and how many didn't. This module says it, in a table so comfy it
//! has lumbar support.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::supervisors::HealthSnapshot;

/// 🔢 1500000 → "1,500,000". Counted from the right, three digits at a time.
fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(",")
}

/// ⏱️ Uptime as a wall clock. The hours hand only shows up once it has moved.
fn clock_face(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    match (secs / 3600, secs / 60 % 60, secs % 60) {
        (0, m, s) => format!("{m:02}:{s:02}"),
        (h, m, s) => format!("{h}:{m:02}:{s:02}"),
    }
}

/// 🍽️ Render the final snapshot. Two columns, right-aligned values, no borders.
pub(crate) fn summary_table(snapshot: &HealthSnapshot, uptime: Duration) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let rows = [
        ("uptime", clock_face(uptime)),
        (
            "workers alive",
            format!("{} / {}", snapshot.workers_alive, snapshot.workers_configured),
        ),
        ("commits", with_thousands(snapshot.commits)),
        ("empty commits", with_thousands(snapshot.empty_commits)),
        ("records committed", with_thousands(snapshot.records_committed)),
        ("records lost", with_thousands(snapshot.records_lost)),
        ("sink failures", with_thousands(snapshot.failures)),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1_000), "1,000");
        assert_eq!(with_thousands(12_345), "12,345");
        assert_eq!(with_thousands(u64::MAX), "18,446,744,073,709,551,615");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hours_hand() {
        assert_eq!(clock_face(Duration::from_millis(999)), "00:00");
        assert_eq!(clock_face(Duration::from_secs(65)), "01:05");
        assert_eq!(clock_face(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(clock_face(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn the_one_where_the_summary_tells_the_whole_story() {
        let snapshot = HealthSnapshot {
            workers_configured: 2,
            workers_alive: 0,
            commits: 12,
            empty_commits: 3,
            records_committed: 1_500_000,
            records_lost: 42,
            failures: 1,
        };
        let rendered = summary_table(&snapshot, Duration::from_secs(90));

        assert!(rendered.contains("0 / 2"));
        assert!(rendered.contains("1,500,000"));
        assert!(rendered.contains("records lost"));
        assert!(rendered.contains("01:30"));
    }
}
