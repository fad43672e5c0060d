//! Attendance report rows and CSV rendering.

use crate::session::SessionRoster;
use chrono::{DateTime, Utc};

/// Build the tabular attendance report: a header, one row per known
/// person, then a blank separator and summary rows.
pub fn attendance_rows(roster: &SessionRoster, at: DateTime<Utc>) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(roster.known_labels.len() + 5);
    rows.push(vec!["Name".to_string()]);
    for label in &roster.known_labels {
        rows.push(vec![label.clone()]);
    }
    rows.push(Vec::new());
    rows.push(vec!["Unknown".to_string(), roster.unknown_count.to_string()]);
    rows.push(vec![
        "Total".to_string(),
        (roster.known_labels.len() + roster.unknown_count).to_string(),
    ]);
    rows.push(vec!["Timestamp".to_string(), at.to_rfc3339()]);
    rows
}

/// Render the report as CSV text.
pub fn roster_csv(roster: &SessionRoster, at: DateTime<Utc>) -> String {
    let rows = attendance_rows(roster, at);
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
