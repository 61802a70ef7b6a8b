//! Extracts the two instrumented streams back out of a raw log.
//!
//! A shipper may prepend timestamps or levels; only the part of a line after
//! the logger token is ours.

use crate::event::Event;
use crate::snapshot::Record;
use crate::tag;

use super::builder::TraceError;

fn instrumented_payload(line: &str, log_type: &str) -> Option<String> {
    let (_, suffix) = line.split_once(tag::LOGGER_NAME)?;
    if !suffix.contains(log_type) {
        return None;
    }
    let stripped = tag::strip_log_key(suffix);
    Some(
        stripped
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim_end()
            .to_string(),
    )
}

/// Decodes every object-version record in the lines.
pub fn records_from_lines(lines: &[&str]) -> Result<Vec<Record>, TraceError> {
    let mut records = Vec::new();
    for line in lines {
        if let Some(payload) = instrumented_payload(line, tag::OBJECT_VERSION_KEY) {
            records.push(Record::from_json(&payload)?);
        }
    }
    Ok(records)
}

/// Decodes every controller-operation event in the lines.
pub fn events_from_lines(lines: &[&str]) -> Result<Vec<Event>, TraceError> {
    let mut events = Vec::new();
    for line in lines {
        if let Some(payload) = instrumented_payload(line, tag::CONTROLLER_OPERATION_KEY) {
            events.push(Event::from_json(&payload)?);
        }
    }
    Ok(events)
}
