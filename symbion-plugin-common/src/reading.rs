//! Sensor readings and their bus representation

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One measurement taken during a poll cycle. Never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// `<ip>:<port>` of the board the value came from
    pub source: String,
    pub name: String,
    pub value: f64,
    pub timestamp: OffsetDateTime,
}

impl Reading {
    pub fn new(source: impl Into<String>, name: impl Into<String>, value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            value,
            timestamp,
        }
    }

    /// Object address on the bus: `<ip>:<port>:<name>`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }

    pub fn formatted_value(&self) -> String {
        format_value(self.value)
    }
}

/// Doubles always keep a fractional part (`3.0`, not `3`), which is what
/// downstream consumers have always received.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

/// Payload published for each reading (contract `reading@v1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingEvent {
    pub protocol: String,
    pub object: String,
    pub source: String,
    pub name: String,
    pub value: String,
    pub ts: String,
}

impl ReadingEvent {
    pub fn from_reading(protocol: &str, reading: &Reading) -> Self {
        Self {
            protocol: protocol.to_string(),
            object: reading.address(),
            source: reading.source.clone(),
            name: reading.name.clone(),
            value: reading.formatted_value(),
            ts: reading.timestamp.format(&Rfc3339).unwrap_or_default(),
        }
    }
}
