//! Sensor resolution: turns one device of a decoded document into readings
//!
//! A device with explicit sensors in the board config is resolved only by
//! their raw indices. Any other device goes through structural discovery, a
//! declarative `{prefix -> name}` table matched against its field catalog.

use crate::board::{Board, UnsetAttribute};
use crate::catalog::{CatalogError, TelemetryDocument};
use serde::Deserialize;
use symbion_plugin_common::reading::Reading;
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("device {device} sensor {sensor}: {source}")]
    Sensor {
        device: u32,
        sensor: u32,
        #[source]
        source: UnsetAttribute,
    },
}

/// One structural discovery rule: fields starting with `prefix` become
/// readings named `<name><ordinal>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldPattern {
    pub prefix: String,
    pub name: String,
}

impl FieldPattern {
    pub fn new(prefix: &str, name: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            name: name.to_string(),
        }
    }
}

pub fn default_patterns() -> Vec<FieldPattern> {
    vec![
        FieldPattern::new("Temperature", "temp"),
        FieldPattern::new("Pump speed relay", "relay"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Explicit,
    Discovered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub mode: Resolution,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone)]
pub struct SensorResolver {
    patterns: Vec<FieldPattern>,
}

impl Default for SensorResolver {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}

impl SensorResolver {
    pub fn new(patterns: Vec<FieldPattern>) -> Self {
        Self { patterns }
    }

    /// Resolves every reading of `device` for this cycle, all stamped `at`.
    pub fn resolve(
        &self,
        board: &Board,
        doc: &TelemetryDocument,
        device: usize,
        at: OffsetDateTime,
    ) -> Result<Resolved, ResolveError> {
        doc.header(device)?;

        let configured = u32::try_from(device)
            .ok()
            .filter(|&d| board.configured_sensors(d) > 0)
            .and_then(|d| board.device(d).map(|cfg| (d, cfg)));

        match configured {
            Some((number, cfg)) => {
                let mut readings = Vec::with_capacity(cfg.sensors.len());
                for (&sensor, spec) in &cfg.sensors {
                    let unset = |source| ResolveError::Sensor {
                        device: number,
                        sensor,
                        source,
                    };
                    let name = spec.name().map_err(unset)?;
                    let index = spec.index().map_err(unset)?;
                    let value = doc.raw_value(device, index)?;
                    readings.push(Reading::new(board.address(), name, value, at));
                }
                Ok(Resolved {
                    mode: Resolution::Explicit,
                    readings,
                })
            }
            None => self.discover(board, doc, device, at),
        }
    }

    fn discover(
        &self,
        board: &Board,
        doc: &TelemetryDocument,
        device: usize,
        at: OffsetDateTime,
    ) -> Result<Resolved, ResolveError> {
        let mut readings = Vec::new();
        for pattern in &self.patterns {
            let count = doc.field_count(device, &pattern.prefix)?;
            for ordinal in 1..=count {
                let index = match doc.field_index(device, &pattern.prefix, ordinal) {
                    Ok(index) => index,
                    Err(e @ CatalogError::FieldNotFound { .. }) => {
                        warn!("{}: {}", board.address(), e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let value = doc.raw_value(device, index)?;
                readings.push(Reading::new(
                    board.address(),
                    format!("{}{}", pattern.name, ordinal),
                    value,
                    at,
                ));
            }
        }
        debug!(
            "{}: device {} discovered {} reading(s)",
            board.address(),
            device,
            readings.len()
        );
        Ok(Resolved {
            mode: Resolution::Discovered,
            readings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use symbion_devkit::{dl2_document, DeviceFixture};
    use time::macros::datetime;

    const AT: OffsetDateTime = datetime!(2024-03-01 10:00 UTC);

    fn decode(value: serde_json::Value) -> TelemetryDocument {
        TelemetryDocument::decode(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    fn two_device_document() -> TelemetryDocument {
        decode(dl2_document(&[
            DeviceFixture::new("DeltaSol MX")
                .field("Temperature sensor 1", 10.0)
                .field("Temperature sensor 2", 11.0)
                .field("Temperature sensor 3", 12.0)
                .field("Flow rate", 13.5)
                .field("Pump speed relay 1", 14.0)
                .field("Heat quantity", 15.25),
            DeviceFixture::new("WMZ")
                .field("Temperature 1", 42.5)
                .field("Temperature 2", 38.0),
        ]))
    }

    fn explicit_board() -> Board {
        let mut board = Board::new("192.168.1.201", 80, false);
        board.set_sensor_name(0, 1, "flow");
        board.set_sensor_index(0, 1, 3);
        board.set_sensor_name(0, 2, "heat");
        board.set_sensor_index(0, 2, 5);
        board
    }

    #[test]
    fn test_explicit_and_discovered_devices() {
        let doc = two_device_document();
        let board = explicit_board();
        let resolver = SensorResolver::default();

        let first = resolver.resolve(&board, &doc, 0, AT).unwrap();
        assert_eq!(first.mode, Resolution::Explicit);
        assert_eq!(
            first.readings,
            vec![
                Reading::new("192.168.1.201:80", "flow", 13.5, AT),
                Reading::new("192.168.1.201:80", "heat", 15.25, AT),
            ]
        );

        let second = resolver.resolve(&board, &doc, 1, AT).unwrap();
        assert_eq!(second.mode, Resolution::Discovered);
        let names: Vec<_> = second.readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["temp1", "temp2"]);
        assert_eq!(second.readings[0].value, 42.5);
        assert_eq!(second.readings[1].value, 38.0);
    }

    #[test]
    fn test_explicit_device_is_never_discovered() {
        let doc = two_device_document();
        let mut board = Board::new("10.0.0.5", 80, false);
        board.set_sensor_name(0, 7, "collector");
        board.set_sensor_index(0, 7, 0);

        let resolved = SensorResolver::default().resolve(&board, &doc, 0, AT).unwrap();
        assert_eq!(resolved.mode, Resolution::Explicit);
        assert_eq!(resolved.readings.len(), 1);
        assert!(resolved.readings.iter().all(|r| !r.name.starts_with("temp")));
    }

    #[test]
    fn test_sensors_resolved_in_ascending_order() {
        let doc = two_device_document();
        let mut board = Board::new("10.0.0.5", 80, false);
        board.set_sensor_name(0, 9, "last");
        board.set_sensor_index(0, 9, 1);
        board.set_sensor_name(0, 2, "first");
        board.set_sensor_index(0, 2, 0);

        let resolved = SensorResolver::default().resolve(&board, &doc, 0, AT).unwrap();
        let names: Vec<_> = resolved.readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "last"]);
    }

    #[test]
    fn test_device_name_only_still_discovers() {
        let doc = two_device_document();
        let mut board = Board::new("10.0.0.5", 80, false);
        board.set_device_name(0, "Solar");

        let resolved = SensorResolver::default().resolve(&board, &doc, 0, AT).unwrap();
        assert_eq!(resolved.mode, Resolution::Discovered);
        let names: Vec<_> = resolved.readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["temp1", "temp2", "temp3", "relay1"]);
    }

    #[test]
    fn test_unset_index_is_sensor_error() {
        let doc = two_device_document();
        let mut board = Board::new("10.0.0.5", 80, false);
        board.set_sensor_name(0, 1, "orphan");

        let err = SensorResolver::default().resolve(&board, &doc, 0, AT).unwrap_err();
        assert!(matches!(err, ResolveError::Sensor { device: 0, sensor: 1, .. }));
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let doc = two_device_document();
        let mut board = Board::new("10.0.0.5", 80, false);
        board.set_sensor_name(1, 1, "ghost");
        board.set_sensor_index(1, 1, 12);

        let err = SensorResolver::default().resolve(&board, &doc, 1, AT).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Catalog(CatalogError::MissingValue { device: 1, index: 12 })
        ));
    }

    #[test]
    fn test_custom_discovery_table() {
        let doc = two_device_document();
        let board = Board::new("10.0.0.5", 80, false);
        let resolver = SensorResolver::new(vec![FieldPattern::new("Pump speed relay", "pump")]);

        let resolved = resolver.resolve(&board, &doc, 0, AT).unwrap();
        assert_eq!(resolved.readings, vec![Reading::new("10.0.0.5:80", "pump1", 14.0, AT)]);
    }

    #[test]
    fn test_unmatched_ordinal_is_skipped() {
        let doc = decode(json!({
            "headers": [ { "source_name": "XL", "fields": [
                { "name": "Temperature sensor 1" },
                { "name": "Temperature sensor 4" }
            ] } ],
            "headersets": [ { "packets": [ { "header_index": 0, "field_values": [
                { "field_index": 0, "raw_value": 20.0 },
                { "field_index": 1, "raw_value": 40.0 }
            ] } ] } ]
        }));
        let board = Board::new("10.0.0.5", 80, false);

        let resolved = SensorResolver::default().resolve(&board, &doc, 0, AT).unwrap();
        let names: Vec<_> = resolved.readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["temp1"]);
    }

    #[test]
    fn test_device_out_of_range() {
        let doc = two_device_document();
        let board = explicit_board();
        let err = SensorResolver::default().resolve(&board, &doc, 2, AT).unwrap_err();
        assert!(matches!(err, ResolveError::Catalog(CatalogError::DeviceOutOfRange { .. })));
    }
}
