//! Accumulated telemetry between successful pushes

use crate::command::{encode_key, Command, CommandKind, COMMAND_TOPIC};
use std::collections::{BTreeMap, HashMap};
use symbion_plugin_common::Shared;
use tracing::{debug, info, warn};

/// Latest value per encoded key. Last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryBatch {
    entries: BTreeMap<String, String>,
}

impl TelemetryBatch {
    pub fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }

    pub fn merge(&mut self, other: TelemetryBatch) {
        self.entries.extend(other.entries);
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops the entries of `delivered` that still hold the delivered value.
    /// Keys updated since the snapshot was taken are kept for the next push.
    pub fn remove_delivered(&mut self, delivered: &TelemetryBatch) {
        for (key, value) in &delivered.entries {
            if self.entries.get(key) == Some(value) {
                self.entries.remove(key);
            }
        }
    }

    /// JSON object of key/value pairs, the `json` parameter of a push.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }
}

/// Merges SAVE-DATA commands into the shared batch.
#[derive(Clone)]
pub struct TelemetryBatcher {
    batch: Shared<TelemetryBatch>,
    valuemap: HashMap<String, String>,
}

impl TelemetryBatcher {
    pub fn new(batch: Shared<TelemetryBatch>, valuemap: HashMap<String, String>) -> Self {
        Self { batch, valuemap }
    }

    #[cfg(test)]
    pub fn batch(&self) -> Shared<TelemetryBatch> {
        self.batch.clone()
    }

    /// Entry point for publications received on the bus. Other topics and
    /// unparsable payloads store nothing.
    pub fn on_publish(&self, topic: &str, payload: &[u8]) -> usize {
        if topic != COMMAND_TOPIC {
            return 0;
        }
        match Command::parse(payload) {
            Ok(cmd) => self.handle(&cmd),
            Err(e) => {
                warn!("Invalid command payload on {}: {}", topic, e);
                0
            }
        }
    }

    /// Applies one command and returns how many entries it stored.
    pub fn handle(&self, cmd: &Command) -> usize {
        match cmd.kind() {
            CommandKind::SaveData => self.save(cmd),
            CommandKind::ExtractData => {
                info!("EXTRACT-DATA is not supported, ignored");
                0
            }
            CommandKind::Unknown(name) => {
                warn!("Unrecognised command: {}", name);
                0
            }
        }
    }

    fn save(&self, cmd: &Command) -> usize {
        let Some(object) = cmd.object_name() else {
            warn!("SAVE-DATA without event.object.name, ignored");
            return 0;
        };

        let mut update = TelemetryBatch::default();
        for (behavior, raw) in cmd.behaviors() {
            let key = encode_key(&object, &behavior);
            let value = self.valuemap.get(&raw).cloned().unwrap_or(raw);
            debug!("Saving: {}={}", key, value);
            update.insert(key, value);
        }

        let stored = update.len();
        self.batch.lock().merge(update);
        stored
    }
}
