//! Inbound commands (`symbion/emoncms/command@v1`)

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::form_urlencoded;

pub const COMMAND_TOPIC: &str = "symbion/emoncms/command@v1";

const OBJECT_NAME: &str = "event.object.name";
const EXCLUDED_BEHAVIOR: &str = "data";

static BEHAVIOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^current\.object\.behavior\.(.*)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    SaveData,
    ExtractData,
    Unknown(String),
}

/// A command as published on the bus: a flat property table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Command {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Property as text. Strings are taken verbatim, other scalars as their
    /// JSON text; `null` counts as absent.
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(value_text)
    }

    pub fn kind(&self) -> CommandKind {
        match self.property("command") {
            None => CommandKind::SaveData,
            Some(name) if name.is_empty() || name.eq_ignore_ascii_case("SAVE-DATA") => CommandKind::SaveData,
            Some(name) if name == "EXTRACT-DATA" => CommandKind::ExtractData,
            Some(name) => CommandKind::Unknown(name),
        }
    }

    pub fn object_name(&self) -> Option<String> {
        self.property(OBJECT_NAME)
    }

    /// Current behaviour values, sorted by behaviour name, without `data`.
    pub fn behaviors(&self) -> Vec<(String, String)> {
        let mut found: Vec<(String, String)> = self
            .properties
            .iter()
            .filter_map(|(key, value)| {
                let caps = BEHAVIOR_RE.captures(key)?;
                let behavior = caps.get(1)?.as_str();
                if behavior == EXCLUDED_BEHAVIOR {
                    return None;
                }
                Some((behavior.to_string(), value_text(value)?))
            })
            .collect();
        found.sort();
        found
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Batch key for `object.behavior`, form-urlencoded (spaces become `+`).
pub fn encode_key(object: &str, behavior: &str) -> String {
    form_urlencoded::byte_serialize(format!("{object}.{behavior}").as_bytes()).collect()
}
