//! Configuration loading
//!
//! Plugins read a YAML document whose path comes from an environment variable
//! (a `.env` file is honoured first). A missing or empty file yields the
//! plugin defaults, an unparsable one is an error.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no boards configured")]
    NoBoards,
    #[error("invalid value for '{key}': {value}")]
    BadValue { key: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConf {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".into()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: None,
        }
    }
}

/// One scalar of a configuration tuple. YAML lets operators write `80`,
/// `"80"` or `true`; all of them are accepted and converted on read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TupleValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TupleValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TupleValue::Integer(i) => Some(*i),
            TupleValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TupleValue::Flag(b) => Some(*b),
            TupleValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            TupleValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for TupleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleValue::Flag(b) => write!(f, "{b}"),
            TupleValue::Integer(i) => write!(f, "{i}"),
            TupleValue::Float(x) => write!(f, "{x}"),
            TupleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TupleValue {
    fn from(value: &str) -> Self {
        TupleValue::Text(value.to_string())
    }
}

/// A group of key/value settings describing one physical board.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConfigTuple(BTreeMap<String, TupleValue>);

impl ConfigTuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<TupleValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&TupleValue> {
        self.0.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TupleValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(ToString::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.as_int().ok_or_else(|| ConfigError::BadValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| ConfigError::BadValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl From<i64> for TupleValue {
    fn from(value: i64) -> Self {
        TupleValue::Integer(value)
    }
}

impl From<bool> for TupleValue {
    fn from(value: bool) -> Self {
        TupleValue::Flag(value)
    }
}

/// Resolves the config path from `env_var`, falling back to `default`.
pub fn config_path(env_var: &str, default: &str) -> PathBuf {
    dotenvy::dotenv().ok();
    std::env::var(env_var)
        .unwrap_or_else(|_| default.to_string())
        .into()
}

pub async fn load_yaml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!("no config at {}, using defaults", path.display());
        return Ok(T::default());
    }

    let txt = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if txt.trim().is_empty() {
        return Ok(T::default());
    }

    debug!("loading config from {}", path.display());
    serde_yaml::from_str(&txt).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        mqtt: MqttConf,
        #[serde(default)]
        boards: Vec<ConfigTuple>,
    }

    #[test]
    fn test_tuple_accessors() {
        let tuple = ConfigTuple::new()
            .with("ip-to-query", "10.0.0.7")
            .with("port-to-query", "8080")
            .with("log_source_data", true);

        assert_eq!(tuple.string_or("ip-to-query", "192.168.1.201"), "10.0.0.7");
        assert_eq!(tuple.string_or("missing", "fallback"), "fallback");
        assert_eq!(tuple.int_or("port-to-query", 80).unwrap(), 8080);
        assert_eq!(tuple.int_or("missing", 80).unwrap(), 80);
        assert!(tuple.bool_or("log_source_data", false).unwrap());
    }

    #[test]
    fn test_tuple_rejects_bad_integer() {
        let tuple = ConfigTuple::new().with("port-to-query", "eighty");
        assert!(matches!(
            tuple.int_or("port-to-query", 80),
            Err(ConfigError::BadValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let cfg: Sample = load_yaml(Path::new("/definitely/not/here.yaml")).await.unwrap();
        assert_eq!(cfg.mqtt.port, 1883);
        assert!(cfg.boards.is_empty());
    }

    #[tokio::test]
    async fn test_yaml_tuples_keep_scalar_kinds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mqtt:\n  host: broker.lan\nboards:\n  - ip-to-query: 192.168.1.50\n    port-to-query: 80\n    log_source_data: false\n    device0.sensor1.name: collector"
        )
        .unwrap();

        let cfg: Sample = load_yaml(file.path()).await.unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        let board = &cfg.boards[0];
        assert_eq!(board.get("port-to-query"), Some(&TupleValue::Integer(80)));
        assert_eq!(board.get("log_source_data"), Some(&TupleValue::Flag(false)));
        assert_eq!(board.string_or("device0.sensor1.name", ""), "collector");
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "boards: [unterminated").unwrap();
        let result: Result<Sample, _> = load_yaml(file.path()).await;
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
