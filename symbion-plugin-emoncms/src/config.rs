//! Emoncms plugin configuration (`emoncms.yaml`)
//!
//! Value aliases are flat keys, as operators have always written them:
//!
//! ```yaml
//! valuemap-true: 1
//! valuemap-false: 0
//! ```

use crate::backoff::BackoffPolicy;
use crate::push::{PushSettings, SUPPORTED_CHARSET};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use symbion_plugin_common::config::MqttConf;
use tracing::warn;

pub const CONFIG_ENV: &str = "SYMBION_EMONCMS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "emoncms.yaml";

const VALUEMAP_PREFIX: &str = "valuemap-";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EmoncmsConfig {
    pub mqtt: MqttConf,
    pub target: String,
    pub apikey: String,
    pub node: String,
    pub charset: String,
    /// Base push interval in milliseconds
    #[serde(alias = "polling-time")]
    pub post_interval: u64,
    /// Backoff ceiling in milliseconds
    pub max_post_interval: u64,
    /// Cumulative failed time before giving up, in milliseconds
    pub giveup_time: u64,
    pub socket_timeout: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for EmoncmsConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            target: String::new(),
            apikey: String::new(),
            node: String::new(),
            charset: SUPPORTED_CHARSET.to_string(),
            post_interval: 60_000,
            max_post_interval: 600_000,
            giveup_time: 3_600_000,
            socket_timeout: 1000,
            extra: BTreeMap::new(),
        }
    }
}

impl EmoncmsConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.post_interval.max(1)),
            Duration::from_millis(self.max_post_interval),
            Duration::from_millis(self.giveup_time),
        )
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            target: self.target.clone(),
            apikey: self.apikey.clone(),
            node: self.node.clone(),
            charset: self.charset.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout.max(1))
    }

    /// `valuemap-<raw>: <mapped>` entries as raw -> mapped.
    pub fn valuemap(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (key, value) in &self.extra {
            let Some(raw) = key.strip_prefix(VALUEMAP_PREFIX) else {
                warn!("Unknown config key '{}' ignored", key);
                continue;
            };
            let mapped = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    warn!("Value map '{}' is not a scalar ({:?}), ignored", key, other);
                    continue;
                }
            };
            map.insert(raw.to_string(), mapped);
        }
        map
    }
}
