//! Resol plugin configuration (`resol.yaml`)

use crate::resolver::{default_patterns, FieldPattern};
use serde::Deserialize;
use std::time::Duration;
use symbion_plugin_common::config::{ConfigTuple, MqttConf};

pub const CONFIG_ENV: &str = "SYMBION_RESOL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "resol.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResolConfig {
    pub mqtt: MqttConf,
    /// Poll interval in milliseconds
    pub polling_time: u64,
    /// HTTP request timeout in milliseconds
    pub socket_timeout: u64,
    pub boards: Vec<ConfigTuple>,
    pub discovery: Vec<FieldPattern>,
}

impl Default for ResolConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            polling_time: 1000,
            socket_timeout: 1000,
            boards: Vec::new(),
            discovery: default_patterns(),
        }
    }
}

impl ResolConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_time.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_plugin_common::config::TupleValue;

    #[test]
    fn test_full_document() {
        let yaml = r#"
mqtt:
  host: broker.lan
polling-time: 5000
socket-timeout: 2500
boards:
  - ip-to-query: 192.168.1.40
    port-to-query: "8080"
    log_source_data: true
    device0.sensor1.name: collector
    device0.sensor1.index: 3
discovery:
  - prefix: Temperature
    name: t
"#;
        let conf: ResolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conf.mqtt.host, "broker.lan");
        assert_eq!(conf.mqtt.port, 1883);
        assert_eq!(conf.polling_interval(), Duration::from_secs(5));
        assert_eq!(conf.request_timeout(), Duration::from_millis(2500));
        assert_eq!(conf.boards.len(), 1);
        assert_eq!(conf.boards[0].get("log_source_data"), Some(&TupleValue::Flag(true)));
        assert_eq!(conf.boards[0].int_or("port-to-query", 80).unwrap(), 8080);
        assert_eq!(conf.discovery, vec![FieldPattern::new("Temperature", "t")]);
    }

    #[test]
    fn test_defaults() {
        let conf: ResolConfig = serde_yaml::from_str("boards: []").unwrap();
        assert_eq!(conf.polling_time, 1000);
        assert_eq!(conf.socket_timeout, 1000);
        assert_eq!(conf.discovery, default_patterns());
    }

    #[test]
    fn test_zero_durations_are_clamped() {
        let conf: ResolConfig = serde_yaml::from_str("polling-time: 0\nsocket-timeout: 0").unwrap();
        assert_eq!(conf.polling_interval(), Duration::from_millis(1));
        assert_eq!(conf.request_timeout(), Duration::from_millis(1));
    }
}
