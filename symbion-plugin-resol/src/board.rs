//! Boards and their explicit device/sensor tables
//!
//! A board is one DL2 logger reachable over HTTP. Operators may describe the
//! devices behind it with tuple keys:
//!
//! ```yaml
//! boards:
//!   - ip-to-query: 192.168.1.201
//!     port-to-query: 80
//!     device0.name: Solar
//!     device0.id: 32529
//!     device0.sensor1.name: collector
//!     device0.sensor1.index: 3
//! ```

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use symbion_plugin_common::config::{ConfigError, ConfigTuple, TupleValue};
use tracing::{info, warn};
use url::Url;

pub const STATUS_PATH: &str = "/dl2/download/download";
const DEFAULT_IP: &str = "192.168.1.201";
const DEFAULT_PORT: i64 = 80;

static DESCRIPTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^device(\d+)\.([^\d.]+)(?:(\d+)\.(.+))?$").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("sensor {0} read before it was configured")]
pub struct UnsetAttribute(pub &'static str);

/// One explicitly configured sensor: a name and a raw-value index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSpec {
    name: Option<String>,
    index: Option<usize>,
}

impl SensorSpec {
    pub fn name(&self) -> Result<&str, UnsetAttribute> {
        self.name.as_deref().ok_or(UnsetAttribute("name"))
    }

    pub fn index(&self) -> Result<usize, UnsetAttribute> {
        self.index.ok_or(UnsetAttribute("index"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// Keyed by operator-chosen sensor number, iterated in ascending order
    pub sensors: BTreeMap<u32, SensorSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    host: String,
    port: u16,
    log_source_data: bool,
    devices: BTreeMap<u32, DeviceConfig>,
}

impl Board {
    pub fn new(host: &str, port: u16, log_source_data: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            log_source_data,
            devices: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_source_data(&self) -> bool {
        self.log_source_data
    }

    pub fn status_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("http://{}:{}{}", self.host, self.port, STATUS_PATH))?;
        url.query_pairs_mut()
            .append_pair("source", "current")
            .append_pair("output_type", "json");
        Ok(url)
    }

    pub fn device(&self, device: u32) -> Option<&DeviceConfig> {
        self.devices.get(&device)
    }

    /// Number of explicit sensors for `device`, 0 when it is not configured.
    pub fn configured_sensors(&self, device: u32) -> usize {
        self.device(device).map_or(0, |d| d.sensors.len())
    }

    fn device_mut(&mut self, device: u32) -> &mut DeviceConfig {
        self.devices.entry(device).or_default()
    }

    pub fn set_device_name(&mut self, device: u32, name: &str) {
        self.device_mut(device).name = Some(name.to_string());
    }

    pub fn set_device_id(&mut self, device: u32, id: i64) {
        self.device_mut(device).id = Some(id);
    }

    pub fn set_sensor_name(&mut self, device: u32, sensor: u32, name: &str) {
        self.device_mut(device).sensors.entry(sensor).or_default().name = Some(name.to_string());
    }

    pub fn set_sensor_index(&mut self, device: u32, sensor: u32, index: usize) {
        self.device_mut(device).sensors.entry(sensor).or_default().index = Some(index);
    }

    /// Builds a board from its tuple. Bad `device*` descriptors are logged
    /// and skipped.
    pub fn from_tuple(tuple: &ConfigTuple) -> Result<Self, ConfigError> {
        let host = tuple.string_or("ip-to-query", DEFAULT_IP);
        let port = tuple.int_or("port-to-query", DEFAULT_PORT)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::BadValue {
            key: "port-to-query".to_string(),
            value: port.to_string(),
        })?;
        let log_source_data = tuple.bool_or("log_source_data", false)?;

        let mut board = Board::new(&host, port, log_source_data);
        for (key, value) in tuple.entries().filter(|(k, _)| k.starts_with("device")) {
            if let Err(reason) = board.apply_descriptor(key, value) {
                warn!("Bad config descriptor: {} ({})", key, reason);
            }
        }
        Ok(board)
    }

    fn apply_descriptor(&mut self, key: &str, value: &TupleValue) -> Result<(), String> {
        let caps = DESCRIPTOR_RE.captures(key).ok_or("unrecognised key")?;
        let device: u32 = caps[1].parse().map_err(|_| "device number out of range")?;
        let attr = &caps[2];

        match (attr, caps.get(3), caps.get(4)) {
            ("name", None, None) => self.set_device_name(device, &value.to_string()),
            ("id", None, None) => {
                let id = value.as_int().ok_or_else(|| format!("'{value}' is not an integer"))?;
                self.set_device_id(device, id);
            }
            ("sensor", Some(sensor), Some(sensor_attr)) => {
                let sensor: u32 = sensor.as_str().parse().map_err(|_| "sensor number out of range")?;
                match sensor_attr.as_str() {
                    "name" => self.set_sensor_name(device, sensor, &value.to_string()),
                    "index" => {
                        let index = value
                            .as_int()
                            .and_then(|i| usize::try_from(i).ok())
                            .ok_or_else(|| format!("'{value}' is not a valid index"))?;
                        self.set_sensor_index(device, sensor, index);
                    }
                    other => return Err(format!("unknown sensor attribute '{other}'")),
                }
            }
            (other, _, _) => return Err(format!("unknown device attribute '{other}'")),
        }
        Ok(())
    }
}

/// All boards polled by this plugin, built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct BoardRegistry {
    boards: Vec<Board>,
}

impl BoardRegistry {
    pub fn from_tuples(tuples: &[ConfigTuple]) -> Result<Self, ConfigError> {
        if tuples.is_empty() {
            return Err(ConfigError::NoBoards);
        }

        let mut boards = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let board = Board::from_tuple(tuple)?;
            info!("Loading Resol DL2 device: {}", board.address());
            boards.push(board);
        }
        info!("Loaded {} Resol DL2 board(s)", boards.len());
        Ok(Self { boards })
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }
}
