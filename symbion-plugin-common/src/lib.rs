//! Shared building blocks for Symbion telemetry plugins
//!
//! Every plugin in this workspace needs the same plumbing:
//! - YAML configuration with per-board key/value tuples
//! - An HTTP client capability (real one backed by reqwest, mocks in the devkit)
//! - An event sink publishing readings on the Symbion MQTT bus
//! - Tracing setup and a Ctrl-C driven shutdown signal

pub mod config;
pub mod http;
pub mod logging;
pub mod reading;
pub mod shutdown;
pub mod sink;

use parking_lot::Mutex;
use std::sync::Arc;

/// State shared between a plugin's tasks (command handler, scheduler...).
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
