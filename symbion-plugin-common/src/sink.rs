//! Event sink: where readings leave the plugin
//!
//! The production sink publishes each reading as JSON on the Symbion MQTT
//! bus. The rumqttc event loop must be polled continuously for publications
//! to go out, hence `spawn_event_loop`.

use crate::config::MqttConf;
use crate::reading::{Reading, ReadingEvent};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Publish, QoS};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const READINGS_TOPIC: &str = "symbion/resol/reading@v1";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("cannot encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, reading: &Reading) -> impl Future<Output = Result<(), SinkError>> + Send;
}

#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    protocol: String,
}

impl MqttSink {
    pub fn new(client: AsyncClient, topic: &str, protocol: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
            protocol: protocol.to_string(),
        }
    }
}

impl EventSink for MqttSink {
    async fn emit(&self, reading: &Reading) -> Result<(), SinkError> {
        let event = ReadingEvent::from_reading(&self.protocol, reading);
        let payload = serde_json::to_vec(&event)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Publish {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })
    }
}

pub fn connect(conf: &MqttConf, default_client_id: &str) -> (AsyncClient, EventLoop) {
    let client_id = conf.client_id.as_deref().unwrap_or(default_client_id);
    let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(30));
    AsyncClient::new(opts, 10)
}

/// Drives the MQTT event loop on its own task, handing every incoming
/// publication to `on_publish`.
pub fn spawn_event_loop<F>(mut eventloop: EventLoop, label: &'static str, mut on_publish: F) -> JoinHandle<()>
where
    F: FnMut(Publish) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    debug!("[{}] message on {}", label, publish.topic);
                    on_publish(publish);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[{}] MQTT error: {:?}", label, e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
