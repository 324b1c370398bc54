/*!
Bus MQTT simulé pour tester les plugins sans broker

- côté sortie : `EventSink` enregistre chaque lecture publiée sur
  `symbion/resol/reading@v1`, relisible via `readings()`
- côté entrée : `deliver()` pousse un message dans la boîte de réception
  ouverte par `inbox()`, comme le ferait la boucle d'événements rumqttc
*/

use anyhow::Result;
use symbion_plugin_common::reading::{Reading, ReadingEvent};
use symbion_plugin_common::sink::{EventSink, SinkError, READINGS_TOPIC};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Protocol tag stamped on readings emitted through the mock.
pub const MOCK_PROTOCOL: &str = "mock";

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct MockMqttClient {
    published: Arc<Mutex<Vec<MockMessage>>>,
    inbox: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ouvre la boîte de réception des messages livrés par `deliver`
    pub fn inbox(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock().unwrap() = Some(tx);
        rx
    }

    /// Livre un message entrant, comme reçu du broker
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        let message = MockMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        let inbox = self.inbox.lock().unwrap();
        let Some(tx) = inbox.as_ref() else {
            anyhow::bail!("no inbox open for {}", topic);
        };
        tx.send(message).map_err(|e| anyhow::anyhow!("inbox closed: {}", e))?;
        log::info!("[MOCK] delivered on {}", topic);
        Ok(())
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Lectures publiées via `EventSink`, dans l'ordre d'émission
    pub fn readings(&self) -> Vec<ReadingEvent> {
        self.find_messages_by_topic(READINGS_TOPIC)
            .iter()
            .filter_map(|msg| serde_json::from_slice(&msg.payload).ok())
            .collect()
    }
}

impl EventSink for MockMqttClient {
    async fn emit(&self, reading: &Reading) -> Result<(), SinkError> {
        let event = ReadingEvent::from_reading(MOCK_PROTOCOL, reading);
        let payload = serde_json::to_vec(&event)?;
        log::info!("[MOCK] reading {} = {}", event.object, event.value);
        self.published.lock().unwrap().push(MockMessage {
            topic: READINGS_TOPIC.to_string(),
            payload,
        });
        Ok(())
    }
}
