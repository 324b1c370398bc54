/*!
Attentes asynchrones pour les tests de planificateurs

Les boucles `run` tournent dans leur propre tâche : ces helpers attendent que
le mock ait vu assez de trafic avant de déclencher l'arrêt.
*/

use crate::http_stub::MockHttpClient;
use crate::mqtt_stub::MockMqttClient;
use anyhow::Result;
use std::time::Duration;
use symbion_plugin_common::reading::ReadingEvent;

const POLL_STEP: Duration = Duration::from_millis(10);

async fn wait_until<F>(what: &str, timeout_ms: u64, mut done: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if done() {
            return Ok(());
        }
        tokio::time::sleep(POLL_STEP).await;
    }
    log::warn!("⏰ Timeout waiting for {}", what);
    anyhow::bail!("timeout after {}ms waiting for {}", timeout_ms, what)
}

/// Attend qu'au moins `count` lectures aient été publiées
pub async fn wait_for_readings(client: &MockMqttClient, count: usize, timeout_ms: u64) -> Result<Vec<ReadingEvent>> {
    wait_until(&format!("{count} reading(s)"), timeout_ms, || client.readings().len() >= count).await?;
    log::info!("✅ Received {} reading(s)", count);
    Ok(client.readings())
}

/// Attend qu'au moins `count` requêtes HTTP aient été émises
pub async fn wait_for_requests(client: &MockHttpClient, count: usize, timeout_ms: u64) -> Result<()> {
    wait_until(&format!("{count} request(s)"), timeout_ms, || client.requests().len() >= count).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_plugin_common::reading::Reading;
    use symbion_plugin_common::sink::EventSink;

    #[tokio::test]
    async fn test_wait_for_readings() {
        let client = MockMqttClient::new();
        let sink = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let reading = Reading::new("10.0.0.1:80", "temp1", 20.0, time::OffsetDateTime::UNIX_EPOCH);
            sink.emit(&reading).await.unwrap();
        });

        let readings = wait_for_readings(&client, 1, 1000).await.unwrap();
        assert_eq!(readings[0].name, "temp1");
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let client = MockHttpClient::new();
        assert!(wait_for_requests(&client, 1, 50).await.is_err());
    }
}
