/**
 * SYMBION PLUGIN EMONCMS - Envoi des états d'objets vers Emoncms
 *
 * RÔLE :
 * Accumule les changements de comportement des objets reçus sur le bus et
 * les pousse périodiquement vers une instance Emoncms (input/post).
 *
 * FONCTIONNEMENT :
 * - Configuration YAML (SYMBION_EMONCMS_CONFIG, défaut ./emoncms.yaml)
 * - Commande SAVE-DATA : fusion dans le lot courant (dernière valeur gagnante)
 * - GET <target>?apikey=..&node=..&json={..} toutes les post-interval ms
 * - Échec réseau : lot conservé, intervalle doublé jusqu'à max-post-interval
 * - Au-delà de giveup-time d'échecs cumulés : arrêt, code de sortie non nul
 *
 * COMMUNICATION MQTT :
 * Écoute: symbion/emoncms/command@v1
 */

mod backoff;
mod batch;
mod command;
mod config;
mod push;

use anyhow::{Context, Result};
use backoff::BackoffController;
use batch::{TelemetryBatch, TelemetryBatcher};
use command::COMMAND_TOPIC;
use config::{EmoncmsConfig, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use push::Pusher;
use rumqttc::QoS;
use symbion_plugin_common::config::{config_path, load_yaml};
use symbion_plugin_common::http::ReqwestClient;
use symbion_plugin_common::new_state;
use symbion_plugin_common::shutdown::Shutdown;
use symbion_plugin_common::sink;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    symbion_plugin_common::logging::init("symbion_plugin_emoncms=info");
    info!("[emoncms] starting Emoncms plugin");

    let path = config_path(CONFIG_ENV, DEFAULT_CONFIG_PATH);
    let conf: EmoncmsConfig = load_yaml(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let batch = new_state(TelemetryBatch::default());
    let batcher = TelemetryBatcher::new(batch.clone(), conf.valuemap());

    let (client, eventloop) = sink::connect(&conf.mqtt, "symbion-plugin-emoncms");
    client
        .subscribe(COMMAND_TOPIC, QoS::AtLeastOnce)
        .await
        .context("subscribing to commands")?;
    let events = sink::spawn_event_loop(eventloop, "emoncms", move |publish| {
        batcher.on_publish(&publish.topic, &publish.payload);
    });
    info!("[emoncms] MQTT connected, listening on {}", COMMAND_TOPIC);

    let http = ReqwestClient::new(conf.request_timeout(), Some(&conf.charset)).context("building HTTP client")?;
    let mut pusher = Pusher::new(conf.push_settings(), batch, BackoffController::new(conf.backoff_policy()));
    let outcome = pusher.run(http, Shutdown::on_ctrl_c()).await;

    if let Err(e) = client.disconnect().await {
        warn!("[emoncms] MQTT disconnect failed: {}", e);
    }
    events.abort();

    outcome.context("Emoncms push gave up")?;
    info!("[emoncms] stopped");
    Ok(())
}
