/**
 * SYMBION PLUGIN RESOL - Relevé des enregistreurs Resol DL2
 *
 * RÔLE :
 * Interroge périodiquement une ou plusieurs cartes DL2 (régulateurs solaires
 * VBus) et publie chaque mesure sur le bus MQTT Symbion.
 *
 * FONCTIONNEMENT :
 * - Configuration YAML (SYMBION_RESOL_CONFIG, défaut ./resol.yaml)
 * - GET http://<ip>:<port>/dl2/download/download?source=current&output_type=json
 * - Capteurs explicites (deviceN.sensorM.*) ou découverte par préfixe de champ
 * - Une carte en panne n'empêche jamais le relevé des autres
 *
 * COMMUNICATION MQTT :
 * Publie: symbion/resol/reading@v1
 */

mod board;
mod catalog;
mod config;
mod poll;
mod resolver;

use anyhow::{Context, Result};
use board::BoardRegistry;
use config::{ResolConfig, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use poll::Poller;
use resolver::SensorResolver;
use symbion_plugin_common::config::{config_path, load_yaml};
use symbion_plugin_common::http::ReqwestClient;
use symbion_plugin_common::shutdown::Shutdown;
use symbion_plugin_common::sink::{self, MqttSink, READINGS_TOPIC};
use tracing::{info, warn};

const PROTOCOL: &str = "ResolDL2";

#[tokio::main]
async fn main() -> Result<()> {
    symbion_plugin_common::logging::init("symbion_plugin_resol=info");
    info!("[resol] starting Resol DL2 plugin");

    let path = config_path(CONFIG_ENV, DEFAULT_CONFIG_PATH);
    let conf: ResolConfig = load_yaml(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let registry = BoardRegistry::from_tuples(&conf.boards).context("building board registry")?;
    let resolver = SensorResolver::new(conf.discovery.clone());

    let (client, eventloop) = sink::connect(&conf.mqtt, "symbion-plugin-resol");
    let events = sink::spawn_event_loop(eventloop, "resol", |_| {});
    info!("[resol] MQTT connected to {}:{}", conf.mqtt.host, conf.mqtt.port);

    let http = ReqwestClient::new(conf.request_timeout(), None).context("building HTTP client")?;
    let mut poller = Poller::new(registry, resolver, MqttSink::new(client.clone(), READINGS_TOPIC, PROTOCOL));
    poller
        .run(http, conf.polling_interval(), Shutdown::on_ctrl_c())
        .await;

    if let Err(e) = client.disconnect().await {
        warn!("[resol] MQTT disconnect failed: {}", e);
    }
    events.abort();
    info!("[resol] stopped, poller {:?}", poller.state());
    Ok(())
}
