/*!
# Symbion DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test des plugins de télémétrie Symbion avec:
- Stub MQTT pour tests sans broker (sert aussi d'event sink)
- Client HTTP scripté pour simuler cartes DL2 et serveur Emoncms
- Fixtures de documents DL2 et de commandes
- Attentes asynchrones sur le trafic des mocks
*/

pub mod fixtures;
pub mod http_stub;
pub mod mqtt_stub;
pub mod test_utils;

pub use fixtures::{dl2_document, dl2_positional_document, save_data_command, DeviceFixture};
pub use http_stub::{MockHttpClient, Scripted};
pub use mqtt_stub::MockMqttClient;
pub use test_utils::{wait_for_readings, wait_for_requests};
