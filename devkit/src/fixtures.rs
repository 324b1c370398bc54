/*!
Fixtures : documents DL2 et commandes Emoncms prêts à l'emploi

Les documents suivent le format renvoyé par
`/dl2/download/download?source=current&output_type=json` : une liste de
`headers` (un par appareil du bus VBus) et des `headersets` contenant les
paquets de valeurs brutes.
*/

use serde_json::{json, Value};

/// Un appareil VBus : nom de source + champs (nom, valeur brute)
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub source_name: String,
    pub fields: Vec<(String, f64)>,
}

impl DeviceFixture {
    pub fn new(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, raw_value: f64) -> Self {
        self.fields.push((name.to_string(), raw_value));
        self
    }

    fn header(&self, index: usize) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| json!({ "id": format!("{:03}_2_0", i), "name": name, "unit": "" }))
            .collect();
        json!({
            "id": format!("01_0010_{:04X}_10_0100", 0x7E11 + index),
            "channel": 1,
            "destination_address": 16,
            "source_address": 0x7E11 + index,
            "protocol_version": 16,
            "command": 256,
            "info": 0,
            "destination_name": "DFA",
            "source_name": self.source_name,
            "fields": fields
        })
    }

    fn field_values(&self) -> Vec<Value> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, (_, raw))| json!({ "field_index": i, "raw_value": raw, "value": raw.to_string() }))
            .collect()
    }
}

/// Document "current" : un seul headerset, un paquet par appareil,
/// chacun portant son `header_index`
pub fn dl2_document(devices: &[DeviceFixture]) -> Value {
    let headers: Vec<Value> = devices.iter().enumerate().map(|(i, d)| d.header(i)).collect();
    let packets: Vec<Value> = devices
        .iter()
        .enumerate()
        .map(|(i, d)| json!({ "header_index": i, "field_values": d.field_values() }))
        .collect();

    json!({
        "min_time": "2024-03-01T10:00:00Z",
        "max_time": "2024-03-01T10:00:00Z",
        "sieve_interval": 0,
        "headerset_count": 1,
        "unique_header_count": devices.len(),
        "headers": headers,
        "headersets": [ { "timestamp": 1709287200, "packets": packets } ]
    })
}

/// Disposition positionnelle : `headersets[i].packets[0]` pour l'appareil i,
/// sans `header_index`
pub fn dl2_positional_document(devices: &[DeviceFixture]) -> Value {
    let headers: Vec<Value> = devices.iter().enumerate().map(|(i, d)| d.header(i)).collect();
    let headersets: Vec<Value> = devices
        .iter()
        .map(|d| json!({ "timestamp": 1709287200, "packets": [ { "field_values": d.field_values() } ] }))
        .collect();

    json!({ "headers": headers, "headersets": headersets })
}

/// Commande SAVE-DATA pour un objet et ses comportements courants
pub fn save_data_command(object: &str, behaviors: &[(&str, Value)]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("command".into(), json!("SAVE-DATA"));
    properties.insert("event.object.name".into(), json!(object));
    for (behavior, value) in behaviors {
        properties.insert(format!("current.object.behavior.{behavior}"), value.clone());
    }
    json!({ "properties": properties })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let doc = dl2_document(&[
            DeviceFixture::new("DeltaSol BX").field("Temperature sensor 1", 54.2),
            DeviceFixture::new("Heat meter").field("Heat quantity", 1200.0),
        ]);

        assert_eq!(doc["headers"].as_array().unwrap().len(), 2);
        assert_eq!(doc["headers"][0]["source_name"], "DeltaSol BX");
        assert_eq!(doc["headersets"][0]["packets"][1]["header_index"], 1);
        assert_eq!(doc["headersets"][0]["packets"][0]["field_values"][0]["raw_value"], 54.2);
    }

    #[test]
    fn test_save_data_command_properties() {
        let cmd = save_data_command("Boiler", &[("temperature", json!("54"))]);
        assert_eq!(cmd["properties"]["command"], "SAVE-DATA");
        assert_eq!(cmd["properties"]["current.object.behavior.temperature"], "54");
    }
}
