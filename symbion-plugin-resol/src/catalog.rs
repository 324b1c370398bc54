//! DL2 telemetry documents
//!
//! The logger answers with a document meant for long time ranges: `headers`
//! describe each VBus device (identity plus an ordered field catalog) and
//! `headersets` carry packets of raw values. For the "current" source there
//! is normally a single headerset with one packet per header.
//!
//! Value sets are aligned to headers at decode time. A packet naming its
//! `header_index` is attached to that header (the latest headerset wins);
//! otherwise the positional layout `headersets[i].packets[0]` is used. A
//! header left without a value set is reported as misaligned on lookup.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("malformed DL2 document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("device {device} out of range ({count} devices)")]
    DeviceOutOfRange { device: usize, count: usize },
    #[error("device {device} has no field '{prefix}' ending in {ordinal}")]
    FieldNotFound {
        device: usize,
        prefix: String,
        ordinal: usize,
    },
    #[error("no value set aligned with header {device}")]
    Misaligned { device: usize },
    #[error("device {device} has no raw value at index {index}")]
    MissingValue { device: usize, index: usize },
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    headers: Vec<RawHeader>,
    #[serde(default)]
    headersets: Vec<RawHeaderSet>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    channel: Option<i64>,
    #[serde(default)]
    source_address: Option<i64>,
    #[serde(default)]
    destination_address: Option<i64>,
    #[serde(default)]
    source_name: Option<String>,
    #[serde(default)]
    destination_name: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawHeaderSet {
    #[serde(default)]
    packets: Vec<RawPacket>,
}

#[derive(Debug, Deserialize)]
struct RawPacket {
    #[serde(default, alias = "headerindex")]
    header_index: Option<usize>,
    #[serde(default)]
    field_values: Vec<RawFieldValue>,
}

#[derive(Debug, Deserialize)]
struct RawFieldValue {
    #[serde(default)]
    field_index: Option<usize>,
    #[serde(default)]
    raw_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
}

/// Identity and field catalog of one device on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub id: Option<String>,
    pub channel: Option<i64>,
    pub source_address: Option<i64>,
    pub destination_address: Option<i64>,
    pub source_name: Option<String>,
    pub destination_name: Option<String>,
    pub fields: Vec<Field>,
}

/// Raw values of one device for the current cycle, keyed by field position.
/// Sparse: indices come from the device and are not trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSet {
    values: BTreeMap<usize, f64>,
}

impl ValueSet {
    fn from_packet(packet: &RawPacket) -> Self {
        let mut values = BTreeMap::new();
        for (position, fv) in packet.field_values.iter().enumerate() {
            let slot = fv.field_index.unwrap_or(position);
            match fv.raw_value {
                Some(raw) => values.insert(slot, raw),
                None => values.remove(&slot),
            };
        }
        Self { values }
    }

    pub fn raw_value(&self, index: usize) -> Option<f64> {
        self.values.get(&index).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryDocument {
    headers: Vec<Header>,
    value_sets: Vec<Option<ValueSet>>,
}

impl TelemetryDocument {
    /// Decodes a DL2 JSON body. A document without headers is valid and
    /// describes zero devices.
    pub fn decode(raw: &[u8]) -> Result<Self, CatalogError> {
        let doc: RawDocument = serde_json::from_slice(raw)?;
        let value_sets = align(doc.headers.len(), &doc.headersets);
        let headers = doc.headers.into_iter().map(Header::from).collect();
        Ok(Self { headers, value_sets })
    }

    pub fn device_count(&self) -> usize {
        self.headers.len()
    }

    pub fn header(&self, device: usize) -> Result<&Header, CatalogError> {
        self.headers.get(device).ok_or(CatalogError::DeviceOutOfRange {
            device,
            count: self.headers.len(),
        })
    }

    pub fn device_name(&self, device: usize) -> Result<&str, CatalogError> {
        Ok(self.header(device)?.source_name.as_deref().unwrap_or(""))
    }

    /// Number of fields of `device` whose name starts with `prefix`
    /// (case-sensitive).
    pub fn field_count(&self, device: usize, prefix: &str) -> Result<usize, CatalogError> {
        Ok(self
            .header(device)?
            .fields
            .iter()
            .filter(|f| f.name.starts_with(prefix))
            .count())
    }

    /// Position of the first field, in header order, that starts with
    /// `prefix` and ends with the decimal `ordinal`.
    ///
    /// This is a suffix heuristic: with fields "Temperature sensor 11" and
    /// "Temperature sensor 1", ordinal 1 matches whichever comes first.
    pub fn field_index(&self, device: usize, prefix: &str, ordinal: usize) -> Result<usize, CatalogError> {
        let suffix = ordinal.to_string();
        self.header(device)?
            .fields
            .iter()
            .position(|f| f.name.starts_with(prefix) && f.name.ends_with(&suffix))
            .ok_or_else(|| CatalogError::FieldNotFound {
                device,
                prefix: prefix.to_string(),
                ordinal,
            })
    }

    pub fn value_set(&self, device: usize) -> Result<&ValueSet, CatalogError> {
        self.header(device)?;
        self.value_sets
            .get(device)
            .and_then(Option::as_ref)
            .ok_or(CatalogError::Misaligned { device })
    }

    pub fn raw_value(&self, device: usize, index: usize) -> Result<f64, CatalogError> {
        self.value_set(device)?
            .raw_value(index)
            .ok_or(CatalogError::MissingValue { device, index })
    }
}

impl From<RawHeader> for Header {
    fn from(raw: RawHeader) -> Self {
        Self {
            id: raw.id,
            channel: raw.channel,
            source_address: raw.source_address,
            destination_address: raw.destination_address,
            source_name: raw.source_name,
            destination_name: raw.destination_name,
            fields: raw
                .fields
                .into_iter()
                .map(|f| Field { name: f.name })
                .collect(),
        }
    }
}

fn align(header_count: usize, headersets: &[RawHeaderSet]) -> Vec<Option<ValueSet>> {
    let mut aligned: Vec<Option<ValueSet>> = vec![None; header_count];

    for set in headersets.iter().rev() {
        for packet in &set.packets {
            if let Some(h) = packet.header_index {
                if h < header_count && aligned[h].is_none() {
                    aligned[h] = Some(ValueSet::from_packet(packet));
                }
            }
        }
    }

    for (device, slot) in aligned.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        let positional = headersets.get(device).and_then(|set| set.packets.first());
        if let Some(packet) = positional.filter(|p| p.header_index.is_none()) {
            *slot = Some(ValueSet::from_packet(packet));
        }
    }

    aligned
}
