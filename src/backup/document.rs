//! JSON backup document: top-level dimension tags plus a `Metrics` array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::BackupError;
use crate::dimensions::{Dimensions, ReplayContext};
use crate::metric::{Metric, MetricName, MetricUnit, TransferType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupDocument {
    pub transfer_type: String,
    pub platform_name: String,
    pub tool_name: String,
    pub instance_type: String,
    #[serde(deserialize_with = "bool_or_int")]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_id: Option<u64>,
    pub metrics: Vec<BackupEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupEntry {
    pub name: String,
    #[serde(
        serialize_with = "timestamp_as_string",
        deserialize_with = "timestamp_from_string_or_int"
    )]
    pub timestamp: u64,
    pub value: f64,
    pub unit: String,
}

impl BackupDocument {
    pub fn new<'a>(dimensions: &Dimensions, metrics: impl IntoIterator<Item = &'a Metric>) -> Self {
        Self {
            transfer_type: dimensions.transfer_type.as_str().to_string(),
            platform_name: dimensions.platform_name.clone(),
            tool_name: dimensions.tool_name.clone(),
            instance_type: dimensions.instance_type.clone(),
            encrypted: dimensions.encrypted,
            replay_id: dimensions.replay_id,
            metrics: metrics
                .into_iter()
                .map(|m| BackupEntry {
                    name: m.name.as_str().to_string(),
                    timestamp: m.timestamp,
                    value: m.value,
                    unit: m.unit.as_str().to_string(),
                })
                .collect(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, BackupError> {
        serde_json::from_slice(bytes).map_err(|e| BackupError::Parse(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        serde_json::to_string_pretty(self).map_err(|e| BackupError::Serialize(e.to_string()))
    }

    /// Convert entries back to metrics. Fails on the first unknown name.
    pub fn to_metrics(&self) -> Result<Vec<Metric>, BackupError> {
        self.metrics
            .iter()
            .map(|entry| {
                let name: MetricName = entry
                    .name
                    .parse()
                    .map_err(|e: crate::metric::UnknownMetricName| {
                        BackupError::Parse(e.to_string())
                    })?;
                Ok(Metric::with_timestamp(
                    name,
                    MetricUnit::parse_lossy(&entry.unit),
                    entry.timestamp,
                    entry.value,
                ))
            })
            .collect()
    }

    /// Overlay carrying this document's tags under a fresh replay id.
    pub fn replay_context(&self, replay_id: u64) -> ReplayContext {
        ReplayContext {
            transfer_type: TransferType::parse_lossy(&self.transfer_type),
            platform_name: self.platform_name.clone(),
            tool_name: self.tool_name.clone(),
            instance_type: self.instance_type.clone(),
            encrypted: self.encrypted,
            replay_id,
        }
    }
}

/// `{tool}/{platform}/{instance}/{ISO-8601 with ':' replaced by '-'}-{ticks}.json`
pub fn backup_path(dimensions: &Dimensions, now: DateTime<Utc>, ticks: u64) -> String {
    let stamp = now.format("%Y-%m-%dT%H:%M:%SZ").to_string().replace(':', "-");
    format!(
        "{}/{}/{}/{}-{}.json",
        dimensions.tool_name, dimensions.platform_name, dimensions.instance_type, stamp, ticks
    )
}

fn timestamp_as_string<S: Serializer>(ts: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_string())
}

fn timestamp_from_string_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(ts) => Ok(ts),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
    })
}
