use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier of a [`Pipeline`].
pub type PipelineId = Uuid;

/// Opaque adapter configuration blob.
///
/// A key/value map whose meaning is known only to the adapter kind it is paired
/// with; the engine validates it exclusively through the adapter registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterConfig(pub serde_json::Map<String, Value>);

impl AdapterConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    /// Returns `true` when the configuration carries no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the string value stored under `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the unsigned integer value stored under `key`, if present and numeric.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns the boolean value stored under `key`, if present.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Inserts a value, replacing any previous entry for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }
}

impl FromIterator<(String, Value)> for AdapterConfig {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Activation state of a pipeline.
///
/// Only active pipelines may be scheduled or manually executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Active,
    Inactive,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Active => "active",
            PipelineStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pipeline policy governing how per-record load failures affect job outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Re-attempt the failing record with backoff before counting it as an error.
    #[default]
    Retry,
    /// Count the failure and continue with the next record.
    Skip,
    /// Abort the job on the first per-record failure.
    Fail,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Retry => "retry",
            ErrorPolicy::Skip => "skip",
            ErrorPolicy::Fail => "fail",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target type for a field conversion in a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeConversion {
    String,
    Integer,
    Float,
    Boolean,
}

/// Optional record transformation applied between extract and load.
///
/// Renames run first, then type conversions (keyed by post-rename field name),
/// then field projection when `include_fields` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationConfig {
    /// Source field name to destination field name.
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Field name to target type.
    #[serde(default)]
    pub conversions: BTreeMap<String, TypeConversion>,
    /// When set, only the listed fields survive the transformation.
    #[serde(default)]
    pub include_fields: Option<Vec<String>>,
}

impl TransformationConfig {
    /// Returns `true` when the transformation is a no-op.
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.conversions.is_empty() && self.include_fields.is_none()
    }
}

/// A named, versioned configuration binding a source adapter, a destination
/// adapter, an optional transformation, and an optional cron schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_type: String,
    pub source_config: AdapterConfig,
    pub destination_type: String,
    pub destination_config: AdapterConfig,
    #[serde(default)]
    pub transformation: Option<TransformationConfig>,
    /// Cron expression; absent means the pipeline runs only on manual execute.
    #[serde(default)]
    pub schedule: Option<String>,
    pub status: PipelineStatus,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Denormalized display counters, maintained by the store.
    #[serde(default)]
    pub job_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Returns `true` when the scheduler should consider this pipeline on a tick.
    pub fn is_schedulable(&self) -> bool {
        self.status == PipelineStatus::Active
            && self
                .schedule
                .as_deref()
                .is_some_and(|schedule| !schedule.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_policy_defaults_to_retry() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            policy: ErrorPolicy,
        }

        let holder: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(holder.policy, ErrorPolicy::Retry);
    }

    #[test]
    fn adapter_config_typed_getters() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"base_url": "https://example.com", "page_size": 10}"#).unwrap();

        assert_eq!(config.get_str("base_url"), Some("https://example.com"));
        assert_eq!(config.get_u64("page_size"), Some(10));
        assert_eq!(config.get_str("missing"), None);
    }
}
