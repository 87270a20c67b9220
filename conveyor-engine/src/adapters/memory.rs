//! In-memory adapters for development and tests.
//!
//! The memory source synthesizes a configurable number of records; the memory
//! destination accepts them and can inject per-record failures. Together they
//! exercise every executor path (connection failure, per-record failure, slow
//! streams for cancellation and timeout) without external systems.
//!
//! Recognized source configuration keys: `record_count`, `fail_connection`,
//! `delay_ms` (per record). Destination keys: `fail_connection`, `fail_ids`,
//! `flaky_ids` (fail the first attempt only), `delay_ms`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::adapters::base::{DestinationAdapter, RecordLoadError, RecordStream, SourceAdapter};
use crate::adapters::registry::{AdapterKindInfo, AdapterRegistry};
use crate::engine_error;
use crate::error::{EngineResult, ErrorKind};
use crate::types::{AdapterConfig, Record};

/// Registers the `memory` source and destination kinds.
pub fn register(registry: &mut AdapterRegistry) {
    registry.register_source(
        AdapterKindInfo::new("memory", "Memory", "In-memory synthetic record source"),
        Box::new(|config| Ok(Box::new(MemorySource::from_config(config)))),
    );
    registry.register_destination(
        AdapterKindInfo::new("memory", "Memory", "In-memory record sink"),
        Box::new(|config| Ok(Box::new(MemoryDestination::from_config(config)))),
    );
}

const DEFAULT_RECORD_COUNT: u64 = 10;

/// Source adapter yielding synthetic records.
pub struct MemorySource {
    record_count: u64,
    fail_connection: bool,
    delay: Option<Duration>,
}

impl MemorySource {
    fn from_config(config: &AdapterConfig) -> Self {
        Self {
            record_count: config.get_u64("record_count").unwrap_or(DEFAULT_RECORD_COUNT),
            fail_connection: config.get_bool("fail_connection").unwrap_or(false),
            delay: config
                .get_u64("delay_ms")
                .map(Duration::from_millis),
        }
    }
}

fn synthetic_record(index: u64) -> Record {
    let fields = match json!({
        "index": index,
        "name": format!("record {index}"),
    }) {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    Record::new(format!("record-{index}"), fields)
}

#[async_trait]
impl SourceAdapter for MemorySource {
    async fn test_connection(&mut self) -> EngineResult<()> {
        if self.fail_connection {
            return Err(engine_error!(
                ErrorKind::SourceConnectionFailed,
                "memory source connection refused",
                "`fail_connection` is set for this source"
            ));
        }
        Ok(())
    }

    async fn extract(&mut self) -> EngineResult<RecordStream> {
        let delay = self.delay;
        let stream = futures::stream::iter(0..self.record_count).then(move |index| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(synthetic_record(index))
        });

        Ok(stream.boxed())
    }

    async fn close(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// Destination adapter that accepts records and injects configured failures.
pub struct MemoryDestination {
    fail_connection: bool,
    fail_ids: BTreeSet<String>,
    flaky_ids: BTreeSet<String>,
    delay: Option<Duration>,
    attempts: BTreeMap<String, u32>,
    loaded: Vec<Record>,
}

impl MemoryDestination {
    fn from_config(config: &AdapterConfig) -> Self {
        Self {
            fail_connection: config.get_bool("fail_connection").unwrap_or(false),
            fail_ids: string_set(config.get("fail_ids")),
            flaky_ids: string_set(config.get("flaky_ids")),
            delay: config.get_u64("delay_ms").map(Duration::from_millis),
            attempts: BTreeMap::new(),
            loaded: Vec::new(),
        }
    }

    /// Records loaded so far, in arrival order.
    pub fn loaded(&self) -> &[Record] {
        &self.loaded
    }
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DestinationAdapter for MemoryDestination {
    async fn test_connection(&mut self) -> EngineResult<()> {
        if self.fail_connection {
            return Err(engine_error!(
                ErrorKind::DestinationConnectionFailed,
                "memory destination connection refused",
                "`fail_connection` is set for this destination"
            ));
        }
        Ok(())
    }

    async fn load(&mut self, record: &Record) -> Result<(), RecordLoadError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = self.attempts.entry(record.id.clone()).or_insert(0);
        *attempt += 1;

        if self.fail_ids.contains(&record.id) {
            return Err(RecordLoadError::new(
                record.id.clone(),
                "destination rejected record",
            ));
        }

        if self.flaky_ids.contains(&record.id) && *attempt == 1 {
            return Err(RecordLoadError::new(
                record.id.clone(),
                "transient destination failure",
            ));
        }

        self.loaded.push(record.clone());
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(value: Value) -> AdapterConfig {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn source_yields_configured_count() {
        let mut source = MemorySource::from_config(&config(json!({"record_count": 3})));
        source.test_connection().await.unwrap();

        let stream = source.extract().await.unwrap();
        let records: Vec<_> = stream.collect().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().id, "record-0");
    }

    #[tokio::test]
    async fn source_connection_failure_is_injectable() {
        let mut source = MemorySource::from_config(&config(json!({"fail_connection": true})));
        let err = source.test_connection().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    }

    #[tokio::test]
    async fn destination_fails_listed_ids_every_time() {
        let mut destination =
            MemoryDestination::from_config(&config(json!({"fail_ids": ["record-1"]})));

        let good = synthetic_record(0);
        let bad = synthetic_record(1);

        destination.load(&good).await.unwrap();
        destination.load(&bad).await.unwrap_err();
        destination.load(&bad).await.unwrap_err();
        assert_eq!(destination.loaded().len(), 1);
    }

    #[tokio::test]
    async fn flaky_ids_succeed_on_second_attempt() {
        let mut destination =
            MemoryDestination::from_config(&config(json!({"flaky_ids": ["record-2"]})));

        let record = synthetic_record(2);
        destination.load(&record).await.unwrap_err();
        destination.load(&record).await.unwrap();
        assert_eq!(destination.loaded().len(), 1);
    }
}
