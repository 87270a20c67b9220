use std::collections::BTreeMap;

use serde::Serialize;

use crate::adapters::base::{DestinationAdapter, SourceAdapter};
use crate::adapters::{http, memory};
use crate::engine_error;
use crate::error::{EngineResult, ErrorKind};
use crate::types::AdapterConfig;

/// Metadata describing a registered adapter kind.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterKindInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl AdapterKindInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Factory producing a source adapter instance from a configuration blob.
pub type SourceFactory =
    Box<dyn Fn(&AdapterConfig) -> EngineResult<Box<dyn SourceAdapter>> + Send + Sync>;

/// Factory producing a destination adapter instance from a configuration blob.
pub type DestinationFactory =
    Box<dyn Fn(&AdapterConfig) -> EngineResult<Box<dyn DestinationAdapter>> + Send + Sync>;

struct SourceEntry {
    info: AdapterKindInfo,
    factory: SourceFactory,
}

struct DestinationEntry {
    info: AdapterKindInfo,
    factory: DestinationFactory,
}

/// Registry of every supported adapter kind.
///
/// Read-only after startup and safe for concurrent reads; the engine wraps it
/// in an [`std::sync::Arc`] and never mutates it once workers are running.
/// Each kind owns its own config validation, so adding a new external system
/// means registering one entry here rather than touching the executor.
pub struct AdapterRegistry {
    sources: BTreeMap<String, SourceEntry>,
    destinations: BTreeMap<String, DestinationEntry>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            destinations: BTreeMap::new(),
        }
    }

    /// Creates a registry with all built-in adapter kinds registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        memory::register(&mut registry);
        http::register(&mut registry);
        register_database_kinds(&mut registry);
        registry
    }

    /// Registers a source adapter kind, replacing any previous entry with the same id.
    pub fn register_source(&mut self, info: AdapterKindInfo, factory: SourceFactory) {
        self.sources
            .insert(info.id.clone(), SourceEntry { info, factory });
    }

    /// Registers a destination adapter kind, replacing any previous entry with the same id.
    pub fn register_destination(&mut self, info: AdapterKindInfo, factory: DestinationFactory) {
        self.destinations
            .insert(info.id.clone(), DestinationEntry { info, factory });
    }

    /// Creates a source adapter instance for `kind` from `config`.
    pub fn create_source(
        &self,
        kind: &str,
        config: &AdapterConfig,
    ) -> EngineResult<Box<dyn SourceAdapter>> {
        let entry = self.sources.get(kind).ok_or_else(|| {
            engine_error!(
                ErrorKind::ConfigError,
                "unknown source adapter kind",
                format!("`{kind}` is not a registered source adapter kind")
            )
        })?;

        (entry.factory)(config)
    }

    /// Creates a destination adapter instance for `kind` from `config`.
    pub fn create_destination(
        &self,
        kind: &str,
        config: &AdapterConfig,
    ) -> EngineResult<Box<dyn DestinationAdapter>> {
        let entry = self.destinations.get(kind).ok_or_else(|| {
            engine_error!(
                ErrorKind::ConfigError,
                "unknown destination adapter kind",
                format!("`{kind}` is not a registered destination adapter kind")
            )
        })?;

        (entry.factory)(config)
    }

    /// Returns `true` when `kind` is registered as a source.
    pub fn has_source(&self, kind: &str) -> bool {
        self.sources.contains_key(kind)
    }

    /// Returns `true` when `kind` is registered as a destination.
    pub fn has_destination(&self, kind: &str) -> bool {
        self.destinations.contains_key(kind)
    }

    /// Returns metadata for every registered source kind.
    pub fn source_kinds(&self) -> Vec<AdapterKindInfo> {
        self.sources
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Returns metadata for every registered destination kind.
    pub fn destination_kinds(&self) -> Vec<AdapterKindInfo> {
        self.destinations
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Validates that every field in `required` is present and a non-empty string.
pub(crate) fn require_string_fields(
    kind: &str,
    config: &AdapterConfig,
    required: &[&str],
) -> EngineResult<()> {
    for field in required {
        let present = config
            .get_str(field)
            .is_some_and(|value| !value.trim().is_empty());
        if !present {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "missing required adapter configuration field",
                format!("adapter kind `{kind}` requires a non-empty `{field}` field")
            ));
        }
    }

    Ok(())
}

/// Database adapter kinds.
///
/// These validate their configuration shape so pipelines can be authored and
/// connection forms checked, but no database driver transport ships with the
/// engine yet, so instance creation is rejected after validation.
fn register_database_kinds(registry: &mut AdapterRegistry) {
    const DATABASE_KINDS: &[(&str, &str, &str, &[&str])] = &[
        (
            "postgres",
            "PostgreSQL",
            "PostgreSQL relational database",
            &["host", "port", "database"],
        ),
        (
            "mysql",
            "MySQL",
            "MySQL relational database",
            &["host", "port", "database"],
        ),
        (
            "mongodb",
            "MongoDB",
            "MongoDB document database",
            &["host", "port", "database"],
        ),
    ];

    for &(id, name, description, required) in DATABASE_KINDS {
        let source_factory: SourceFactory = Box::new(move |config| {
            require_string_fields(id, config, required)?;
            Err(database_transport_unavailable(id))
        });
        let destination_factory: DestinationFactory = Box::new(move |config| {
            require_string_fields(id, config, required)?;
            Err(database_transport_unavailable(id))
        });

        registry.register_source(AdapterKindInfo::new(id, name, description), source_factory);
        registry.register_destination(
            AdapterKindInfo::new(id, name, description),
            destination_factory,
        );
    }
}

fn database_transport_unavailable(kind: &str) -> crate::error::EngineError {
    engine_error!(
        ErrorKind::ConfigError,
        "database adapter transport not available",
        format!("adapter kind `{kind}` has no database driver transport in this build")
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtins_cover_all_kinds() {
        let registry = AdapterRegistry::with_builtins();

        for kind in [
            "memory",
            "rest",
            "jira",
            "alm",
            "confluence",
            "sharepoint",
            "postgres",
            "mysql",
            "mongodb",
        ] {
            assert!(registry.has_source(kind), "source kind {kind}");
            assert!(registry.has_destination(kind), "destination kind {kind}");
        }
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let registry = AdapterRegistry::with_builtins();
        let err = registry
            .create_source("telex", &AdapterConfig::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn database_kinds_validate_before_rejecting() {
        let registry = AdapterRegistry::with_builtins();

        // Missing fields surface as the specific missing-field error.
        let err = registry
            .create_source("postgres", &AdapterConfig::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.detail().unwrap().contains("host"));

        // A complete config still cannot produce an instance without a driver.
        let config: AdapterConfig = serde_json::from_value(json!({
            "host": "db.internal",
            "port": "5432",
            "database": "orders"
        }))
        .unwrap();
        let err = registry.create_source("postgres", &config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.detail().unwrap().contains("transport"));
    }

    #[test]
    fn kind_metadata_is_exposed() {
        let registry = AdapterRegistry::with_builtins();
        let kinds = registry.source_kinds();
        assert!(kinds.iter().any(|info| info.id == "jira"));
        assert!(kinds.iter().all(|info| !info.description.is_empty()));
    }
}
