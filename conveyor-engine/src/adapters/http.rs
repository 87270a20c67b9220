//! HTTP-backed adapter family.
//!
//! One generic reqwest-based adapter serves every REST-shaped external system
//! kind (generic REST, Jira, ALM, Confluence, SharePoint). The kinds differ
//! only in their required configuration fields and default endpoint paths;
//! the wire behavior is the same: a ping request for connection tests, a GET
//! returning a JSON array for extraction, and per-record POSTs for loading.
//!
//! Common configuration keys: `base_url` (required everywhere), `api_token`
//! (bearer auth) or `username` + `password` (basic auth), and optional
//! `ping_path` / `records_path` overrides.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use crate::adapters::base::{DestinationAdapter, RecordLoadError, RecordStream, SourceAdapter};
use crate::adapters::registry::{AdapterKindInfo, AdapterRegistry, require_string_fields};
use crate::engine_error;
use crate::error::{EngineResult, ErrorKind};
use crate::types::{AdapterConfig, Record};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Static description of one HTTP adapter kind.
struct HttpKindSpec {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    /// Fields beyond `base_url` that must be present and non-empty.
    required_fields: &'static [&'static str],
    default_ping_path: &'static str,
    default_records_path: &'static str,
}

const HTTP_KINDS: &[HttpKindSpec] = &[
    HttpKindSpec {
        id: "rest",
        name: "REST API",
        description: "Generic JSON-over-HTTP endpoint",
        required_fields: &[],
        default_ping_path: "/",
        default_records_path: "/records",
    },
    HttpKindSpec {
        id: "jira",
        name: "Jira",
        description: "Atlassian Jira issue tracker",
        required_fields: &["project_key"],
        default_ping_path: "/rest/api/2/myself",
        default_records_path: "/rest/api/2/search",
    },
    HttpKindSpec {
        id: "alm",
        name: "Micro Focus ALM",
        description: "ALM quality center requirements and defects",
        required_fields: &["username", "password", "domain", "project"],
        default_ping_path: "/qcbin/rest/is-authenticated",
        default_records_path: "/qcbin/rest/entities",
    },
    HttpKindSpec {
        id: "confluence",
        name: "Confluence",
        description: "Atlassian Confluence wiki pages",
        required_fields: &["space_key"],
        default_ping_path: "/rest/api/space",
        default_records_path: "/rest/api/content",
    },
    HttpKindSpec {
        id: "sharepoint",
        name: "SharePoint",
        description: "Microsoft SharePoint lists and documents",
        required_fields: &["site"],
        default_ping_path: "/_api/web",
        default_records_path: "/_api/web/lists",
    },
];

/// Registers every HTTP adapter kind as both source and destination.
pub fn register(registry: &mut AdapterRegistry) {
    for spec in HTTP_KINDS {
        registry.register_source(
            AdapterKindInfo::new(spec.id, spec.name, spec.description),
            Box::new(move |config| {
                let adapter = HttpAdapter::from_config(spec, config)?;
                Ok(Box::new(adapter))
            }),
        );
        registry.register_destination(
            AdapterKindInfo::new(spec.id, spec.name, spec.description),
            Box::new(move |config| {
                let adapter = HttpAdapter::from_config(spec, config)?;
                Ok(Box::new(adapter))
            }),
        );
    }
}

/// Credentials extracted from the adapter configuration.
enum HttpAuth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// Connection-scoped HTTP adapter usable as source or destination.
pub struct HttpAdapter {
    kind: &'static str,
    client: Client,
    base_url: String,
    ping_path: String,
    records_path: String,
    auth: HttpAuth,
}

impl HttpAdapter {
    fn from_config(spec: &'static HttpKindSpec, config: &AdapterConfig) -> EngineResult<Self> {
        require_string_fields(spec.id, config, &["base_url"])?;
        require_string_fields(spec.id, config, spec.required_fields)?;

        let base_url = config
            .get_str("base_url")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_owned();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(engine_error!(
                ErrorKind::ConfigError,
                "invalid adapter base URL",
                format!("`base_url` must start with http:// or https://, got `{base_url}`")
            ));
        }

        let auth = if let Some(token) = config.get_str("api_token") {
            HttpAuth::Bearer(token.to_owned())
        } else if let (Some(username), Some(password)) =
            (config.get_str("username"), config.get_str("password"))
        {
            HttpAuth::Basic {
                username: username.to_owned(),
                password: password.to_owned(),
            }
        } else {
            HttpAuth::None
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                engine_error!(
                    ErrorKind::ConfigError,
                    "failed to build HTTP client",
                    detail = err.to_string()
                )
            })?;

        Ok(Self {
            kind: spec.id,
            client,
            base_url,
            ping_path: config
                .get_str("ping_path")
                .unwrap_or(spec.default_ping_path)
                .to_owned(),
            records_path: config
                .get_str("records_path")
                .unwrap_or(spec.default_records_path)
                .to_owned(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            HttpAuth::None => builder,
            HttpAuth::Bearer(token) => builder.bearer_auth(token),
            HttpAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    async fn ping(&self) -> EngineResult<()> {
        let response = self
            .request(self.client.get(self.url(&self.ping_path)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(engine_error!(
                ErrorKind::SourceConnectionFailed,
                "adapter endpoint rejected the connection test",
                format!(
                    "`{}` ping to `{}` returned HTTP {}",
                    self.kind,
                    self.url(&self.ping_path),
                    response.status()
                )
            ));
        }

        Ok(())
    }
}

/// Converts one element of the records payload into a [`Record`].
///
/// Objects use their `id`/`key` field as record id when present, otherwise the
/// element index; non-object elements are wrapped under a `value` field.
fn parse_record(index: usize, value: Value) -> Record {
    match value {
        Value::Object(fields) => {
            let id = fields
                .get("id")
                .or_else(|| fields.get("key"))
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| index.to_string());
            Record::new(id, fields)
        }
        other => {
            let mut fields = serde_json::Map::new();
            fields.insert("value".to_owned(), other);
            Record::new(index.to_string(), fields)
        }
    }
}

#[async_trait]
impl SourceAdapter for HttpAdapter {
    async fn test_connection(&mut self) -> EngineResult<()> {
        self.ping().await
    }

    async fn extract(&mut self) -> EngineResult<RecordStream> {
        let response = self
            .request(self.client.get(self.url(&self.records_path)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(engine_error!(
                ErrorKind::SourceError,
                "record extraction request failed",
                format!(
                    "`{}` GET `{}` returned HTTP {}",
                    self.kind,
                    self.url(&self.records_path),
                    response.status()
                )
            ));
        }

        let payload: Value = response.json().await?;
        let elements = match payload {
            Value::Array(elements) => elements,
            // Some APIs wrap the array in an envelope; take the first array value.
            Value::Object(map) => map
                .into_iter()
                .map(|(_, value)| value)
                .find(Value::is_array)
                .and_then(|value| match value {
                    Value::Array(elements) => Some(elements),
                    _ => None,
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let records: Vec<EngineResult<Record>> = elements
            .into_iter()
            .enumerate()
            .map(|(index, value)| Ok(parse_record(index, value)))
            .collect();

        Ok(futures::stream::iter(records).boxed())
    }

    async fn close(&mut self) -> EngineResult<()> {
        // reqwest clients release their pooled connections on drop.
        Ok(())
    }
}

#[async_trait]
impl DestinationAdapter for HttpAdapter {
    async fn test_connection(&mut self) -> EngineResult<()> {
        self.ping().await.map_err(|err| {
            if err.kind() == ErrorKind::SourceConnectionFailed {
                engine_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "adapter endpoint rejected the connection test",
                    detail = err.detail().unwrap_or_default().to_owned()
                )
            } else {
                err
            }
        })
    }

    async fn load(&mut self, record: &Record) -> Result<(), RecordLoadError> {
        let response = self
            .request(self.client.post(self.url(&self.records_path)))
            .json(&record.fields)
            .send()
            .await
            .map_err(|err| RecordLoadError::new(record.id.clone(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(RecordLoadError::new(
                record.id.clone(),
                format!("destination returned HTTP {}", response.status()),
            ));
        }

        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        Ok(())
    }
}
