#![allow(dead_code)]

use conveyor_api::config::{ApiConfig, ApplicationSettings};
use conveyor_api::startup::Application;
use conveyor_config::shared::{EngineConfig, RecordRetryConfig};
use conveyor_telemetry::tracing::init_test_tracing;
use serde_json::{Value, json};

pub const TEST_API_KEY: &str = "test-api-key";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.address))
            .bearer_auth(TEST_API_KEY)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.address))
            .bearer_auth(TEST_API_KEY)
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.address))
            .bearer_auth(TEST_API_KEY)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn put(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(format!("{}{path}", self.address))
            .bearer_auth(TEST_API_KEY)
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{path}", self.address))
            .bearer_auth(TEST_API_KEY)
            .send()
            .await
            .expect("request failed")
    }
}

/// Spawns the API with an embedded engine on an ephemeral port.
pub async fn spawn_app() -> TestApp {
    init_test_tracing();

    let config = ApiConfig {
        application: ApplicationSettings {
            host: "127.0.0.1".to_owned(),
            port: 0,
        },
        engine: EngineConfig {
            workers: 2,
            poll_interval_ms: 20,
            tick_interval_secs: 1,
            job_timeout_secs: 5,
            batch_size: 10,
            record_retry: RecordRetryConfig {
                max_attempts: 1,
                backoff_ms: 5,
            },
        },
        api_keys: vec![TEST_API_KEY.to_owned().into()],
    };

    let application = Application::build(config)
        .await
        .expect("failed to build application");
    let address = format!("http://127.0.0.1:{}", application.port());
    tokio::spawn(application.run_until_stopped());

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

/// A memory-to-memory pipeline creation body.
pub fn memory_pipeline_body(name: &str, source: Value, destination: Value) -> Value {
    json!({
        "name": name,
        "source_type": "memory",
        "source_config": source,
        "destination_type": "memory",
        "destination_config": destination,
    })
}
