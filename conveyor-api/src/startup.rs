use std::net::TcpListener;
use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, web};
use actix_web_httpauth::middleware::HttpAuthentication;
use conveyor_engine::adapters::AdapterRegistry;
use conveyor_engine::engine::Engine;
use conveyor_engine::store::MemoryStore;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    authentication::auth_validator,
    config::ApiConfig,
    routes::{
        ErrorMessage,
        health_check::health_check,
        jobs::{
            GetJobStatusResponse, JobErrorResponse, JobLogResponse, ReadJobResponse,
            ReadJobsResponse, RetryJobResponse, cancel_job, get_job_status, read_all_jobs,
            read_job, retry_job,
        },
        pipelines::{
            AdapterTypeResponse, CreatePipelineRequest, ExecutePipelineResponse,
            ReadPipelineResponse, ReadPipelineTypesResponse, ReadPipelinesResponse,
            TestConnectionRequest, TestConnectionResponse, create_pipeline, delete_pipeline,
            execute_pipeline, read_all_pipelines, read_pipeline, read_pipeline_jobs,
            read_pipeline_types, test_destination_connection, test_source_connection,
            update_pipeline,
        },
    },
};

/// Conveyor API application server wrapper.
///
/// Owns the embedded engine and the HTTP server lifecycle.
pub struct Application {
    port: u16,
    server: Server,
    engine: web::Data<Engine>,
}

impl Application {
    /// Builds the API server and starts the embedded engine.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(AdapterRegistry::with_builtins());
        let mut engine = Engine::new(config.engine.clone(), store, registry)?;
        engine.start()?;
        let engine = web::Data::new(engine);

        let server = run(config, listener, engine.clone())?;

        Ok(Self {
            port,
            server,
            engine,
        })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it receives a shutdown signal, then stops the engine.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let result = self.server.await;
        self.engine.shutdown();
        result
    }
}

/// Creates and configures the HTTP server with all routes and middleware.
///
/// Sets up authentication, request tracing, Swagger UI, and all API endpoints.
pub fn run(
    config: ApiConfig,
    listener: TcpListener,
    engine: web::Data<Engine>,
) -> Result<Server, anyhow::Error> {
    let config = web::Data::new(config);

    #[derive(OpenApi)]
    #[openapi(
        paths(crate::routes::health_check::health_check),
        components(schemas(
            ErrorMessage,
            CreatePipelineRequest,
            ReadPipelineResponse,
            ReadPipelinesResponse,
            ExecutePipelineResponse,
            TestConnectionRequest,
            TestConnectionResponse,
            AdapterTypeResponse,
            ReadPipelineTypesResponse,
            ReadJobResponse,
            ReadJobsResponse,
            JobLogResponse,
            JobErrorResponse,
            GetJobStatusResponse,
            RetryJobResponse,
        )),
        nest(
            (path = "/v1", api = ApiV1)
        )
    )]
    struct ApiDoc;

    #[derive(OpenApi)]
    #[openapi(paths(
        crate::routes::pipelines::create_pipeline,
        crate::routes::pipelines::read_pipeline,
        crate::routes::pipelines::read_all_pipelines,
        crate::routes::pipelines::update_pipeline,
        crate::routes::pipelines::delete_pipeline,
        crate::routes::pipelines::execute_pipeline,
        crate::routes::pipelines::test_source_connection,
        crate::routes::pipelines::test_destination_connection,
        crate::routes::pipelines::read_pipeline_types,
        crate::routes::pipelines::read_pipeline_jobs,
        crate::routes::jobs::read_all_jobs,
        crate::routes::jobs::read_job,
        crate::routes::jobs::get_job_status,
        crate::routes::jobs::retry_job,
        crate::routes::jobs::cancel_job,
    ))]
    struct ApiV1;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let tracing_logger = TracingLogger::default();
        let authentication = HttpAuthentication::bearer(auth_validator);
        App::new()
            .wrap(tracing_logger)
            .service(health_check)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(
                web::scope("v1")
                    .wrap(authentication)
                    // pipelines
                    .service(test_source_connection)
                    .service(test_destination_connection)
                    .service(read_pipeline_types)
                    .service(create_pipeline)
                    .service(read_all_pipelines)
                    .service(read_pipeline)
                    .service(update_pipeline)
                    .service(delete_pipeline)
                    .service(execute_pipeline)
                    .service(read_pipeline_jobs)
                    // jobs
                    .service(read_all_jobs)
                    .service(read_job)
                    .service(get_job_status)
                    .service(retry_job)
                    .service(cancel_job),
            )
            .app_data(config.clone())
            .app_data(engine.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
