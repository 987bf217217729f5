pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::middleware::request_id::{REQUEST_ID_HEADER, request_id_middleware};
use crate::config::GatewayConfig;
use crate::services::ingest::IngestPipeline;
use crate::services::metadata_store::MetadataStore;
use crate::services::object_store::ObjectStore;
use crate::services::retrieval::RetrievalResolver;
use crate::services::staging::TempStage;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::upload_file,
        api::handlers::files::list_files,
        api::handlers::files::retrieve_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::files::UploadForm,
            api::handlers::files::FileListResponse,
            api::handlers::health::HealthResponse,
            models::FileRecord,
        )
    ),
    tags(
        (name = "files", description = "Upload, listing and retrieval"),
        (name = "system", description = "Operational endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub store: MetadataStore,
    pub stage: Arc<TempStage>,
    pub ingest: Arc<IngestPipeline>,
    pub resolver: Arc<RetrievalResolver>,
}

impl AppState {
    /// Wire every component from one resolved configuration.
    pub fn new(
        config: GatewayConfig,
        store: MetadataStore,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let stage = Arc::new(TempStage::new(
            config.staging_dir.clone(),
            config.max_file_size,
        ));
        let ingest = Arc::new(IngestPipeline::new(store.clone(), objects.clone()));
        let resolver = Arc::new(RetrievalResolver::new(
            store.clone(),
            objects,
            config.signed_url_ttl_secs,
            config.verify_object_on_resolve,
        ));

        Self {
            config,
            store,
            stage,
            ingest,
            resolver,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // Added before the request-id layer so it runs inside it and sees the id
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            tracing::info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                tracing::info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    // 10MB on top of the file limit for multipart overhead
    let body_limit = state.config.max_file_size.saturating_add(10 * 1024 * 1024);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/", get(api::handlers::files::list_files))
        .route("/files", get(api::handlers::files::list_files))
        .route("/files/:id", get(api::handlers::files::retrieve_file))
        .route("/upload", post(api::handlers::files::upload_file))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
