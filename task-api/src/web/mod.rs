use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

use crate::config::{Config, StorageBackend};
use crate::storage::KeyValueStore;
use crate::storage::dynamodb::DynamoDbStore;
use crate::storage::memory::InMemoryStore;
use crate::task::api::{TaskState, create_task_router};
use crate::task::{TaskRepository, TaskServiceError};

pub mod api;

pub const SERVICE_NAME: &str = "Task Management API";

const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected error occurred while processing your request. Please try again later.";

/// JSON response for API errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: String) -> Self {
        Self { error }
    }
}

/// Custom error type for API handler operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or its fields are invalid.
    #[error("{0}")]
    BadRequest(String),
    /// The addressed task does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Backend or provisioning failure. The message is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::Validation(message) => ApiError::BadRequest(message),
            TaskServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            TaskServiceError::Backend(_) | TaskServiceError::Provisioning(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => {
                tracing::error!("Request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                )
            }
        };

        (status_code, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Describes the service and its endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

/// Result of a health probe.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[tracing::instrument]
pub async fn root_handler() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: BTreeMap::from([
            ("health".to_string(), "/health".to_string()),
            ("tasks".to_string(), "/tasks".to_string()),
        ]),
    })
}

/// Probes the backend by re-running collection provisioning.
#[tracing::instrument(skip(state))]
pub async fn health_check_handler(
    State(state): State<Arc<TaskState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let provisioner = state.repository.provisioner();
    match provisioner.probe().await {
        Ok(collection) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: "connected".to_string(),
                table: Some(collection.name().to_string()),
                error: None,
            }),
        ),
        Err(err) => {
            tracing::error!(
                "Health check of '{}' failed: {}",
                provisioner.collection_name(),
                err
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    database: "disconnected".to_string(),
                    table: None,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

/// Builds the complete application router around `state`.
pub fn create_app(state: Arc<TaskState>) -> Router {
    let service_routes = Router::new()
        .route("/", axum::routing::get(root_handler))
        .route("/health", axum::routing::get(health_check_handler))
        .with_state(state.clone());

    Router::new()
        .merge(service_routes)
        .merge(create_task_router(state))
        .merge(api::create_api_router())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_headers(Any)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]),
            ),
        )
}

/// Creates the key-value store selected by the configuration.
pub async fn create_store(config: &Config) -> Arc<dyn KeyValueStore> {
    match config.storage_backend {
        StorageBackend::Dynamodb => {
            tracing::info!("Connecting to DynamoDB at: {}", config.dynamodb_endpoint);
            if config.uses_development_credentials() && !config.has_local_endpoint() {
                tracing::warn!(
                    "Using local development credentials against non-local endpoint {}; \
                     set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY",
                    config.dynamodb_endpoint
                );
            }
            Arc::new(DynamoDbStore::from_config(config).await)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; tasks are lost on shutdown");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let store = create_store(&config).await;
    let repository = TaskRepository::with_collection(store, &config.tasks_table);

    // Provisioning is retried lazily on the first request if this fails.
    match repository.provisioner().ensure_collection().await {
        Ok(collection) => tracing::info!("Collection '{}' is ready", collection.name()),
        Err(err) => tracing::warn!("Collection not ready at startup: {}", err),
    }

    let state = Arc::new(TaskState {
        repository: Arc::new(repository),
    });

    axum::serve(listener, create_app(state)).await?;
    Ok(())
}
