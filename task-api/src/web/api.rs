use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::task::api::TaskApiDoc;

/// Serves the OpenAPI document of the task endpoints.
#[tracing::instrument]
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(TaskApiDoc::openapi())
}

/// Creates the routes describing the API itself.
pub fn create_api_router() -> Router {
    Router::new().route("/openapi.json", get(openapi_handler))
}
