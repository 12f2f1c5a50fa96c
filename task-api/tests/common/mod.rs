#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use task_api::storage::memory::InMemoryStore;
use task_api::storage::{
    CollectionHandle, CollectionSchema, Item, KeyValueStore, StorageError, UpdateDescriptor,
};
use task_api::task::TaskRepository;
use task_api::task::api::TaskState;
use tower::ServiceExt;

/// HTTP response snapshot for testing JSON endpoints.
#[derive(Debug, Serialize)]
pub struct HttpResponseSnapshot<T: Serialize> {
    test_context: String,
    status: u16,
    content_type: Option<String>,
    body: T,
}

impl<T: Serialize> HttpResponseSnapshot<T> {
    pub fn new(response: TestResponse<T>, test_context: &str) -> Self {
        Self {
            test_context: test_context.to_string(),
            status: response.status.as_u16(),
            content_type: response.content_type,
            body: response.body,
        }
    }
}

/// A response with its body decoded as JSON.
pub struct TestResponse<T> {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: T,
}

/// Test context backed by the in-memory store.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub repository: Arc<TaskRepository>,
}

impl TestContext {
    pub fn app(&self) -> Router {
        task_api::web::create_app(Arc::new(TaskState {
            repository: self.repository.clone(),
        }))
    }

    /// Number of tasks currently stored.
    pub fn stored_tasks(&self) -> usize {
        self.store.len("tasks").unwrap_or(0)
    }
}

pub fn setup() -> TestContext {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(InMemoryStore::new());
    let repository = TaskRepository::with_collection(store.clone(), "tasks");
    TestContext {
        store,
        repository: Arc::new(repository),
    }
}

/// Builds an app whose store fails every call.
pub fn failing_app(message: &str) -> Router {
    let store = Arc::new(FailingStore::new(message));
    let repository = TaskRepository::with_collection(store, "tasks");
    task_api::web::create_app(Arc::new(TaskState {
        repository: Arc::new(repository),
    }))
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Sends `request` through `app` and decodes the body as `T`.
pub async fn send<T: DeserializeOwned>(app: Router, request: Request<Body>) -> TestResponse<T> {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&body).unwrap();
    TestResponse {
        status,
        content_type,
        body,
    }
}

/// Store whose every operation fails with a backend error.
pub struct FailingStore {
    message: String,
}

impl FailingStore {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    fn fail<T>(&self) -> Result<T, StorageError> {
        Err(StorageError::backend(self.message.clone()))
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn create_collection(&self, _schema: &CollectionSchema) -> Result<(), StorageError> {
        self.fail()
    }

    async fn wait_until_active(&self, _collection: &CollectionHandle) -> Result<(), StorageError> {
        self.fail()
    }

    async fn get_item(
        &self,
        _collection: &CollectionHandle,
        _key: &str,
    ) -> Result<Option<Item>, StorageError> {
        self.fail()
    }

    async fn put_item(&self, _collection: &CollectionHandle, _item: Item) -> Result<(), StorageError> {
        self.fail()
    }

    async fn scan(&self, _collection: &CollectionHandle) -> Result<Vec<Item>, StorageError> {
        self.fail()
    }

    async fn update_item(
        &self,
        _collection: &CollectionHandle,
        _key: &str,
        _update: &UpdateDescriptor,
    ) -> Result<Item, StorageError> {
        self.fail()
    }

    async fn delete_item(
        &self,
        _collection: &CollectionHandle,
        _key: &str,
    ) -> Result<(), StorageError> {
        self.fail()
    }
}
