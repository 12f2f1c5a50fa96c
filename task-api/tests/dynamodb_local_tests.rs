//! Tests against DynamoDB Local. They need Docker and run with
//! `cargo test --features dynamodb-local-tests`.
#![cfg(feature = "dynamodb-local-tests")]

use std::collections::HashSet;
use std::sync::Arc;

use task_api::config::Config;
use task_api::storage::dynamodb::DynamoDbStore;
use task_api::storage::{CollectionSchema, KeyValueStore, StorageError, UpdateDescriptor};
use task_api::task::provisioner::CollectionProvisioner;
use task_api::task::{CreateTask, TaskRepository, TaskServiceError, UpdateTask};
use testcontainers_modules::dynamodb_local::DynamoDb;
use testcontainers_modules::testcontainers::{self, runners::AsyncRunner};

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<DynamoDb>,
    pub store: Arc<DynamoDbStore>,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let container = DynamoDb::default().start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(8000).await?;
    let config = Config {
        dynamodb_endpoint: format!("http://{}:{}", host, port),
        ..Default::default()
    };
    let store = Arc::new(DynamoDbStore::from_config(&config).await);
    Ok(TestContext { container, store })
}

#[tokio::test]
async fn can_provision_table_twice() -> anyhow::Result<()> {
    let state = setup().await?;
    let schema = CollectionSchema::new("tasks", "id");
    let first = CollectionProvisioner::new(state.store.clone(), schema.clone());
    let second = CollectionProvisioner::new(state.store.clone(), schema);

    let created = first.ensure_collection().await?;
    let existing = second.ensure_collection().await?;

    assert_eq!(created, existing);
    assert!(state.store.scan(&created).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn existing_table_is_reported_as_existing() -> anyhow::Result<()> {
    let state = setup().await?;
    let schema = CollectionSchema::new("tasks", "id");
    state.store.create_collection(&schema).await?;

    let result = state.store.create_collection(&schema).await;

    assert!(matches!(result, Err(StorageError::CollectionExists(_))));
    Ok(())
}

#[tokio::test]
async fn can_run_task_lifecycle() -> anyhow::Result<()> {
    let state = setup().await?;
    let repository = TaskRepository::with_collection(state.store.clone(), "tasks");

    let created = repository.create(CreateTask::new("Write report")).await?;
    let other = repository.create(CreateTask::new("Review report")).await?;
    assert_eq!(repository.get(created.id()).await?, created);

    let listed: HashSet<String> = repository
        .list()
        .await?
        .iter()
        .map(|task| task.id().to_string())
        .collect();
    assert_eq!(
        listed,
        HashSet::from([created.id().to_string(), other.id().to_string()])
    );

    let updated = repository
        .update(
            created.id(),
            UpdateTask {
                status: Some("done".to_string()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.status(), "done");
    assert_eq!(updated.title(), "Write report");
    assert_eq!(updated.created_at(), created.created_at());
    assert_eq!(repository.get(created.id()).await?, updated);

    repository.delete(created.id()).await?;
    assert!(matches!(
        repository.get(created.id()).await,
        Err(TaskServiceError::NotFound(_))
    ));
    assert!(matches!(
        repository.delete(created.id()).await,
        Err(TaskServiceError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn update_never_recreates_deleted_item() -> anyhow::Result<()> {
    let state = setup().await?;
    let provisioner =
        CollectionProvisioner::new(state.store.clone(), CollectionSchema::new("tasks", "id"));
    let collection = provisioner.ensure_collection().await?;
    let update = UpdateDescriptor::builder().set("status", "done").build();

    let result = state.store.update_item(&collection, "ghost", &update).await;

    assert!(matches!(result, Err(StorageError::ItemNotFound { .. })));
    assert_eq!(state.store.get_item(&collection, "ghost").await?, None);
    Ok(())
}
