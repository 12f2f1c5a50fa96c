use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::storage::{
    CollectionHandle, CollectionSchema, Item, KeyValueStore, StorageError, UpdateDescriptor,
};

pub mod api;
pub mod provisioner;

use provisioner::{CollectionProvisioner, ProvisioningError};

pub const DEFAULT_STATUS: &str = "pending";

const ID: &str = "id";
const TITLE: &str = "title";
const DESCRIPTION: &str = "description";
const STATUS: &str = "status";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: String,
    title: String,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: String,
        title: String,
        description: String,
        status: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            status,
            created_at,
            updated_at,
        }
    }

    /// Returns the ID of the task.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the title of the task.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description of the task.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the status of the task.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns when the task was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the task was last modified.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Formats a timestamp the way it is stored and returned to clients.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp. Timestamps without an offset, as written by
/// older clients of the same table, are read as UTC.
fn parse_timestamp(attribute: &str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .or_else(|_| value.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
        .map_err(|e| {
            StorageError::Malformed(format!("attribute '{attribute}' is not a timestamp: {e}"))
        })
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl From<&Task> for Item {
    fn from(task: &Task) -> Self {
        Item::from([
            (ID.to_string(), task.id.clone()),
            (TITLE.to_string(), task.title.clone()),
            (DESCRIPTION.to_string(), task.description.clone()),
            (STATUS.to_string(), task.status.clone()),
            (CREATED_AT.to_string(), format_timestamp(task.created_at)),
            (UPDATED_AT.to_string(), format_timestamp(task.updated_at)),
        ])
    }
}

impl TryFrom<Item> for Task {
    type Error = StorageError;

    fn try_from(mut item: Item) -> Result<Self, Self::Error> {
        let mut take = |attribute: &str| {
            item.remove(attribute).ok_or_else(|| {
                StorageError::Malformed(format!("task item is missing attribute '{attribute}'"))
            })
        };
        let id = take(ID)?;
        let title = take(TITLE)?;
        let description = take(DESCRIPTION)?;
        let status = take(STATUS)?;
        let created_at = take(CREATED_AT)?;
        let updated_at = take(UPDATED_AT)?;

        Ok(Task::new(
            id,
            title,
            description,
            status,
            parse_timestamp(CREATED_AT, &created_at)?,
            parse_timestamp(UPDATED_AT, &updated_at)?,
        ))
    }
}

/// Input for creating a task. Only `title` is required.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateTask {
    /// Title of the task; must not be empty
    pub title: Option<String>,
    /// Free-form description, defaults to an empty string
    pub description: Option<String>,
    /// Free-form status, defaults to `pending`
    pub status: Option<String>,
}

impl CreateTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Partial update of a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateTask {
    /// New title; must not be empty when present
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New status
    pub status: Option<String>,
}

/// Confirmation returned after a task is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedTask {
    id: String,
}

impl DeletedTask {
    /// Returns the ID of the deleted task.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Error type for TaskRepository operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// The caller's input is malformed.
    #[error("{0}")]
    Validation(String),
    /// No task with the given ID exists.
    #[error("Task {0} not found")]
    NotFound(String),
    /// Any unclassified storage failure.
    #[error("Backend failure: {0}")]
    Backend(#[from] StorageError),
    /// The collection could not be provisioned.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

/// Create, read, update and delete operations over task records.
pub struct TaskRepository {
    store: Arc<dyn KeyValueStore>,
    provisioner: Arc<CollectionProvisioner>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, provisioner: Arc<CollectionProvisioner>) -> Self {
        Self { store, provisioner }
    }

    /// Creates a repository over `collection`, keyed by `id`.
    pub fn with_collection(store: Arc<dyn KeyValueStore>, collection: &str) -> Self {
        let provisioner =
            CollectionProvisioner::new(store.clone(), CollectionSchema::new(collection, ID));
        Self::new(store, Arc::new(provisioner))
    }

    /// Returns the provisioner guarding this repository's collection.
    pub fn provisioner(&self) -> &CollectionProvisioner {
        &self.provisioner
    }

    async fn collection(&self) -> Result<CollectionHandle, TaskServiceError> {
        Ok(self.provisioner.ensure_collection().await?)
    }

    async fn find(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> Result<Task, TaskServiceError> {
        let item = self
            .store
            .get_item(collection, id)
            .await?
            .ok_or_else(|| TaskServiceError::NotFound(id.to_string()))?;
        Ok(Task::try_from(item)?)
    }

    /// Creates a new task with a generated ID.
    ///
    /// # Arguments
    ///
    /// * `input` - Title (required), description and status of the task.
    ///
    /// # Returns
    ///
    /// A `Result` containing the stored `Task`, or `Validation` if the title
    /// is missing or empty.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: CreateTask) -> Result<Task, TaskServiceError> {
        let title = input
            .title
            .filter(|title| !title.is_empty())
            .ok_or_else(|| TaskServiceError::Validation("Title is required".to_string()))?;

        let collection = self.collection().await?;
        let timestamp = now();
        let task = Task::new(
            uuid::Uuid::new_v4().to_string(),
            title,
            input.description.unwrap_or_default(),
            input.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            timestamp,
            timestamp,
        );
        self.store.put_item(&collection, Item::from(&task)).await?;

        tracing::info!("Created task: {}", task.id);
        Ok(task)
    }

    /// Retrieves a task by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Task, TaskServiceError> {
        let collection = self.collection().await?;
        self.find(&collection, id).await
    }

    /// Retrieves every task, in no particular order.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Task>, TaskServiceError> {
        let collection = self.collection().await?;
        let tasks = self
            .store
            .scan(&collection)
            .await?
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!("Retrieved {} tasks", tasks.len());
        Ok(tasks)
    }

    /// Applies the fields present in `input` to an existing task.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the task to update.
    /// * `input` - The fields to change; absent fields are left as they are.
    ///
    /// # Returns
    ///
    /// A `Result` containing the task as stored after the update, or
    /// `NotFound` if no such task exists.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: &str, input: UpdateTask) -> Result<Task, TaskServiceError> {
        let collection = self.collection().await?;
        let existing = self.find(&collection, id).await?;

        if input.title.as_deref().is_some_and(str::is_empty) {
            return Err(TaskServiceError::Validation(
                "Title must not be empty".to_string(),
            ));
        }

        let update = UpdateDescriptor::builder()
            .set(UPDATED_AT, format_timestamp(now().max(existing.updated_at)))
            .set_if_present(TITLE, input.title)
            .set_if_present(DESCRIPTION, input.description)
            .set_if_present(STATUS, input.status)
            .build();

        let item = self
            .store
            .update_item(&collection, id, &update)
            .await
            .map_err(|e| not_found_or(e, id))?;

        tracing::info!("Updated task: {}", id);
        Ok(Task::try_from(item)?)
    }

    /// Deletes a task by its ID.
    ///
    /// Deleting is not idempotent: a second delete of the same ID fails with
    /// `NotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<DeletedTask, TaskServiceError> {
        let collection = self.collection().await?;
        self.find(&collection, id).await?;

        self.store
            .delete_item(&collection, id)
            .await
            .map_err(|e| not_found_or(e, id))?;

        tracing::info!("Deleted task: {}", id);
        Ok(DeletedTask { id: id.to_string() })
    }
}

/// A task removed between the existence check and the mutation is reported
/// as not found.
fn not_found_or(error: StorageError, id: &str) -> TaskServiceError {
    match error {
        StorageError::ItemNotFound { .. } => TaskServiceError::NotFound(id.to_string()),
        other => TaskServiceError::Backend(other),
    }
}
