//! Key-value storage abstraction used by the task repository.
//!
//! [`KeyValueStore`] exposes the handful of primitives the service needs from
//! its backend: collection creation, point reads and writes, full scans,
//! partial updates and point deletes. Implementations are dumb stores; the
//! task semantics live in [`crate::task::TaskRepository`].

use std::collections::HashMap;

use async_trait::async_trait;

pub mod dynamodb;
pub mod memory;
pub mod update;

pub use update::{UpdateBuilder, UpdateDescriptor};

/// A stored record: attribute name to string value.
pub type Item = HashMap<String, String>;

/// Shape of a collection to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection (table) name.
    pub name: String,
    /// Name of the sole string-typed key attribute.
    pub key_attribute: String,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_attribute: key_attribute.into(),
        }
    }

    /// Returns a handle addressing a collection with this schema.
    pub fn handle(&self) -> CollectionHandle {
        CollectionHandle {
            name: self.name.clone(),
            key_attribute: self.key_attribute.clone(),
        }
    }
}

/// Reference to a provisioned collection.
///
/// Obtained from [`crate::task::provisioner::CollectionProvisioner`]; every
/// item operation takes one so data access cannot precede provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    name: String,
    key_attribute: String,
}

impl CollectionHandle {
    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key attribute name.
    pub fn key_attribute(&self) -> &str {
        &self.key_attribute
    }
}

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The collection could not be created because it already exists.
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),
    /// The collection does not exist.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),
    /// No item with the given key exists in the collection.
    #[error("Item '{key}' not found in collection '{collection}'")]
    ItemNotFound { collection: String, key: String },
    /// A stored item does not have the expected shape.
    #[error("Malformed item: {0}")]
    Malformed(String),
    /// Any other backend failure (connectivity, permissions, timeouts).
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StorageError {
    /// Creates a [`StorageError::Backend`] without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
            source: None,
        }
    }
}

/// Backend primitives needed by the task repository.
///
/// Implementations must be `Send + Sync`; a single instance is shared by all
/// request handlers behind an `Arc`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Creates a collection keyed by a single string attribute with on-demand
    /// capacity.
    ///
    /// Returns [`StorageError::CollectionExists`] if it is already there.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StorageError>;

    /// Waits until a freshly created collection is reported active.
    async fn wait_until_active(&self, collection: &CollectionHandle) -> Result<(), StorageError>;

    /// Point lookup by key.
    async fn get_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<Option<Item>, StorageError>;

    /// Unconditional write; replaces any item with the same key.
    async fn put_item(&self, collection: &CollectionHandle, item: Item) -> Result<(), StorageError>;

    /// Returns every item of the collection, in no particular order.
    async fn scan(&self, collection: &CollectionHandle) -> Result<Vec<Item>, StorageError>;

    /// Applies `update` to an existing item and returns it as stored after
    /// the update.
    ///
    /// Returns [`StorageError::ItemNotFound`] instead of creating the item
    /// when the key is absent.
    async fn update_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
        update: &UpdateDescriptor,
    ) -> Result<Item, StorageError>;

    /// Removes an existing item.
    ///
    /// Returns [`StorageError::ItemNotFound`] when the key is absent.
    async fn delete_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<(), StorageError>;
}
