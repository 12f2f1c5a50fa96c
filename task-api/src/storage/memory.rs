//! In-memory [`KeyValueStore`] backed by [`DashMap`].
//!
//! Collections become active as soon as they are created. Used by the test
//! suite and for running the service locally without a database
//! (`STORAGE_BACKEND=memory`).

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{
    CollectionHandle, CollectionSchema, Item, KeyValueStore, StorageError, UpdateDescriptor,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: DashMap<String, HashMap<String, Item>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of items in `collection`, or `None` if the
    /// collection has not been created.
    pub fn len(&self, collection: &str) -> Option<usize> {
        self.collections.get(collection).map(|items| items.len())
    }
}

fn item_not_found(collection: &CollectionHandle, key: &str) -> StorageError {
    StorageError::ItemNotFound {
        collection: collection.name().to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StorageError> {
        match self.collections.entry(schema.name.clone()) {
            Entry::Occupied(_) => Err(StorageError::CollectionExists(schema.name.clone())),
            Entry::Vacant(entry) => {
                entry.insert(HashMap::new());
                Ok(())
            }
        }
    }

    async fn wait_until_active(&self, collection: &CollectionHandle) -> Result<(), StorageError> {
        if self.collections.contains_key(collection.name()) {
            Ok(())
        } else {
            Err(StorageError::CollectionNotFound(collection.name().to_string()))
        }
    }

    async fn get_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<Option<Item>, StorageError> {
        let items = self
            .collections
            .get(collection.name())
            .ok_or_else(|| StorageError::CollectionNotFound(collection.name().to_string()))?;
        Ok(items.get(key).cloned())
    }

    async fn put_item(&self, collection: &CollectionHandle, item: Item) -> Result<(), StorageError> {
        let key = item
            .get(collection.key_attribute())
            .cloned()
            .ok_or_else(|| {
                StorageError::Malformed(format!(
                    "item is missing key attribute '{}'",
                    collection.key_attribute()
                ))
            })?;
        let mut items = self
            .collections
            .get_mut(collection.name())
            .ok_or_else(|| StorageError::CollectionNotFound(collection.name().to_string()))?;
        items.insert(key, item);
        Ok(())
    }

    async fn scan(&self, collection: &CollectionHandle) -> Result<Vec<Item>, StorageError> {
        let items = self
            .collections
            .get(collection.name())
            .ok_or_else(|| StorageError::CollectionNotFound(collection.name().to_string()))?;
        Ok(items.values().cloned().collect())
    }

    async fn update_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
        update: &UpdateDescriptor,
    ) -> Result<Item, StorageError> {
        let mut items = self
            .collections
            .get_mut(collection.name())
            .ok_or_else(|| StorageError::CollectionNotFound(collection.name().to_string()))?;
        let item = items
            .get_mut(key)
            .ok_or_else(|| item_not_found(collection, key))?;
        for (attribute, value) in update.assignments() {
            item.insert(attribute.to_string(), value.to_string());
        }
        Ok(item.clone())
    }

    async fn delete_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<(), StorageError> {
        let mut items = self
            .collections
            .get_mut(collection.name())
            .ok_or_else(|| StorageError::CollectionNotFound(collection.name().to_string()))?;
        items
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| item_not_found(collection, key))
    }
}
