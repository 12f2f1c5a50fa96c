use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::storage::{CollectionHandle, CollectionSchema, KeyValueStore, StorageError};

/// Error raised when the collection cannot be provisioned.
#[derive(Debug, thiserror::Error)]
#[error("Failed to provision collection '{collection}': {source}")]
pub struct ProvisioningError {
    collection: String,
    #[source]
    source: StorageError,
}

/// Makes sure the task collection exists before anything touches it.
///
/// Creation is attempted and an "already exists" outcome counts as success,
/// so any number of instances may provision concurrently. The first
/// successful handle is cached; failures are not, so the next call retries.
pub struct CollectionProvisioner {
    store: Arc<dyn KeyValueStore>,
    schema: CollectionSchema,
    handle: OnceCell<CollectionHandle>,
}

impl CollectionProvisioner {
    pub fn new(store: Arc<dyn KeyValueStore>, schema: CollectionSchema) -> Self {
        Self {
            store,
            schema,
            handle: OnceCell::new(),
        }
    }

    /// Returns the name of the collection this provisioner manages.
    pub fn collection_name(&self) -> &str {
        &self.schema.name
    }

    /// Returns a handle to the collection, creating it on first use.
    pub async fn ensure_collection(&self) -> Result<CollectionHandle, ProvisioningError> {
        self.handle
            .get_or_try_init(|| self.provision())
            .await
            .cloned()
    }

    /// Runs the create-or-exists check without consulting the cached handle.
    #[tracing::instrument(skip(self), fields(collection = %self.schema.name))]
    pub async fn probe(&self) -> Result<CollectionHandle, ProvisioningError> {
        self.provision().await
    }

    async fn provision(&self) -> Result<CollectionHandle, ProvisioningError> {
        let handle = self.schema.handle();
        match self.store.create_collection(&self.schema).await {
            Ok(()) => {
                self.store
                    .wait_until_active(&handle)
                    .await
                    .map_err(|source| self.error(source))?;
                tracing::info!("Collection '{}' created", self.schema.name);
                Ok(handle)
            }
            Err(StorageError::CollectionExists(_)) => {
                tracing::debug!("Collection '{}' already exists", self.schema.name);
                Ok(handle)
            }
            Err(source) => {
                tracing::error!(
                    "Failed to provision collection '{}': {}",
                    self.schema.name,
                    source
                );
                Err(self.error(source))
            }
        }
    }

    fn error(&self, source: StorageError) -> ProvisioningError {
        ProvisioningError {
            collection: self.schema.name.clone(),
            source,
        }
    }
}
