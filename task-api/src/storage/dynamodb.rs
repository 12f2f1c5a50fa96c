//! Amazon DynamoDB [`KeyValueStore`].
//!
//! Maps the store primitives onto `CreateTable`, `GetItem`, `PutItem`,
//! `Scan`, `UpdateItem` and `DeleteItem`. Items are flat maps of string
//! attributes (`S`); numeric attributes written by other tools are read back
//! as their string form.
//!
//! Updates and deletes carry an `attribute_exists` condition on the key so a
//! record removed between the repository's existence check and the mutation
//! is reported as [`StorageError::ItemNotFound`] rather than silently
//! recreated by `UpdateItem`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ReturnValue,
    ScalarAttributeType,
};

use super::{
    CollectionHandle, CollectionSchema, Item, KeyValueStore, StorageError, UpdateDescriptor,
};
use crate::config::Config;

/// Alias of the key attribute in condition expressions. Never clashes with
/// the `#fN` aliases produced by [`UpdateDescriptor`].
const KEY_ALIAS: &str = "#key";

#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
    activation_timeout: Duration,
}

impl DynamoDbStore {
    /// Wraps a pre-built client. `activation_timeout` bounds how long
    /// [`KeyValueStore::wait_until_active`] waits for a new table.
    pub fn new(client: Client, activation_timeout: Duration) -> Self {
        Self {
            client,
            activation_timeout,
        }
    }

    /// Builds a client from the service configuration.
    ///
    /// Requests are always signed with the configured credential pair and
    /// bounded by the configured operation timeout.
    pub async fn from_config(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
            None,
            None,
            "task-api-environment",
        );
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.request_timeout_secs))
            .build();
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .endpoint_url(config.dynamodb_endpoint.clone())
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .load()
            .await;
        Self::new(
            Client::new(&sdk_config),
            Duration::from_secs(config.provision_wait_secs),
        )
    }
}

/// Maps an AWS SDK error to a [`StorageError::Backend`].
fn map_sdk_error(
    err: impl std::error::Error + Send + Sync + 'static,
    context: &str,
) -> StorageError {
    StorageError::Backend {
        message: format!("DynamoDB error for {context}: {err}"),
        source: Some(Box::new(err)),
    }
}

fn item_not_found(collection: &CollectionHandle, key: &str) -> StorageError {
    StorageError::ItemNotFound {
        collection: collection.name().to_string(),
        key: key.to_string(),
    }
}

fn to_attribute_map(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter()
        .map(|(name, value)| (name, AttributeValue::S(value)))
        .collect()
}

fn from_attribute_map(attributes: &HashMap<String, AttributeValue>) -> Result<Item, StorageError> {
    attributes
        .iter()
        .map(|(name, value)| match value {
            AttributeValue::S(s) => Ok((name.clone(), s.clone())),
            AttributeValue::N(n) => Ok((name.clone(), n.clone())),
            other => Err(StorageError::Malformed(format!(
                "attribute '{name}' has unsupported type: {other:?}"
            ))),
        })
        .collect()
}

#[async_trait]
impl KeyValueStore for DynamoDbStore {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StorageError> {
        let key_schema = KeySchemaElement::builder()
            .attribute_name(&schema.key_attribute)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| map_sdk_error(e, &schema.name))?;
        let key_definition = AttributeDefinition::builder()
            .attribute_name(&schema.key_attribute)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| map_sdk_error(e, &schema.name))?;

        let result = self
            .client
            .create_table()
            .table_name(&schema.name)
            .key_schema(key_schema)
            .attribute_definitions(key_definition)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                if sdk_err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception())
                {
                    return Err(StorageError::CollectionExists(schema.name.clone()));
                }
                Err(map_sdk_error(sdk_err, &schema.name))
            }
        }
    }

    async fn wait_until_active(&self, collection: &CollectionHandle) -> Result<(), StorageError> {
        self.client
            .wait_until_table_exists()
            .table_name(collection.name())
            .wait(self.activation_timeout)
            .await
            .map(|_| ())
            .map_err(|e| {
                StorageError::backend(format!(
                    "table '{}' did not become active: {e:?}",
                    collection.name()
                ))
            })
    }

    async fn get_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<Option<Item>, StorageError> {
        let result = self
            .client
            .get_item()
            .table_name(collection.name())
            .key(collection.key_attribute(), AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        result.item().map(from_attribute_map).transpose()
    }

    async fn put_item(&self, collection: &CollectionHandle, item: Item) -> Result<(), StorageError> {
        let key = item
            .get(collection.key_attribute())
            .cloned()
            .unwrap_or_default();
        self.client
            .put_item()
            .table_name(collection.name())
            .set_item(Some(to_attribute_map(item)))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &key))?;
        Ok(())
    }

    async fn scan(&self, collection: &CollectionHandle) -> Result<Vec<Item>, StorageError> {
        let mut results = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(collection.name())
                .consistent_read(true)
                .set_exclusive_start_key(exclusive_start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, collection.name()))?;

            for attributes in output.items() {
                results.push(from_attribute_map(attributes)?);
            }

            match output.last_evaluated_key() {
                Some(last_key) if !last_key.is_empty() => {
                    exclusive_start_key = Some(last_key.clone());
                }
                _ => break,
            }
        }

        Ok(results)
    }

    async fn update_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
        update: &UpdateDescriptor,
    ) -> Result<Item, StorageError> {
        // DynamoDB rejects an empty update expression.
        if update.is_empty() {
            return self
                .get_item(collection, key)
                .await?
                .ok_or_else(|| item_not_found(collection, key));
        }

        let mut names = update.attribute_names();
        names.insert(KEY_ALIAS.to_string(), collection.key_attribute().to_string());
        let values = update
            .attribute_values()
            .into_iter()
            .map(|(placeholder, value)| (placeholder, AttributeValue::S(value)))
            .collect();

        let result = self
            .client
            .update_item()
            .table_name(collection.name())
            .key(collection.key_attribute(), AttributeValue::S(key.to_string()))
            .update_expression(update.expression())
            .condition_expression(format!("attribute_exists({KEY_ALIAS})"))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => {
                let attributes = output.attributes().ok_or_else(|| {
                    StorageError::Malformed(format!("update of '{key}' returned no attributes"))
                })?;
                from_attribute_map(attributes)
            }
            Err(sdk_err) => {
                if sdk_err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    return Err(item_not_found(collection, key));
                }
                Err(map_sdk_error(sdk_err, key))
            }
        }
    }

    async fn delete_item(
        &self,
        collection: &CollectionHandle,
        key: &str,
    ) -> Result<(), StorageError> {
        let result = self
            .client
            .delete_item()
            .table_name(collection.name())
            .key(collection.key_attribute(), AttributeValue::S(key.to_string()))
            .condition_expression(format!("attribute_exists({KEY_ALIAS})"))
            .expression_attribute_names(KEY_ALIAS, collection.key_attribute())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                if sdk_err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    return Err(item_not_found(collection, key));
                }
                Err(map_sdk_error(sdk_err, key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_string_and_number_attributes() {
        let attributes = HashMap::from([
            ("id".to_string(), AttributeValue::S("abc".to_string())),
            ("priority".to_string(), AttributeValue::N("3".to_string())),
        ]);

        let item = from_attribute_map(&attributes).unwrap();

        assert_eq!(item.get("id").map(String::as_str), Some("abc"));
        assert_eq!(item.get("priority").map(String::as_str), Some("3"));
    }

    #[test]
    fn can_reject_unsupported_attribute_types() {
        let attributes = HashMap::from([("done".to_string(), AttributeValue::Bool(true))]);

        let result = from_attribute_map(&attributes);

        assert!(matches!(result, Err(StorageError::Malformed(_))));
    }

    #[test]
    fn writes_every_attribute_as_string() {
        let item = Item::from([("status".to_string(), "pending".to_string())]);

        let attributes = to_attribute_map(item);

        assert_eq!(
            attributes.get("status"),
            Some(&AttributeValue::S("pending".to_string()))
        );
    }
}
