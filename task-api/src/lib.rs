pub mod config {
    use serde::Deserialize;

    /// Development credentials accepted by DynamoDB Local.
    pub const DEVELOPMENT_ACCESS_KEY_ID: &str = "fakeAccessKey";
    pub const DEVELOPMENT_SECRET_ACCESS_KEY: &str = "fakeSecretKey";

    /// Which [`crate::storage::KeyValueStore`] the server runs against.
    #[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum StorageBackend {
        #[default]
        Dynamodb,
        Memory,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        #[serde(default = "default_port")]
        pub port: u16,
        #[serde(default)]
        pub storage_backend: StorageBackend,
        #[serde(default = "default_dynamodb_endpoint")]
        pub dynamodb_endpoint: String,
        #[serde(default = "default_aws_region")]
        pub aws_region: String,
        #[serde(default = "default_aws_access_key_id")]
        pub aws_access_key_id: String,
        #[serde(default = "default_aws_secret_access_key")]
        pub aws_secret_access_key: String,
        #[serde(default = "default_tasks_table")]
        pub tasks_table: String,
        #[serde(default = "default_request_timeout_secs")]
        pub request_timeout_secs: u64,
        #[serde(default = "default_provision_wait_secs")]
        pub provision_wait_secs: u64,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }

        /// Returns `true` when the DynamoDB Local credential pair is in use.
        pub fn uses_development_credentials(&self) -> bool {
            self.aws_access_key_id == DEVELOPMENT_ACCESS_KEY_ID
                || self.aws_secret_access_key == DEVELOPMENT_SECRET_ACCESS_KEY
        }

        /// Returns `true` when the endpoint points at this machine.
        pub fn has_local_endpoint(&self) -> bool {
            let Ok(endpoint) = self.dynamodb_endpoint.parse::<axum::http::Uri>() else {
                return false;
            };
            endpoint.host().is_some_and(|host| {
                ["localhost", "127.0.0.1", "[::1]", "::1"]
                    .iter()
                    .any(|local| host.eq_ignore_ascii_case(local))
            })
        }
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                port: default_port(),
                storage_backend: StorageBackend::default(),
                dynamodb_endpoint: default_dynamodb_endpoint(),
                aws_region: default_aws_region(),
                aws_access_key_id: default_aws_access_key_id(),
                aws_secret_access_key: default_aws_secret_access_key(),
                tasks_table: default_tasks_table(),
                request_timeout_secs: default_request_timeout_secs(),
                provision_wait_secs: default_provision_wait_secs(),
            }
        }
    }

    fn default_port() -> u16 {
        5000
    }

    fn default_dynamodb_endpoint() -> String {
        "http://localhost:8000".to_string()
    }

    fn default_aws_region() -> String {
        "us-east-1".to_string()
    }

    fn default_aws_access_key_id() -> String {
        DEVELOPMENT_ACCESS_KEY_ID.to_string()
    }

    fn default_aws_secret_access_key() -> String {
        DEVELOPMENT_SECRET_ACCESS_KEY.to_string()
    }

    fn default_tasks_table() -> String {
        "tasks".to_string()
    }

    fn default_request_timeout_secs() -> u64 {
        10
    }

    fn default_provision_wait_secs() -> u64 {
        60
    }

}

pub mod storage;
pub mod task;
pub mod web;
