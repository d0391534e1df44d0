//! AWS-backed collaborators and the state shared by the lambdas.

pub mod cognito;
pub mod config;
pub mod dynamo;
pub mod s3;

use std::sync::Arc;

use doeklus_atoms::Backend;

pub use cognito::CognitoIdentityProvider;
pub use config::{Config, ConfigError};
pub use dynamo::DynamoStore;
pub use s3::S3BlobStore;

/// Built once per cold start and shared by every invocation.
#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
}

impl AppState {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = Config::from_env()?;
        let aws = aws_config::load_from_env().await;

        let store = DynamoStore::new(aws_sdk_dynamodb::Client::new(&aws), &config.table_name);
        let blobs = S3BlobStore::new(
            aws_sdk_s3::Client::new(&aws),
            &config.bucket_name,
            &config.public_base_url,
        );
        let identity = CognitoIdentityProvider::new(
            aws_sdk_cognitoidentityprovider::Client::new(&aws),
            &config.cognito_client_id,
            &config.cognito_client_secret,
        );

        tracing::info!(
            "Using table {} and bucket {}",
            config.table_name,
            config.bucket_name
        );
        let backend = Backend::new(Arc::new(store), Arc::new(blobs), Arc::new(identity))
            .with_retry(config.retry);
        Ok(Self { backend })
    }
}
