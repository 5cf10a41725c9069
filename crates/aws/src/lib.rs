//! AWS stores for configmanager
//!
//! - [`SecretsManagerFactory`]: `AWSSECRETS` tokens via AWS Secrets Manager
//! - [`ParameterStoreFactory`]: `AWSPARAMSTR` tokens via SSM Parameter Store
//!
//! Both load credentials and region from the default provider chain once per
//! factory and share the loaded configuration across every store they build.

mod parameters;
mod secrets;

pub use parameters::{ParameterStore, ParameterStoreFactory};
pub use secrets::{SecretsManagerFactory, SecretsManagerMetadata, SecretsManagerStore};

use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use configmanager_secrets::{SecretError, Token};
use tokio::sync::OnceCell;

/// Lazily loaded default-chain SDK configuration
#[derive(Debug, Default)]
pub(crate) struct SharedConfig {
    inner: OnceCell<aws_config::SdkConfig>,
}

impl SharedConfig {
    pub(crate) async fn get(&self) -> &aws_config::SdkConfig {
        self.inner
            .get_or_init(|| async {
                tracing::debug!("loading AWS configuration from the default chain");
                aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await
            })
            .await
    }
}

/// Classify an SDK failure.
///
/// Service errors the backend tagged with an error code, and every transport
/// failure, count as retrieval failures. A service error without a code is
/// left unclassified.
pub(crate) fn sdk_error<E, R>(token: &Token, err: &SdkError<E, R>) -> SecretError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::ServiceError(_) if err.code().is_none() => SecretError::ServiceCallFailed {
            token: token.full_token().to_string(),
            message,
        },
        _ => SecretError::RetrieveFailed {
            token: token.full_token().to_string(),
            message,
        },
    }
}
