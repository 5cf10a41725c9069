//! GCP store for configmanager
//!
//! [`GcpSecretsFactory`] resolves `GCPSECRETS` tokens against GCP Secret
//! Manager, either through the REST API with a service account key or through
//! the `gcloud` CLI.

pub mod secrets;

pub use secrets::{GcpMode, GcpSecretMetadata, GcpSecretsFactory, GcpSecretsStore, resource_name};
