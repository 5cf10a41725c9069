//! `HashiCorp` Vault store for configmanager
//!
//! [`VaultFactory`] resolves `VAULT` tokens against a KV v2 mount. The server
//! comes from `VAULT_ADDR`; `VAULT_TOKEN` is either a client token or a value
//! starting with `aws_iam`, which switches to AWS IAM login with the role
//! named in the token's `iam_role` metadata.

pub mod iam;
pub mod secrets;

pub use secrets::{VaultFactory, VaultMetadata, VaultSettings, VaultStore, mount_and_path};
