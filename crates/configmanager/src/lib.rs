//! configmanager - resolve configuration and secret tokens from cloud stores
//!
//! Tokens such as `AWSSECRETS:///app/db|password` or
//! `AZKVSECRET://myvault/api-key[version=abc]` are fetched concurrently from
//! their backends and either returned as a map or substituted back into text.
//!
//! # Example
//!
//! ```ignore
//! use configmanager::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new(Config::default())?;
//! let rendered = manager
//!     .retrieve_replaced("DATABASE_URL=AWSSECRETS:///app/db|url")
//!     .await?;
//! ```
//!
//! Records round-trip through JSON with
//! [`ConfigManager::marshalled_into`], or are decoded from JSON/YAML bytes with
//! [`ConfigManager::unmarshal_from`], replacing any token-valued field.

/// CLI argument parsing and exit codes.
pub mod cli;
/// Subcommand execution.
pub mod commands;
/// Façade and CLI errors.
pub mod error;
/// Shell `export` rendering.
pub mod export;
mod manager;
/// Output destinations.
pub mod output;
mod stores;
/// Tracing and logging configuration.
pub mod tracing;

pub use configmanager_secrets::{
    Config, ErrorKind, ImplementationPrefix, ResolvedTokens, Resolver, SecretError, SecretStore,
    StoreFactory, StoreRegistry, Token, TokenFailure,
};
pub use error::{ConfigManagerError, Result};
pub use manager::{ConfigManager, InputFormat};
pub use stores::default_registry;
