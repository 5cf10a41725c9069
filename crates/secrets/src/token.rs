//! Token grammar
//!
//! A token has the shape `PREFIX<tokenSep>store/path[meta=data]<keySep>key.path`
//! where the metadata block and the key path are both optional and the
//! metadata may sit anywhere after the prefix.

use crate::{Config, SecretError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The closed set of prefixes, one per backend store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImplementationPrefix {
    /// AWS Secrets Manager
    #[serde(rename = "AWSSECRETS")]
    AwsSecrets,
    /// AWS Systems Manager Parameter Store
    #[serde(rename = "AWSPARAMSTR")]
    AwsParamStore,
    /// Azure Key Vault secrets
    #[serde(rename = "AZKVSECRET")]
    AzKeyVault,
    /// Azure Table Storage entities
    #[serde(rename = "AZTABLESTORE")]
    AzTableStore,
    /// Azure App Configuration key-values
    #[serde(rename = "AZAPPCONF")]
    AzAppConfig,
    /// HashiCorp Vault KV v2
    #[serde(rename = "VAULT")]
    HashiVault,
    /// GCP Secret Manager
    #[serde(rename = "GCPSECRETS")]
    GcpSecrets,
}

impl ImplementationPrefix {
    /// Every known prefix
    pub const ALL: [Self; 7] = [
        Self::AwsSecrets,
        Self::AwsParamStore,
        Self::AzKeyVault,
        Self::AzTableStore,
        Self::AzAppConfig,
        Self::HashiVault,
        Self::GcpSecrets,
    ];

    /// The literal prefix as it appears in a token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwsSecrets => "AWSSECRETS",
            Self::AwsParamStore => "AWSPARAMSTR",
            Self::AzKeyVault => "AZKVSECRET",
            Self::AzTableStore => "AZTABLESTORE",
            Self::AzAppConfig => "AZAPPCONF",
            Self::HashiVault => "VAULT",
            Self::GcpSecrets => "GCPSECRETS",
        }
    }
}

impl fmt::Display for ImplementationPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImplementationPrefix {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|prefix| prefix.as_str() == s)
            .ok_or_else(|| SecretError::TokenInvalid {
                prefix: s.to_string(),
            })
    }
}

/// A parsed token. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    prefix: ImplementationPrefix,
    full_token: String,
    store_token: String,
    key_path: String,
    metadata_raw: String,
    token_separator: String,
    key_separator: String,
}

impl Token {
    /// Parse `raw` into a token.
    ///
    /// Returns `None` when `raw` does not start with a known prefix followed
    /// by the configured token separator; such strings are not tokens and are
    /// passed through untouched by substitution.
    #[must_use]
    pub fn parse(raw: &str, config: &Config) -> Option<Self> {
        let (prefix, remainder) = raw.split_once(config.token_separator())?;
        let prefix = prefix.parse::<ImplementationPrefix>().ok()?;

        let (metadata_raw, without_metadata) = split_metadata(remainder);
        let (store_token, key_path) = match without_metadata.split_once(config.key_separator()) {
            Some((store, key)) => (store.to_string(), key.to_string()),
            None => (without_metadata, String::new()),
        };

        Some(Self {
            prefix,
            full_token: raw.to_string(),
            store_token,
            key_path,
            metadata_raw,
            token_separator: config.token_separator().to_string(),
            key_separator: config.key_separator().to_string(),
        })
    }

    /// The backend this token addresses
    #[must_use]
    pub const fn prefix(&self) -> ImplementationPrefix {
        self.prefix
    }

    /// The original string; the identity of the token within a batch
    #[must_use]
    pub fn full_token(&self) -> &str {
        &self.full_token
    }

    /// Backend identifier with prefix, metadata and key path removed
    #[must_use]
    pub fn store_token(&self) -> &str {
        &self.store_token
    }

    /// Dotted key path for JSON descent, empty when absent
    #[must_use]
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Contents of the metadata brackets, empty when absent
    #[must_use]
    pub fn metadata_raw(&self) -> &str {
        &self.metadata_raw
    }

    /// Separator used when this token was parsed
    #[must_use]
    pub fn token_separator(&self) -> &str {
        &self.token_separator
    }

    /// Key separator used when this token was parsed
    #[must_use]
    pub fn key_separator(&self) -> &str {
        &self.key_separator
    }

    /// Decode the metadata into a store-specific record.
    ///
    /// Fields missing from the metadata keep their default; unknown keys are
    /// ignored. A record that cannot be built falls back to its default.
    #[must_use]
    pub fn metadata<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        if self.metadata_raw.is_empty() {
            return T::default();
        }
        serde_json::from_value(Value::Object(parse_metadata(&self.metadata_raw)))
            .unwrap_or_default()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_token)
    }
}

/// Split `key=value` pairs separated by `,` into a JSON object of strings.
///
/// Pieces without `=` are skipped. Later duplicates win.
#[must_use]
pub fn parse_metadata(raw: &str) -> Map<String, Value> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), Value::String(value.trim().to_string())))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Remove the first `[...]` span, returning its contents and the remainder.
///
/// Without a `]` following the first `[` nothing is removed.
fn split_metadata(s: &str) -> (String, String) {
    let Some(open) = s.find('[') else {
        return (String::new(), s.to_string());
    };
    let Some(close) = s[open..].find(']').map(|rel| open + rel) else {
        return (String::new(), s.to_string());
    };

    let metadata = s[open + 1..close].to_string();
    let mut rest = String::with_capacity(s.len() - (close + 1 - open));
    rest.push_str(&s[..open]);
    rest.push_str(&s[close + 1..]);
    (metadata, rest)
}
