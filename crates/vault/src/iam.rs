//! Vault AWS IAM login
//!
//! Vault's `aws` auth method verifies a signed `sts:GetCallerIdentity` request
//! that the client builds but never sends. The request is signed with the
//! credentials from the AWS default provider chain.

use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningParams, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::time::SystemTime;
use vaultrs::client::{Client, VaultClient};

const STS_URL: &str = "https://sts.amazonaws.com/";
const STS_HOST: &str = "sts.amazonaws.com";
const STS_REGION: &str = "us-east-1";
const STS_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const AUTH_MOUNT: &str = "aws";

/// Base64-encoded pieces of a signed STS request, as Vault expects them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamLoginRequest {
    /// Always `POST`
    pub method: &'static str,
    /// Base64 of the STS URL
    pub url: String,
    /// Base64 of a JSON object of header name to values
    pub headers: String,
    /// Base64 of the form body
    pub body: String,
}

/// Sign a `GetCallerIdentity` request with `credentials` at `time`.
///
/// # Errors
///
/// Returns a message if signing fails.
pub fn login_request(credentials: Credentials, time: SystemTime) -> Result<IamLoginRequest, String> {
    let identity: Identity = credentials.into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(STS_REGION)
        .name("sts")
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| format!("invalid signing parameters: {e}"))?
        .into();

    let base_headers = [
        ("host", STS_HOST),
        (
            "content-type",
            "application/x-www-form-urlencoded; charset=utf-8",
        ),
    ];
    let signable = SignableRequest::new(
        "POST",
        STS_URL,
        base_headers.iter().copied(),
        SignableBody::Bytes(STS_BODY.as_bytes()),
    )
    .map_err(|e| format!("unsignable request: {e}"))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| format!("signing failed: {e}"))?
        .into_parts();
    let (signed_headers, _query) = instructions.into_parts();

    let mut headers: BTreeMap<String, Vec<String>> = base_headers
        .iter()
        .map(|(name, value)| ((*name).to_string(), vec![(*value).to_string()]))
        .collect();
    for header in &signed_headers {
        headers
            .entry(header.name().to_string())
            .or_default()
            .push(header.value().to_string());
    }
    let headers_json =
        serde_json::to_string(&headers).map_err(|e| format!("header encoding failed: {e}"))?;

    Ok(IamLoginRequest {
        method: "POST",
        url: STANDARD.encode(STS_URL),
        headers: STANDARD.encode(headers_json),
        body: STANDARD.encode(STS_BODY),
    })
}

/// Log `client` in through the `aws` auth method as `role`.
///
/// # Errors
///
/// Returns a message if credentials are unavailable or Vault rejects the login.
pub async fn login(client: &mut VaultClient, role: &str) -> Result<(), String> {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    let provider = config
        .credentials_provider()
        .ok_or_else(|| "no AWS credentials provider configured".to_string())?;
    let credentials = provider
        .provide_credentials()
        .await
        .map_err(|e| format!("failed to load AWS credentials: {e}"))?;

    let request = login_request(credentials, SystemTime::now())?;
    tracing::debug!(role, "logging in to Vault with AWS IAM");
    let auth = vaultrs::auth::aws::iam_login(
        &*client,
        AUTH_MOUNT,
        request.method,
        &request.url,
        &request.headers,
        &request.body,
        Some(role),
    )
    .await
    .map_err(|e| format!("IAM login rejected: {e}"))?;

    client.set_token(&auth.client_token);
    Ok(())
}
