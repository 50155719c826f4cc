//! Amazon ECR authorizer.
//!
//! ECR does not speak the Docker token protocol. Instead, a
//! `GetAuthorizationToken` call against the regional ECR API returns a
//! base64 token of the form `AWS:<password>` that is valid for twelve hours
//! and is presented to the registry as a `Basic` Authorization header. The
//! API call itself is signed with AWS Signature Version 4 using the access
//! key and secret key from the registry configuration.

use super::RegistryAuthorizer;
use crate::client::HttpClientFactory;
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{CorralError, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST, HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "ecr_tests.rs"]
mod tests;

/// Extra-parameters key naming the AWS region of the registry. Required.
pub const REGION_KEY: &str = "region";

/// Extra-parameters key naming the AWS account IDs to request tokens for.
/// Optional; comma-separated when more than one.
pub const REGISTRY_IDS_KEY: &str = "registryIds";

/// Extra-parameters key overriding the regional ECR API endpoint, for
/// private VPC endpoints.
pub const ECR_AUTH_ENDPOINT_KEY: &str = "ecrAuthEndpoint";

const SERVICE: &str = "ecr";
const TARGET: &str = "AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken";
const AMZ_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationTokenResponse {
    #[serde(default)]
    authorization_data: Vec<AuthorizationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationData {
    authorization_token: String,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// The request pieces that feed the Signature Version 4 computation.
#[derive(Debug)]
struct SigningInput<'a> {
    host: &'a str,
    body: &'a str,
    amz_date: String,
    date_stamp: String,
}

impl<'a> SigningInput<'a> {
    fn new(host: &'a str, body: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            host,
            body,
            amz_date: now.format("%Y%m%dT%H%M%SZ").to_string(),
            date_stamp: now.format("%Y%m%d").to_string(),
        }
    }

    /// Canonical request for a POST to the service root with the three
    /// signed headers `content-type`, `host`, and `x-amz-date` plus
    /// `x-amz-target`.
    fn canonical_request(&self) -> String {
        format!(
            "POST\n/\n\ncontent-type:{AMZ_CONTENT_TYPE}\nhost:{}\nx-amz-date:{}\nx-amz-target:{TARGET}\n\n{}\n{}",
            self.host,
            self.amz_date,
            self.signed_headers(),
            sha256_hex(self.body.as_bytes())
        )
    }

    fn signed_headers(&self) -> &'static str {
        "content-type;host;x-amz-date;x-amz-target"
    }

    fn credential_scope(&self, region: &str) -> String {
        format!("{}/{region}/{SERVICE}/aws4_request", self.date_stamp)
    }

    fn string_to_sign(&self, region: &str) -> String {
        format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            self.amz_date,
            self.credential_scope(region),
            sha256_hex(self.canonical_request().as_bytes())
        )
    }

    fn signature(&self, secret_key: &str, region: &str) -> String {
        let k_date = hmac_sha256(
            format!("AWS4{secret_key}").as_bytes(),
            self.date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        hex::encode(hmac_sha256(
            &k_signing,
            self.string_to_sign(region).as_bytes(),
        ))
    }

    fn authorization_header(&self, access_key: &str, secret_key: &str, region: &str) -> String {
        format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{}, SignedHeaders={}, Signature={}",
            self.credential_scope(region),
            self.signed_headers(),
            self.signature(secret_key, region)
        )
    }
}

fn request_body(config: &RegistryConfiguration) -> String {
    match config.extra.get(REGISTRY_IDS_KEY) {
        Some(ids) if !ids.is_empty() => {
            let quoted: Vec<String> = ids
                .split(',')
                .map(|id| format!("\"{}\"", id.trim()))
                .collect();
            format!("{{\"registryIds\":[{}]}}", quoted.join(","))
        }
        _ => "{}".to_string(),
    }
}

/// Authorizer exchanging AWS credentials for an ECR registry token.
#[derive(Debug)]
pub struct AwsEcrRegistryAuthorizer {
    client_factory: Arc<HttpClientFactory>,
}

impl AwsEcrRegistryAuthorizer {
    pub fn new(client_factory: Arc<HttpClientFactory>) -> Self {
        Self { client_factory }
    }
}

#[async_trait]
impl RegistryAuthorizer for AwsEcrRegistryAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::AwsEcr
    }

    async fn authorize(
        &self,
        _repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<HeaderMap> {
        let region = config
            .extra
            .get(REGION_KEY)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                CorralError::authorization(
                    config.registry_host.clone(),
                    "AWS ECR authorization requires a region extra parameter",
                )
            })?;
        let (Some(access_key), Some(secret_key)) =
            (config.user.as_deref(), config.secret.as_deref())
        else {
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                "AWS ECR authorization requires the access key as user and the secret key as secret",
            ));
        };

        let api_host = format!("api.ecr.{region}.amazonaws.com");
        let body = request_body(config);
        let signing = SigningInput::new(&api_host, &body, Utc::now());

        let mut request_headers = HeaderMap::new();
        request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_CONTENT_TYPE));
        request_headers.insert(
            HOST,
            HeaderValue::from_str(&api_host)
                .map_err(|e| CorralError::transport_with_source("invalid ECR API host", e))?,
        );
        request_headers.insert(
            "x-amz-date",
            HeaderValue::from_str(&signing.amz_date)
                .map_err(|e| CorralError::transport_with_source("invalid request date", e))?,
        );
        request_headers.insert("x-amz-target", HeaderValue::from_static(TARGET));
        request_headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&signing.authorization_header(access_key, secret_key, region))
                .map_err(|e| CorralError::transport_with_source("invalid signature header", e))?,
        );

        let client = self.client_factory.get_client(
            config.disable_ssl_verification,
            config.use_http_proxy,
            &config.extra,
        )?;
        let endpoint = config
            .extra
            .get(ECR_AUTH_ENDPOINT_KEY)
            .cloned()
            .unwrap_or_else(|| format!("https://{api_host}/"));

        let response = client
            .execute_with_body(Method::POST, &endpoint, request_headers, body.into_bytes())
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                format!("ECR GetAuthorizationToken answered {status}: {detail}"),
            ));
        }

        let parsed: AuthorizationTokenResponse = crate::client::read_json(response).await?;
        let token = parsed
            .authorization_data
            .into_iter()
            .next()
            .map(|data| data.authorization_token)
            .ok_or_else(|| {
                CorralError::authorization(
                    config.registry_host.clone(),
                    "ECR response carried no authorization data",
                )
            })?;

        // The token decodes to `AWS:<password>`; validate the shape before
        // presenting it verbatim as Basic credentials.
        let decoded = general_purpose::STANDARD.decode(&token).map_err(|e| {
            CorralError::authorization_with_source(
                config.registry_host.clone(),
                "ECR authorization token is not valid base64",
                e,
            )
        })?;
        if !decoded.starts_with(b"AWS:") {
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                "ECR authorization token does not carry AWS credentials",
            ));
        }
        debug!(registry_host = %config.registry_host, %region, "obtained ECR authorization token");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).map_err(|e| {
                CorralError::authorization_with_source(
                    config.registry_host.clone(),
                    "ECR authorization token is unusable as a header value",
                    e,
                )
            })?,
        );
        Ok(headers)
    }
}
