//! Docker OAuth2 token-exchange authorizer.
//!
//! Implements the Bearer token flow used by Docker Hub, Harbor, and other
//! distribution-based registries: obtain a short-lived pull token from the
//! registry's token service and present it as a `Bearer` Authorization
//! header. The token service endpoint is either configured directly through
//! the `registryAuthUri` extra parameter or discovered by probing the
//! registry's `/v2/` endpoint and parsing the `WWW-Authenticate` challenge
//! from its 401 response.

use super::{AuthChallenge, RegistryAuthorizer, basic_header_value};
use crate::client::HttpClientFactory;
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{CorralError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "oauth2_tests.rs"]
mod tests;

/// Extra-parameters key holding a fully-specified token service URI
/// template. A `{repository}` placeholder is replaced with the repository
/// path before the request.
pub const REGISTRY_AUTH_URI_KEY: &str = "registryAuthUri";

const REPOSITORY_PLACEHOLDER: &str = "{repository}";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}

/// Authorizer obtaining pull tokens from a Docker OAuth2 token service.
///
/// Tokens are short-lived and requested per call; no caching layer sits in
/// front of the token service.
#[derive(Debug)]
pub struct DockerOAuth2RegistryAuthorizer {
    client_factory: Arc<HttpClientFactory>,
}

impl DockerOAuth2RegistryAuthorizer {
    pub fn new(client_factory: Arc<HttpClientFactory>) -> Self {
        Self { client_factory }
    }

    /// Resolves the token service URI for `repository`, preferring the
    /// configured `registryAuthUri` template over challenge discovery.
    async fn token_service_uri(
        &self,
        repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<String> {
        if let Some(template) = config.extra.get(REGISTRY_AUTH_URI_KEY) {
            return Ok(template.replace(REPOSITORY_PLACEHOLDER, repository));
        }
        self.discover_token_service_uri(repository, config).await
    }

    /// Probes `/v2/` unauthenticated and derives the token endpoint from
    /// the `WWW-Authenticate` challenge of the expected 401 response.
    async fn discover_token_service_uri(
        &self,
        repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<String> {
        let client = self.client_factory.get_client(
            config.disable_ssl_verification,
            config.use_http_proxy,
            &config.extra,
        )?;

        let probe_url = format!("{}/v2/", config.api_base_url());
        let response = client.get(&probe_url, HeaderMap::new()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                format!(
                    "expected a 401 challenge from {probe_url}, got {}",
                    response.status()
                ),
            ));
        }

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                CorralError::authorization(
                    config.registry_host.clone(),
                    format!("401 from {probe_url} carried no WWW-Authenticate challenge"),
                )
            })?;

        let challenge = AuthChallenge::parse(header)?;
        if !challenge.scheme.eq_ignore_ascii_case("bearer") {
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                format!(
                    "registry challenged with unsupported scheme {}",
                    challenge.scheme
                ),
            ));
        }

        let mut uri = format!(
            "{}?scope=repository:{repository}:pull",
            challenge.realm
        );
        if let Some(service) = &challenge.service {
            uri.push_str("&service=");
            uri.push_str(service);
        }
        debug!(registry_host = %config.registry_host, token_service = %uri,
            "discovered token service endpoint");
        Ok(uri)
    }
}

#[async_trait]
impl RegistryAuthorizer for DockerOAuth2RegistryAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::DockerOAuth2
    }

    async fn authorize(
        &self,
        repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<HeaderMap> {
        let token_uri = self.token_service_uri(repository, config).await?;

        let client = self.client_factory.get_client(
            config.disable_ssl_verification,
            config.use_http_proxy,
            &config.extra,
        )?;

        // The token service itself takes Basic credentials when the
        // registry is not open to anonymous pulls.
        let mut request_headers = HeaderMap::new();
        if let (Some(user), Some(secret)) = (config.user.as_deref(), config.secret.as_deref()) {
            request_headers.insert(AUTHORIZATION, basic_header_value(user, secret)?);
        }

        let response = client.get(&token_uri, request_headers).await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                format!("token service at {token_uri} answered {status}"),
            ));
        }

        let token = crate::client::read_json::<TokenResponse>(response)
            .await?
            .into_token()
            .ok_or_else(|| {
                CorralError::authorization(
                    config.registry_host.clone(),
                    "token service response carried neither token nor access_token",
                )
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                CorralError::authorization_with_source(
                    config.registry_host.clone(),
                    "token service returned a token unusable as a header value",
                    e,
                )
            })?,
        );
        Ok(headers)
    }
}
