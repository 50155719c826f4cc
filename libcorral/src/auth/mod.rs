//! Authorization strategies for container registries.
//!
//! Each supported [`AuthorizationType`] has a [`RegistryAuthorizer`]
//! implementation that turns a registry configuration into the HTTP headers
//! a request to that registry must carry: nothing for anonymous access,
//! a Basic header for credential-protected registries, a Bearer token
//! obtained through the Docker OAuth2 token flow, or a Basic header minted
//! from an Amazon ECR authorization token.
//!
//! [`AuthorizerRegistry`] holds one authorizer per type and dispatches on
//! the type named by the configuration.

use crate::client::HttpClientFactory;
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{CorralError, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;

pub mod ecr;
pub mod oauth2;

#[cfg(test)]
mod tests;

/// Produces the authorization headers for requests to one kind of registry.
#[async_trait]
pub trait RegistryAuthorizer: Send + Sync {
    /// The configuration type this authorizer serves.
    fn authorization_type(&self) -> AuthorizationType;

    /// Resolves the headers to attach to requests for `repository` against
    /// the registry described by `config`.
    async fn authorize(
        &self,
        repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<HeaderMap>;
}

/// Builds a `Basic` Authorization header value from a username and secret.
pub(crate) fn basic_header_value(user: &str, secret: &str) -> Result<HeaderValue> {
    let encoded = general_purpose::STANDARD.encode(format!("{user}:{secret}"));
    HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|e| CorralError::transport_with_source("invalid Basic credentials", e))
}

/// Authorizer for registries that accept unauthenticated pulls.
#[derive(Debug, Default)]
pub struct AnonymousRegistryAuthorizer;

#[async_trait]
impl RegistryAuthorizer for AnonymousRegistryAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::Anonymous
    }

    async fn authorize(
        &self,
        _repository: &str,
        _config: &RegistryConfiguration,
    ) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }
}

/// Authorizer for registries protected by HTTP Basic authentication, such
/// as Harbor or a credential-protected private distribution instance.
#[derive(Debug, Default)]
pub struct BasicAuthRegistryAuthorizer;

#[async_trait]
impl RegistryAuthorizer for BasicAuthRegistryAuthorizer {
    fn authorization_type(&self) -> AuthorizationType {
        AuthorizationType::BasicAuth
    }

    async fn authorize(
        &self,
        _repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<HeaderMap> {
        let (Some(user), Some(secret)) = (config.user.as_deref(), config.secret.as_deref())
        else {
            return Err(CorralError::authorization(
                config.registry_host.clone(),
                "basic authentication requires both a user and a secret",
            ));
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, basic_header_value(user, secret)?);
        Ok(headers)
    }
}

/// Information parsed from a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme (e.g., "Bearer")
    pub scheme: String,

    /// The token endpoint to contact
    pub realm: String,

    /// The service identifier
    pub service: Option<String>,
}

impl AuthChallenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Example header:
    /// `Bearer realm="https://auth.docker.io/token",service="registry.docker.io"`
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();

        let (scheme, params) = header.split_once(' ').ok_or_else(|| {
            CorralError::transport(format!("malformed WWW-Authenticate header: {header}"))
        })?;

        let mut realm = None;
        let mut service = None;

        for param in params.split(',') {
            if let Some((key, value)) = param.trim().split_once('=') {
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "realm" => realm = Some(value.to_string()),
                    "service" => service = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        let realm = realm.ok_or_else(|| {
            CorralError::transport("WWW-Authenticate header missing the realm parameter")
        })?;

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service,
        })
    }
}

/// Dispatch table mapping each [`AuthorizationType`] to its authorizer.
pub struct AuthorizerRegistry {
    authorizers: HashMap<AuthorizationType, Box<dyn RegistryAuthorizer>>,
}

impl AuthorizerRegistry {
    /// Creates a registry holding the four built-in authorizers. The
    /// factory supplies the HTTP clients the token-exchanging authorizers
    /// use, so their transport honors the per-registry TLS and proxy
    /// settings.
    pub fn with_defaults(client_factory: Arc<HttpClientFactory>) -> Self {
        let mut registry = Self {
            authorizers: HashMap::new(),
        };
        registry.register(Box::new(AnonymousRegistryAuthorizer));
        registry.register(Box::new(BasicAuthRegistryAuthorizer));
        registry.register(Box::new(oauth2::DockerOAuth2RegistryAuthorizer::new(
            Arc::clone(&client_factory),
        )));
        registry.register(Box::new(ecr::AwsEcrRegistryAuthorizer::new(
            client_factory,
        )));
        registry
    }

    /// Adds or replaces the authorizer for its declared type.
    pub fn register(&mut self, authorizer: Box<dyn RegistryAuthorizer>) {
        self.authorizers
            .insert(authorizer.authorization_type(), authorizer);
    }

    /// Resolves the authorization headers for `repository` against the
    /// registry described by `config`. A configuration without an explicit
    /// authorization type is treated as anonymous.
    pub async fn authorize(
        &self,
        repository: &str,
        config: &RegistryConfiguration,
    ) -> Result<HeaderMap> {
        let authorization_type = config.authorization_type.unwrap_or_default();
        let authorizer = self.authorizers.get(&authorization_type).ok_or_else(|| {
            CorralError::unsupported_authorization_type(authorization_type.to_string())
        })?;
        authorizer.authorize(repository, config).await
    }
}

impl std::fmt::Debug for AuthorizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self
            .authorizers
            .keys()
            .map(|t| t.to_string())
            .collect();
        types.sort();
        f.debug_struct("AuthorizerRegistry")
            .field("authorization_types", &types)
            .finish()
    }
}
