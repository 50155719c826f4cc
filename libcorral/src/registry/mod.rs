//! High-level access to Registry HTTP API V2 endpoints.
//!
//! [`RegistryService`] ties the other modules together: it parses image
//! names, looks up the per-registry configuration, resolves authorization
//! headers through the configured strategy, obtains a memoized HTTP client,
//! and issues the manifest, blob, tag-list, and catalog requests.

use crate::auth::AuthorizerRegistry;
use crate::client::{HttpClientFactory, RegistryClient, ensure_success, read_json};
use crate::config::{
    DOCKER_MANIFEST_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE, RegistryConfiguration,
    RegistryConfigurationStore, RegistryProperties,
};
use crate::error::{CorralError, Result};
use crate::reference::ImageReference;
use crate::reference::parser::ImageReferenceParser;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};


#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

/// Everything needed to issue authenticated requests against one registry:
/// its configuration, the resolved authorization headers, and the transport
/// client matching its TLS and proxy settings.
#[derive(Debug)]
pub struct RegistryRequestContext {
    config: RegistryConfiguration,
    auth_headers: HeaderMap,
    client: Arc<RegistryClient>,
}

impl RegistryRequestContext {
    /// The configuration of the target registry.
    pub fn configuration(&self) -> &RegistryConfiguration {
        &self.config
    }

    /// The authorization headers resolved for this request.
    pub fn auth_headers(&self) -> &HeaderMap {
        &self.auth_headers
    }

    /// The transport client bound to this registry's settings.
    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }
}

/// Facade over image-name resolution, authorization, and the Registry HTTP
/// API V2 read endpoints.
#[derive(Debug)]
pub struct RegistryService {
    client_factory: Arc<HttpClientFactory>,
    parser: ImageReferenceParser,
    store: RegistryConfigurationStore,
    authorizers: AuthorizerRegistry,
}

impl RegistryService {
    /// Builds a service from caller-supplied properties.
    pub fn new(properties: &RegistryProperties) -> Self {
        let client_factory = Arc::new(HttpClientFactory::new(properties.http_proxy.clone()));
        let authorizers = AuthorizerRegistry::with_defaults(Arc::clone(&client_factory));
        Self {
            client_factory,
            parser: ImageReferenceParser::new(
                &properties.default_registry_host,
                &properties.default_tag,
                &properties.official_namespace,
            ),
            store: RegistryConfigurationStore::from_properties(properties),
            authorizers,
        }
    }

    /// The configuration store, for merging secret-derived entries after
    /// construction.
    pub fn configuration_store_mut(&mut self) -> &mut RegistryConfigurationStore {
        &mut self.store
    }

    /// Parses and validates an image name into a fully-qualified reference.
    pub fn resolve(&self, image_name: &str) -> Result<ImageReference> {
        self.parser.parse(image_name)
    }

    /// Builds a request context for `repository` on the registry named by
    /// `registry_host`.
    pub async fn request_context(
        &self,
        registry_host: &str,
        repository: &str,
    ) -> Result<RegistryRequestContext> {
        let config = self.store.get(registry_host)?.clone();
        let auth_headers = self.authorizers.authorize(repository, &config).await?;
        let client = self.client_factory.get_client(
            config.disable_ssl_verification,
            config.use_http_proxy,
            &config.extra,
        )?;
        Ok(RegistryRequestContext {
            config,
            auth_headers,
            client,
        })
    }

    /// Fetches the manifest for an image name, returned as the raw JSON
    /// document the registry served.
    ///
    /// The configured manifest media type is sent as the `Accept` header;
    /// only the Docker v2 and OCI manifest types are supported.
    pub async fn get_manifest(&self, image_name: &str) -> Result<serde_json::Value> {
        let image = self.resolve(image_name)?;
        let context = self
            .request_context(&image.registry_host(), &image.repository())
            .await?;

        let media_type = context.config.manifest_media_type_or_default();
        if media_type != DOCKER_MANIFEST_MEDIA_TYPE && media_type != OCI_MANIFEST_MEDIA_TYPE {
            return Err(CorralError::unsupported_manifest_media_type(media_type));
        }

        let url = format!(
            "{}/v2/{}/manifests/{}",
            context.config.api_base_url(),
            image.repository(),
            image.reference()
        );
        debug!(image = %image, %url, "fetching manifest");

        let mut headers = context.auth_headers.clone();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(media_type).map_err(|e| {
                CorralError::transport_with_source("invalid manifest media type", e)
            })?,
        );

        let response = context.client.get(&url, headers).await?;
        read_json(ensure_success(response).await?).await
    }

    /// Fetches a blob by digest, such as an image configuration referenced
    /// from a manifest.
    ///
    /// A registry answer other than success is logged and reported as
    /// `None` rather than an error, so a missing layer does not abort
    /// callers iterating over many images.
    pub async fn get_blob(
        &self,
        registry_host: &str,
        repository: &str,
        digest: &str,
    ) -> Result<Option<Vec<u8>>> {
        let context = self.request_context(registry_host, repository).await?;
        let url = format!(
            "{}/v2/{repository}/blobs/{digest}",
            context.config.api_base_url()
        );
        debug!(%url, "fetching blob");

        let response = context.client.get(&url, context.auth_headers.clone()).await?;
        if !response.status().is_success() {
            warn!(%registry_host, %repository, %digest, status = %response.status(),
                "registry did not serve the requested blob");
            return Ok(None);
        }

        let bytes = response.bytes().await.map_err(|e| {
            CorralError::transport_with_source(format!("failed to read blob {digest}"), e)
        })?;
        Ok(Some(bytes.to_vec()))
    }

    /// Lists the tags of a repository. Repositories without tags yield an
    /// empty list.
    pub async fn get_tags(&self, registry_host: &str, repository: &str) -> Result<Vec<String>> {
        let context = self.request_context(registry_host, repository).await?;
        let url = format!(
            "{}/v2/{repository}/tags/list",
            context.config.api_base_url()
        );
        debug!(%url, "listing tags");

        let response = context.client.get(&url, context.auth_headers.clone()).await?;
        let parsed: TagsResponse = read_json(ensure_success(response).await?).await?;
        Ok(parsed.tags.unwrap_or_default())
    }

    /// Lists the repositories the registry exposes through its catalog
    /// endpoint.
    ///
    /// Authorization is resolved against the registry itself rather than
    /// a specific repository.
    pub async fn get_repositories(&self, registry_host: &str) -> Result<Vec<String>> {
        let context = self.request_context(registry_host, registry_host).await?;
        let url = format!("{}/v2/_catalog", context.config.api_base_url());
        debug!(%url, "listing repositories");

        let response = context.client.get(&url, context.auth_headers.clone()).await?;
        let parsed: CatalogResponse = read_json(ensure_success(response).await?).await?;
        Ok(parsed.repositories)
    }
}
