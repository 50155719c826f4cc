//! HTTP transport for registry communication.
//!
//! Clients are built on reqwest and memoized per `(skip TLS verification,
//! use proxy, extra parameters)` combination, so each distinct registry
//! transport configuration is constructed exactly once per process.
//!
//! Redirects are followed manually: several registries back their blob
//! storage with Amazon S3 or Azure Blob, which reject requests carrying both
//! a pre-signed URL and an `Authorization` header, and others redirect pulls
//! to storage domains that must not receive the registry's own credentials.
//! The [`should_strip_authorization`] policy decides, per redirect hop,
//! whether the `Authorization` header is dropped before following.

use crate::config::HttpProxy;
use crate::error::{CorralError, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, LOCATION};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Extra-parameters key naming a host fragment that identifies a custom
/// registry whose redirect targets must not receive credentials.
pub const CUSTOM_REGISTRY_EXTRA_KEY: &str = "custom-registry";

/// Per-registry marker switching the facade to plain HTTP, for local or
/// test registries that do not terminate TLS.
pub const INSECURE_HTTP_EXTRA_KEY: &str = "insecure-http";

/// Query-string marker of an AWS pre-signed URL.
const AMZ_CREDENTIAL_MARKER: &str = "X-Amz-Credential";

/// Host suffix of Azure Container Registry blob domains.
const AZURECR_HOST_SUFFIX: &str = "azurecr.io";

const MAX_REDIRECTS: usize = 10;

/// Decides whether the `Authorization` header must be dropped when a
/// request is redirected to `target`.
///
/// Applies only to GET and HEAD requests. The header is dropped when the
/// target URL carries an AWS pre-signed-credential query marker, when the
/// target is an Azure Container Registry blob domain and the request holds
/// Basic credentials (bearer tokens pass through), or when the target host
/// matches the configured custom-registry marker.
pub fn should_strip_authorization(
    method: &Method,
    target: &Url,
    headers: &HeaderMap,
    extra: &HashMap<String, String>,
) -> bool {
    if *method != Method::GET && *method != Method::HEAD {
        return false;
    }

    // Amazon rejects requests that present both a pre-signed URL and an
    // Authorization header.
    if target
        .query()
        .is_some_and(|query| query.contains(AMZ_CREDENTIAL_MARKER))
    {
        return true;
    }

    let target_host = target.host_str().unwrap_or_default();

    if target_host.ends_with(AZURECR_HOST_SUFFIX) {
        let carries_basic = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("Basic"));
        if carries_basic {
            return true;
        }
    }

    if let Some(marker) = extra.get(CUSTOM_REGISTRY_EXTRA_KEY)
        && !marker.is_empty()
        && target_host.contains(marker.as_str())
    {
        return true;
    }

    false
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Transport client bound to one `(skip_ssl, use_proxy, extra)` combination.
///
/// Wraps a reqwest client with automatic redirects disabled; redirects are
/// followed here so the credential-stripping policy can rewrite headers
/// between hops.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    extra: HashMap<String, String>,
}

impl RegistryClient {
    /// Executes a request, following up to ten redirects and applying the
    /// credential-stripping policy at each hop.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Response> {
        self.send(method, url, headers, None).await
    }

    /// Like [`execute`](Self::execute), carrying a request body.
    pub async fn execute_with_body(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<Response> {
        self.send(method, url, headers, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut current = Url::parse(url)
            .map_err(|e| CorralError::transport_with_source(format!("invalid URL: {url}"), e))?;
        let mut headers = headers;

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self
                .http
                .request(method.clone(), current.clone())
                .headers(headers.clone());
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            let response = request
                .send()
                .await
                .map_err(|e| {
                    CorralError::transport_with_source(
                        format!("request to {current} failed"),
                        e,
                    )
                })?;

            if !is_redirect(response.status()) {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    CorralError::transport(format!(
                        "redirect from {current} without a Location header"
                    ))
                })?;
            let next = current.join(location).map_err(|e| {
                CorralError::transport_with_source(
                    format!("invalid redirect target: {location}"),
                    e,
                )
            })?;

            if should_strip_authorization(&method, &next, &headers, &self.extra) {
                debug!(target_host = next.host_str().unwrap_or_default(),
                    "dropping Authorization header before following redirect");
                headers.remove(AUTHORIZATION);
            }
            current = next;
        }

        Err(CorralError::transport(format!(
            "too many redirects while requesting {url}"
        )))
    }

    /// Convenience GET wrapper over [`execute`](Self::execute).
    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        self.execute(Method::GET, url, headers).await
    }
}

/// Reads a response body and decodes it as JSON regardless of the declared
/// `Content-Type`. Registries routinely mislabel JSON bodies, so decoding
/// goes by content rather than by header.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().clone();
    let bytes = response.bytes().await.map_err(|e| {
        CorralError::transport_with_source(format!("failed to read body from {url}"), e)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        CorralError::transport_with_source(format!("invalid JSON body from {url}"), e)
    })
}

/// Maps a non-success status to the appropriate error, reading the body for
/// context. 401 and 403 become authorization failures; everything else is a
/// transport failure.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let host = url.host_str().unwrap_or_default().to_string();
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CorralError::authorization(
            host,
            format!("registry rejected request to {url} with {status}{detail}"),
        )),
        _ => Err(CorralError::transport(format!(
            "registry request to {url} failed with {status}{detail}"
        ))),
    }
}

/// Memoization key: the full transport-relevant configuration of a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    skip_ssl_verification: bool,
    use_http_proxy: bool,
    extra: BTreeMap<String, String>,
}

/// Builds and memoizes [`RegistryClient`]s.
///
/// Two registries whose transport configuration coincides share the same
/// client and therefore the same connection pool.
#[derive(Debug)]
pub struct HttpClientFactory {
    http_proxy: Option<HttpProxy>,
    cache: Mutex<HashMap<ClientKey, Arc<RegistryClient>>>,
}

impl HttpClientFactory {
    /// Creates a factory. The proxy settings apply only to clients requested
    /// with `use_http_proxy` set.
    pub fn new(http_proxy: Option<HttpProxy>) -> Self {
        Self {
            http_proxy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client for the given transport configuration, building it
    /// on first use. Construction happens under the cache lock so concurrent
    /// callers with the same key observe a single build.
    pub fn get_client(
        &self,
        skip_ssl_verification: bool,
        use_http_proxy: bool,
        extra: &HashMap<String, String>,
    ) -> Result<Arc<RegistryClient>> {
        let key = ClientKey {
            skip_ssl_verification,
            use_http_proxy,
            extra: extra.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = cache.get(&key) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(self.build_client(&key, extra)?);
        cache.insert(key, Arc::clone(&client));
        Ok(client)
    }

    fn build_client(
        &self,
        key: &ClientKey,
        extra: &HashMap<String, String>,
    ) -> Result<RegistryClient> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if key.skip_ssl_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if key.use_http_proxy {
            let proxy = self.http_proxy.as_ref().ok_or_else(|| {
                CorralError::config(
                    "registry requests an HTTP proxy but no proxy host and port are configured",
                )
            })?;
            let proxy_url = format!("http://{}:{}", proxy.host, proxy.port);
            builder = builder.proxy(reqwest::Proxy::all(&proxy_url).map_err(|e| {
                CorralError::config_with_source(format!("invalid proxy URL: {proxy_url}"), e)
            })?);
        }

        let http = builder.build().map_err(|e| {
            CorralError::transport_with_source("failed to build HTTP client", e)
        })?;

        debug!(
            skip_ssl_verification = key.skip_ssl_verification,
            use_http_proxy = key.use_http_proxy,
            "built registry HTTP client"
        );
        Ok(RegistryClient {
            http,
            extra: extra.clone(),
        })
    }
}
