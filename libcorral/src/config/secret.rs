//! Kubernetes `.dockerconfigjson` secret conversion.
//!
//! Converts the payload of a `kubernetes.io/dockerconfigjson` secret into
//! [`RegistryConfiguration`] entries so that registries declared only
//! through mounted image-pull secrets become usable without explicit
//! properties. The payload has the shape:
//!
//! ```json
//! {"auths": {"registry.example.com": {"username": "...", "password": "...", "auth": "..."}}}
//! ```
//!
//! The `auth` field, when present, is the base64 of `user:password` and is
//! used as the fallback when the explicit fields are absent.

use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{CorralError, Result};
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;

/// Docker Hub auth server address used in docker config files.
const HTTPS_INDEX_DOCKER_IO_V1: &str = "https://index.docker.io/v1/";

const PLAIN_DOCKER_IO_DOMAIN: &str = "docker.io";

#[derive(Debug, Deserialize)]
struct DockerConfigJson {
    auths: HashMap<String, DockerConfigAuth>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigAuth {
    username: Option<String>,
    password: Option<String>,
    auth: Option<String>,
}

/// Parses a `.dockerconfigjson` payload into configuration entries keyed by
/// registry host.
///
/// Docker Hub aliases (`https://index.docker.io/v1/`, `docker.io`) are
/// canonicalized to `default_registry_host` and converted as OAuth2
/// registries; all other hosts default to basic authentication. The caller
/// merges the result into its explicit configuration with
/// [`super::RegistryConfigurationStore::merge_secret_entries`].
pub fn from_docker_config_json(
    payload: &str,
    default_registry_host: &str,
) -> Result<HashMap<String, RegistryConfiguration>> {
    let parsed: DockerConfigJson = serde_json::from_str(payload)
        .map_err(|e| CorralError::config_with_source("Invalid dockerconfigjson payload", e))?;

    let mut entries = HashMap::new();
    for (host, auth) in parsed.auths {
        let registry_host = canonicalize_registry_host(&host, default_registry_host);

        let (user, secret) = match (&auth.username, &auth.password) {
            (Some(user), Some(password)) => (Some(user.clone()), Some(password.clone())),
            _ => decode_auth_field(&host, auth.auth.as_deref())?,
        };

        // The original decides between basic and oauth2 by probing each
        // host's token service at startup; here only the hub default is
        // known to require the bearer flow.
        let authorization_type = if registry_host == default_registry_host {
            AuthorizationType::DockerOAuth2
        } else {
            AuthorizationType::BasicAuth
        };

        debug!(%registry_host, %authorization_type, "converted dockerconfigjson entry");

        entries.insert(
            registry_host.clone(),
            RegistryConfiguration {
                registry_host,
                user,
                secret,
                authorization_type: Some(authorization_type),
                ..RegistryConfiguration::default()
            },
        );
    }
    Ok(entries)
}

/// Strips the URL scheme and path from a docker config host entry and
/// replaces the Docker Hub aliases with the actual registry host.
fn canonicalize_registry_host(host: &str, default_registry_host: &str) -> String {
    if host == HTTPS_INDEX_DOCKER_IO_V1 {
        return default_registry_host.to_string();
    }
    let host = host
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host);
    if host == PLAIN_DOCKER_IO_DOMAIN {
        return default_registry_host.to_string();
    }
    host.to_string()
}

/// Decodes the base64 `auth` field into a `(user, secret)` pair.
fn decode_auth_field(
    host: &str,
    auth: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let Some(auth) = auth else {
        return Ok((None, None));
    };
    let decoded = general_purpose::STANDARD
        .decode(auth)
        .map_err(|e| CorralError::config_with_source(format!("Invalid auth field for '{}'", host), e))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| CorralError::config_with_source(format!("Invalid auth field for '{}'", host), e))?;
    match decoded.split_once(':') {
        Some((user, password)) => Ok((Some(user.to_string()), Some(password.to_string()))),
        None => Err(CorralError::config(format!(
            "Auth field for '{}' is not of the form user:password",
            host
        ))),
    }
}
