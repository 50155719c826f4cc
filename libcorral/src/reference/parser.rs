//! Heuristic image name parser.
//!
//! The Docker image name specification does not provide deterministic rules
//! to separate the registry host component from the rest of the repository
//! name. This parser reproduces the heuristic used by the Docker reference
//! implementation (distribution's `normalize.go`): the part before the first
//! slash is a registry host iff it contains a period or a colon, or equals
//! `localhost`. A namespace component containing a literal dot is therefore
//! misread as a hostname; that ambiguity is inherent to the upstream
//! behavior and preserved here for compatibility.

use crate::config::{DEFAULT_OFFICIAL_NAMESPACE, DEFAULT_TAG, DOCKER_HUB_HOST};
use crate::error::{CorralError, Result};
use crate::reference::ImageReference;

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;

const LOCALHOST_DOMAIN: &str = "localhost";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const PLAIN_DOCKER_IO_DOMAIN: &str = "docker.io";

/// Parses raw image names into validated [`ImageReference`] values.
///
/// The parser applies three configurable defaults: the registry host used
/// when the image name carries none, the tag used when neither tag nor
/// digest is given, and the official namespace prepended to bare Docker Hub
/// names (`nginx` becomes `library/nginx`).
///
/// # Examples
///
/// ```
/// use libcorral::reference::parser::ImageReferenceParser;
///
/// let parser = ImageReferenceParser::default();
/// let image = parser.parse("nginx")?;
/// assert_eq!(image.canonical_name(), "registry-1.docker.io/library/nginx:latest");
/// # Ok::<(), libcorral::error::CorralError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ImageReferenceParser {
    default_registry_host: String,
    default_tag: String,
    official_namespace: String,
}

impl Default for ImageReferenceParser {
    fn default() -> Self {
        Self::new(DOCKER_HUB_HOST, DEFAULT_TAG, DEFAULT_OFFICIAL_NAMESPACE)
    }
}

impl ImageReferenceParser {
    /// Creates a parser with explicit defaults.
    pub fn new(default_registry_host: &str, default_tag: &str, official_namespace: &str) -> Self {
        Self {
            default_registry_host: default_registry_host.to_string(),
            default_tag: default_tag.to_string(),
            official_namespace: official_namespace.to_string(),
        }
    }

    /// Parses `image_name` = `[registry-host[:port]/](namespace/)*name[:tag|@digest]`.
    ///
    /// Every field is validated as it is assigned; the first grammar
    /// violation aborts with an error naming the offending field and value.
    /// No network access occurs during parsing.
    pub fn parse(&self, image_name: &str) -> Result<ImageReference> {
        let (registry_host, remainder) = self.split_registry_host(image_name);

        let mut builder = ImageReference::builder();

        // Registry host: hostname with optional port.
        let host_and_port: Vec<&str> = registry_host.split(':').collect();
        if host_and_port.is_empty() || host_and_port.len() > 2 {
            return Err(CorralError::invalid_reference(
                "registry host",
                registry_host,
            ));
        }
        builder = builder.hostname(host_and_port[0])?;
        if host_and_port.len() == 2 {
            builder = builder.port(host_and_port[1])?;
        }

        let path_components: Vec<&str> = remainder.split('/').collect();

        // Last path component holds the repository name and reference. The
        // digest separator is checked first: a digest value itself contains
        // a colon.
        let name_and_reference = path_components[path_components.len() - 1];
        if name_and_reference.contains('@') {
            let parts: Vec<&str> = name_and_reference.split('@').collect();
            if parts.len() != 2 {
                return Err(CorralError::invalid_reference(
                    "repository name",
                    name_and_reference,
                ));
            }
            builder = builder.repository_name(parts[0])?.digest(parts[1])?;
        } else {
            let parts: Vec<&str> = name_and_reference.split(':').collect();
            if parts.is_empty() || parts.len() > 2 {
                return Err(CorralError::invalid_reference(
                    "repository name",
                    name_and_reference,
                ));
            }
            builder = builder.repository_name(parts[0])?;
            let tag = if parts.len() == 2 {
                parts[1]
            } else {
                &self.default_tag
            };
            builder = builder.tag(tag)?;
        }

        // All preceding components form the namespace.
        if path_components.len() >= 2 {
            builder =
                builder.namespace_components(&path_components[..path_components.len() - 1])?;
        }

        builder.build()
    }

    /// Splits the image name into `(registry_host, remainder)` using the
    /// Docker host-detection heuristic, canonicalizes the legacy hub aliases
    /// and prepends the official namespace to bare hub names.
    fn split_registry_host<'a>(&self, image_name: &'a str) -> (String, String) {
        let (mut registry_host, remainder) = match image_name.split_once('/') {
            Some((prefix, rest))
                if prefix.contains('.') || prefix.contains(':') || prefix == LOCALHOST_DOMAIN =>
            {
                (prefix.to_string(), rest.to_string())
            }
            // No registry host detected, use the default host and keep the
            // name intact.
            _ => (self.default_registry_host.clone(), image_name.to_string()),
        };

        // 'index.docker.io' and 'docker.io' are aliases of the actual
        // registry host.
        if registry_host == LEGACY_DEFAULT_DOMAIN || registry_host == PLAIN_DOCKER_IO_DOMAIN {
            registry_host = self.default_registry_host.clone();
        }

        let remainder = if registry_host == self.default_registry_host && !remainder.contains('/') {
            format!("{}/{}", self.official_namespace, remainder)
        } else {
            remainder
        };

        (registry_host, remainder)
    }
}
