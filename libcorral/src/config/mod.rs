//! Registry configuration model.
//!
//! Configuration is supplied at process start by the caller (properties
//! files, mounted secrets) and treated as read-only here. Each target
//! registry gets one [`RegistryConfiguration`] entry, keyed by its registry
//! host. Entries arriving from two sources for the same host are merged with
//! explicit-source values taking precedence.
//!
//! ```yaml
//! registry-configurations:
//!   myamazonaws:
//!     registry-host: 283191309520.dkr.ecr.us-west-1.amazonaws.com
//!     authorization-type: awsecr
//!     user: "[AWS access key]"
//!     secret: "[AWS secret key]"
//!     extra:
//!       region: us-west-1
//!       registryIds: "283191309520"
//!   harbor:
//!     registry-host: demo.goharbor.io
//!     authorization-type: dockeroauth2
//!     user: admin
//!     secret: Harbor12345
//! ```

use crate::error::{CorralError, Result};
use config::{Config as ConfigRs, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub mod secret;

#[cfg(test)]
mod tests;

/// Registry host used when an image name does not carry one.
pub const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

/// Tag applied when an image name carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Namespace prepended to bare official image names (`nginx` ->
/// `library/nginx`).
pub const DEFAULT_OFFICIAL_NAMESPACE: &str = "library";

/// Docker image manifest v2 media type (the default).
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image manifest v1 media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Registry authorization schemes supported by corral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationType {
    /// No authentication.
    #[default]
    Anonymous,

    /// HTTP Basic authentication. Used with Azure Container Registry or
    /// Artifactory/JFrog registries.
    BasicAuth,

    /// OAuth2 bearer-token authorization per the distribution spec. Used
    /// with Docker Hub or Harbor registries.
    #[serde(rename = "dockeroauth2")]
    DockerOAuth2,

    /// AWS ECR authorization. `user`/`secret` hold the AWS access/secret
    /// key pair and `extra` must carry the `region`.
    AwsEcr,
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::BasicAuth => "basicauth",
            Self::DockerOAuth2 => "dockeroauth2",
            Self::AwsEcr => "awsecr",
        };
        write!(f, "{}", name)
    }
}

/// Settings for one target container registry.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistryConfiguration {
    /// Registry host (and optional port). Unique per registry; the key that
    /// maps a container image to the registry storing it.
    pub registry_host: String,

    /// Credentials consumed by the authorizer selected through
    /// `authorization_type`.
    pub user: Option<String>,
    pub secret: Option<String>,

    /// Authorization scheme this registry supports. `None` means the entry
    /// never stated one; it resolves to anonymous at dispatch time.
    pub authorization_type: Option<AuthorizationType>,

    /// Image manifest media type to request. Docker v2 when unset.
    pub manifest_media_type: Option<String>,

    /// Skip TLS certificate verification. For self-signed test registries.
    pub disable_ssl_verification: bool,

    /// Route registry traffic through the globally configured HTTP proxy.
    pub use_http_proxy: bool,

    /// Registry-specific parameters consumed by the authorizer
    /// implementations and the redirect policy (e.g. `region` and
    /// `registryIds` for AWS, `registryAuthUri` for OAuth2, a
    /// `custom-registry` marker for credential stripping).
    pub extra: HashMap<String, String>,
}

// An explicitly set but empty scalar does not count as set for merging.
fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

impl RegistryConfiguration {
    /// The manifest media type to request, falling back to the Docker v2
    /// default.
    pub fn manifest_media_type_or_default(&self) -> &str {
        self.manifest_media_type
            .as_deref()
            .unwrap_or(DOCKER_MANIFEST_MEDIA_TYPE)
    }

    /// Base URL of the registry's V2 API, e.g. `https://demo.goharbor.io`.
    ///
    /// Plain HTTP is used only when the `insecure-http` extra parameter is
    /// set to `true`, for local registries without TLS.
    pub fn api_base_url(&self) -> String {
        let scheme = if self
            .extra
            .get(crate::client::INSECURE_HTTP_EXTRA_KEY)
            .is_some_and(|v| v == "true")
        {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}", self.registry_host)
    }

    /// Merges a secret-derived entry into this explicit entry.
    ///
    /// Explicit non-empty scalar fields win; the TLS and proxy booleans
    /// always come from the explicit entry; `extra` maps are unioned with
    /// explicit entries winning on key collision.
    pub fn merge_from_secret(&self, from_secret: &RegistryConfiguration) -> RegistryConfiguration {
        let mut extra = from_secret.extra.clone();
        extra.extend(self.extra.clone());

        RegistryConfiguration {
            registry_host: if self.registry_host.is_empty() {
                from_secret.registry_host.clone()
            } else {
                self.registry_host.clone()
            },
            user: non_empty(&self.user).or_else(|| from_secret.user.clone()),
            secret: non_empty(&self.secret).or_else(|| from_secret.secret.clone()),
            authorization_type: self.authorization_type.or(from_secret.authorization_type),
            manifest_media_type: non_empty(&self.manifest_media_type)
                .or_else(|| from_secret.manifest_media_type.clone()),
            disable_ssl_verification: self.disable_ssl_verification,
            use_http_proxy: self.use_http_proxy,
            extra,
        }
    }
}

// The secret field never appears in logs.
impl fmt::Debug for RegistryConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfiguration")
            .field("registry_host", &self.registry_host)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "****"))
            .field("authorization_type", &self.authorization_type)
            .field("manifest_media_type", &self.manifest_media_type)
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("use_http_proxy", &self.use_http_proxy)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Globally configured HTTP proxy, shared by all registries that opt in via
/// `use_http_proxy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpProxy {
    pub host: String,
    pub port: u16,
}

/// Root of the caller-supplied registry properties.
///
/// Loadable from YAML:
///
/// ```
/// use libcorral::config::RegistryProperties;
///
/// let yaml = r#"
/// default-registry-host: registry-1.docker.io
/// registry-configurations:
///   default:
///     registry-host: registry-1.docker.io
///     authorization-type: dockeroauth2
/// "#;
/// let properties = RegistryProperties::from_yaml_str(yaml).unwrap();
/// assert_eq!(properties.default_tag, "latest");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistryProperties {
    /// Registry host used when an image name has not specified one.
    pub default_registry_host: String,

    /// Tag used when an image name has not specified one.
    pub default_tag: String,

    /// Namespace used for official images without a namespace component.
    pub official_namespace: String,

    /// Optional global HTTP proxy.
    pub http_proxy: Option<HttpProxy>,

    /// Per-registry configuration entries, keyed by an arbitrary
    /// caller-chosen name.
    pub registry_configurations: HashMap<String, RegistryConfiguration>,
}

impl Default for RegistryProperties {
    fn default() -> Self {
        Self {
            default_registry_host: DOCKER_HUB_HOST.to_string(),
            default_tag: DEFAULT_TAG.to_string(),
            official_namespace: DEFAULT_OFFICIAL_NAMESPACE.to_string(),
            http_proxy: None,
            registry_configurations: HashMap::new(),
        }
    }
}

impl RegistryProperties {
    /// Parses properties from a YAML string, filling unset fields with
    /// defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = ConfigRs::builder()
            .add_source(
                ConfigRs::try_from(&RegistryProperties::default())
                    .map_err(|e| CorralError::config_with_source("Invalid default properties", e))?,
            )
            .add_source(File::from_str(s, FileFormat::Yaml));

        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| CorralError::config_with_source("Failed to deserialize registry properties", e))
    }
}

/// Read-only lookup of registry configurations by registry host.
///
/// Entries are keyed by `registry_host` regardless of the arbitrary names
/// used in the properties map.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigurationStore {
    configurations: HashMap<String, RegistryConfiguration>,
}

impl RegistryConfigurationStore {
    /// Builds a store from caller properties, re-keying entries by their
    /// registry host.
    pub fn from_properties(properties: &RegistryProperties) -> Self {
        let mut configurations = HashMap::new();
        for configuration in properties.registry_configurations.values() {
            configurations.insert(configuration.registry_host.clone(), configuration.clone());
        }
        Self { configurations }
    }

    /// Looks up the configuration for a registry host.
    pub fn get(&self, registry_host: &str) -> Result<&RegistryConfiguration> {
        self.configurations
            .get(registry_host)
            .ok_or_else(|| CorralError::registry_not_configured(registry_host))
    }

    /// Inserts or replaces a configuration, keyed by its registry host.
    pub fn insert(&mut self, configuration: RegistryConfiguration) {
        self.configurations
            .insert(configuration.registry_host.clone(), configuration);
    }

    /// Merges secret-derived entries into the store. Hosts present in both
    /// sources keep the explicit entry's values per the merge precedence;
    /// hosts only present in the secret source are added as-is.
    pub fn merge_secret_entries(&mut self, entries: HashMap<String, RegistryConfiguration>) {
        for (registry_host, from_secret) in entries {
            match self.configurations.get(&registry_host) {
                Some(explicit) => {
                    let merged = explicit.merge_from_secret(&from_secret);
                    self.configurations.insert(registry_host, merged);
                }
                None => {
                    self.configurations.insert(registry_host, from_secret);
                }
            }
        }
    }

    /// Number of configured registries.
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Whether the store holds no configurations.
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
