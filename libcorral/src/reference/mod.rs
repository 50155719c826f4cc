//! Container image reference model and validation grammar.
//!
//! An image name is made up of slash-separated name components, prefixed by a
//! registry hostname and optional port number. The name components define a
//! namespace followed by a repository name and a tag or digest:
//!
//! ```text
//! registry-hostname : port / repo-namespace / repo-name : tag|@digest
//! |      REGISTRY HOST     |           REPOSITORY       | TAG or DIGEST |
//! ```
//!
//! The registry host uniquely identifies the registry that stores the image
//! and is the lookup key for the registry configuration. A reference carries
//! exactly one of a tag or a digest, never both.

use crate::error::{CorralError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub mod parser;


// Grammar from the Docker image specification and the distribution
// reference code. The hostname must comply with DNS rules but may not
// contain underscores.
static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$")
        .expect("invalid hostname pattern")
});

static IP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])$")
        .expect("invalid ip pattern")
});

static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,4}|[1-5][0-9]{4}|6[0-4][0-9]{3}|65[0-4][0-9]{2}|655[0-2][0-9]|6553[0-5])$")
        .expect("invalid port pattern")
});

// A namespace path component must be lowercase alpha-numeric characters,
// optionally separated by periods, dashes or underscores.
static NAMESPACE_COMPONENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[._\-][a-z0-9]+)*$").expect("invalid namespace pattern"));

// The repository name needs to be unique in its namespace, can be two to 255
// characters, and can only contain lowercase letters, numbers, - and _.
static REPOSITORY_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9\-_]{2,255}$").expect("invalid repository name pattern"));

// A tag name must be valid ASCII, may not start with a period or a dash and
// may contain a maximum of 128 characters.
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9\-_.]{0,127}$").expect("invalid tag pattern"));

// algorithm ":" hex, with at least 32 hex digits.
static DIGEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[\-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
        .expect("invalid digest pattern")
});

/// Whether a reference points at a mutable tag or an immutable digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    Tag,
    Digest,
}

/// A validated, immutable container image reference.
///
/// Constructed through [`ImageReferenceBuilder`] (usually by
/// [`parser::ImageReferenceParser`]), which validates every field against the
/// reference grammar and enforces that exactly one of tag or digest is set.
///
/// # Examples
///
/// ```
/// use libcorral::reference::ImageReference;
///
/// let image = ImageReference::builder()
///     .hostname("myregistry.io")?
///     .port("5000")?
///     .namespace_components(&["team"])?
///     .repository_name("app")?
///     .tag("1.0")?
///     .build()?;
///
/// assert_eq!(image.registry_host(), "myregistry.io:5000");
/// assert_eq!(image.repository(), "team/app");
/// assert_eq!(image.canonical_name(), "myregistry.io:5000/team/app:1.0");
/// # Ok::<(), libcorral::error::CorralError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    hostname: String,
    port: Option<String>,
    namespace: Option<String>,
    repository_name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Returns a builder for assembling a validated reference.
    pub fn builder() -> ImageReferenceBuilder {
        ImageReferenceBuilder::default()
    }

    /// Registry hostname or IPv4 address where the image is stored.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Optional registry port.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Optional namespace (slash-joined path components).
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Repository name without the namespace.
    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    /// Tag, if this reference uses one.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Digest, if this reference uses one.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Full registry host address (`hostname[:port]`), the unique identifier
    /// of the registry hosting this image.
    pub fn registry_host(&self) -> String {
        match &self.port {
            Some(port) => format!("{}:{}", self.hostname, port),
            None => self.hostname.clone(),
        }
    }

    /// Full repository name (`[namespace/]repository-name`) without the tag
    /// or digest.
    pub fn repository(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.repository_name),
            None => self.repository_name.clone(),
        }
    }

    /// The tag or digest value this reference points at.
    pub fn reference(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or_default()
    }

    /// Whether this reference carries a tag or a digest.
    pub fn reference_type(&self) -> ReferenceType {
        if self.tag.is_some() {
            ReferenceType::Tag
        } else {
            ReferenceType::Digest
        }
    }

    /// Canonical form: `registry-host/repository(:tag|@digest)`.
    ///
    /// Parsing the canonical name yields an equal reference.
    pub fn canonical_name(&self) -> String {
        let separator = match self.reference_type() {
            ReferenceType::Tag => ":",
            ReferenceType::Digest => "@",
        };
        format!(
            "{}/{}{}{}",
            self.registry_host(),
            self.repository(),
            separator,
            self.reference()
        )
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

/// Builder that validates each field against the reference grammar as it is
/// assigned and commits them all at once.
///
/// Setting a tag when a digest is already present (or vice versa) fails
/// without mutating the builder.
#[derive(Debug, Default)]
pub struct ImageReferenceBuilder {
    hostname: Option<String>,
    port: Option<String>,
    namespace: Option<String>,
    repository_name: Option<String>,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReferenceBuilder {
    /// Sets the registry hostname (DNS name or IPv4 literal).
    pub fn hostname(mut self, hostname: &str) -> Result<Self> {
        if !HOSTNAME_PATTERN.is_match(hostname) && !IP_PATTERN.is_match(hostname) {
            return Err(CorralError::invalid_reference("hostname", hostname));
        }
        self.hostname = Some(hostname.to_string());
        Ok(self)
    }

    /// Sets the registry port.
    pub fn port(mut self, port: &str) -> Result<Self> {
        if !PORT_PATTERN.is_match(port) {
            return Err(CorralError::invalid_reference("port", port));
        }
        self.port = Some(port.to_string());
        Ok(self)
    }

    /// Sets the namespace from its individual path components, validating
    /// each one. An empty slice leaves the namespace unset.
    pub fn namespace_components(mut self, components: &[&str]) -> Result<Self> {
        if components.is_empty() {
            return Ok(self);
        }
        for component in components.iter().copied() {
            if !NAMESPACE_COMPONENT_PATTERN.is_match(component) {
                return Err(CorralError::invalid_reference(
                    "namespace component",
                    component,
                ));
            }
        }
        self.namespace = Some(components.join("/"));
        Ok(self)
    }

    /// Sets the repository name.
    pub fn repository_name(mut self, repository_name: &str) -> Result<Self> {
        if !REPOSITORY_NAME_PATTERN.is_match(repository_name) {
            return Err(CorralError::invalid_reference(
                "repository name",
                repository_name,
            ));
        }
        self.repository_name = Some(repository_name.to_string());
        Ok(self)
    }

    /// Sets the tag. Fails if a digest is already present.
    pub fn tag(mut self, tag: &str) -> Result<Self> {
        if !TAG_PATTERN.is_match(tag) {
            return Err(CorralError::invalid_reference("tag", tag));
        }
        if let Some(digest) = &self.digest {
            return Err(CorralError::invalid_reference(
                "tag (digest already set)",
                format!("{} (digest: {})", tag, digest),
            ));
        }
        self.tag = Some(tag.to_string());
        Ok(self)
    }

    /// Sets the digest. Fails if a tag is already present.
    pub fn digest(mut self, digest: &str) -> Result<Self> {
        if !DIGEST_PATTERN.is_match(digest) {
            return Err(CorralError::invalid_reference("digest", digest));
        }
        if let Some(tag) = &self.tag {
            return Err(CorralError::invalid_reference(
                "digest (tag already set)",
                format!("{} (tag: {})", digest, tag),
            ));
        }
        self.digest = Some(digest.to_string());
        Ok(self)
    }

    /// Commits the builder into an immutable [`ImageReference`].
    ///
    /// Fails if the hostname or repository name is missing, or if neither a
    /// tag nor a digest was set.
    pub fn build(self) -> Result<ImageReference> {
        let hostname = self
            .hostname
            .ok_or_else(|| CorralError::invalid_reference("hostname", "<missing>"))?;
        let repository_name = self
            .repository_name
            .ok_or_else(|| CorralError::invalid_reference("repository name", "<missing>"))?;
        if self.tag.is_none() && self.digest.is_none() {
            return Err(CorralError::invalid_reference("reference", "<missing>"));
        }
        Ok(ImageReference {
            hostname,
            port: self.port,
            namespace: self.namespace,
            repository_name,
            tag: self.tag,
            digest: self.digest,
        })
    }
}
