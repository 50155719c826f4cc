//! Error types for corral.
//!
//! All failures surface synchronously as typed errors carrying enough
//! context (registry host, repository, field name) to log or display
//! without a caller-side round-trip.

use thiserror::Error;


/// Main error type for corral operations.
#[derive(Error, Debug)]
pub enum CorralError {
    /// Grammar violation in an image reference field during parsing.
    #[error("Invalid image reference: bad {field}: '{value}'")]
    InvalidImageReference { field: String, value: String },

    /// The parsed or requested registry host has no matching configuration.
    #[error("No registry configuration found for '{registry_host}'")]
    RegistryNotConfigured { registry_host: String },

    /// The configuration names an authorization type with no registered authorizer.
    #[error("No registry authorizer registered for type '{authorization_type}'")]
    UnsupportedAuthorizationType { authorization_type: String },

    /// The selected authorizer failed (missing credentials, token-endpoint
    /// failure, malformed token response, AWS call failure).
    #[error("Authorization failed for '{registry_host}': {message}")]
    Authorization {
        registry_host: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The configured manifest media type is not one of the supported values.
    #[error("Unsupported image manifest media type '{media_type}'")]
    UnsupportedManifestMediaType { media_type: String },

    /// Network, TLS or proxy failure reaching the registry. Never retried
    /// automatically.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid or inconsistent registry configuration.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for corral operations.
pub type Result<T> = std::result::Result<T, CorralError>;

impl CorralError {
    /// Creates an invalid-image-reference error naming the offending field.
    ///
    /// # Examples
    ///
    /// ```
    /// use libcorral::error::CorralError;
    ///
    /// let err = CorralError::invalid_reference("tag", ".bad");
    /// assert!(matches!(err, CorralError::InvalidImageReference { .. }));
    /// ```
    pub fn invalid_reference(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidImageReference {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a registry-not-configured error.
    pub fn registry_not_configured<S: Into<String>>(registry_host: S) -> Self {
        Self::RegistryNotConfigured {
            registry_host: registry_host.into(),
        }
    }

    /// Creates an unsupported-authorization-type error.
    pub fn unsupported_authorization_type<S: Into<String>>(authorization_type: S) -> Self {
        Self::UnsupportedAuthorizationType {
            authorization_type: authorization_type.into(),
        }
    }

    /// Creates an authorization error.
    pub fn authorization(registry_host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authorization {
            registry_host: registry_host.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates an authorization error with a source error.
    pub fn authorization_with_source<E>(
        registry_host: impl Into<String>,
        message: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Authorization {
            registry_host: registry_host.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an unsupported-manifest-media-type error.
    pub fn unsupported_manifest_media_type<S: Into<String>>(media_type: S) -> Self {
        Self::UnsupportedManifestMediaType {
            media_type: media_type.into(),
        }
    }

    /// Creates a transport error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libcorral::error::CorralError;
    ///
    /// let err = CorralError::transport("connection refused");
    /// assert!(matches!(err, CorralError::Transport { .. }));
    /// ```
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with a source error.
    pub fn transport_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
