//! Error types for Trellis provider extensions
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the context a webhook operator needs: which secret,
//! which image, which configuration file.

use thiserror::Error;

use crate::imagevector::ImageVectorError;
use crate::secrets::SecretError;

/// Main error type for Trellis operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Image vector load or lookup error
    #[error("image vector error: {source}")]
    ImageVector {
        /// The underlying image vector error
        #[from]
        source: ImageVectorError,
    },

    /// Secret lookup error
    #[error("secret lookup error: {source}")]
    SecretLookup {
        /// The underlying secret access error
        #[from]
        source: SecretError,
    },

    /// A version string in the cluster context could not be parsed
    #[error("invalid version {value:?}: {message}")]
    Version {
        /// The offending version string
        value: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a version error for an unparseable version string
    pub fn version(value: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Version {
            value: value.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Transient Kubernetes and secret-read failures may succeed on the next
    /// admission attempt; the host webhook framework owns the retry policy.
    /// Image vector, version, and configuration errors require a config fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::ImageVector { .. } => false,
            Error::SecretLookup { source } => !matches!(source, SecretError::NotFound { .. }),
            Error::Version { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
        }
    }
}
