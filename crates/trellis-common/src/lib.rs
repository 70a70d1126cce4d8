//! Common types for Trellis provider extensions: errors, the image vector,
//! secret access, and telemetry.

#![deny(missing_docs)]

pub mod error;
pub mod imagevector;
pub mod secrets;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation key prefix for secret checksums on pod templates.
///
/// A change in the referenced secret changes the annotation value, which
/// changes the pod template hash and forces a rolling restart.
pub const CHECKSUM_SECRET_ANNOTATION_PREFIX: &str = "checksum/secret-";

/// Build the pod-template annotation key for a secret checksum
pub fn checksum_secret_annotation_key(secret_name: &str) -> String {
    format!("{}{}", CHECKSUM_SECRET_ANNOTATION_PREFIX, secret_name)
}
