//! Read-only secret access for provider webhooks
//!
//! Ensurers resolve provider credentials (bucket names, auth fields) from a
//! named Secret in the control-plane namespace. Access goes through the
//! [`SecretSource`] trait so mutation logic can be tested without an API
//! server, and the secret's content checksum becomes a pod-template
//! annotation that forces a rolling restart on credential rotation.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors from secret lookups
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret does not exist
    #[error("secret {namespace}/{name} not found")]
    NotFound {
        /// Namespace of the missing secret
        namespace: String,
        /// Name of the missing secret
        name: String,
    },

    /// Any other Kubernetes API failure
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

/// Read-only access to named secrets.
///
/// The only I/O an ensurer performs. Implementations must respect the
/// ambient request deadline; no retries happen at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SecretSource: Send + Sync {
    /// Get a secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, SecretError>;
}

/// Production [`SecretSource`] backed by a kube client
#[derive(Clone)]
pub struct KubeSecretSource {
    client: Client,
}

impl KubeSecretSource {
    /// Create a source reading through the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SecretSource for KubeSecretSource {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, SecretError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(secret),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Compute the deterministic checksum of a secret's contents.
///
/// Lowercase hex SHA-256 over the JSON serialization of the `data` map.
/// `data` is a `BTreeMap` with base64-encoded values, so the serialization
/// is byte-stable across processes and key insertion order.
pub fn compute_secret_checksum(secret: &Secret) -> String {
    let data = secret.data.clone().unwrap_or_default();
    let bytes = serde_json::to_vec(&data).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Fetch a secret and compute its checksum in one step.
///
/// The lookup is the only blocking operation in a mutation; a failure here
/// fails the whole admission call with no partial changes applied.
pub async fn resolve_secret_checksum(
    source: &dyn SecretSource,
    namespace: &str,
    name: &str,
) -> Result<(Secret, String), SecretError> {
    let secret = source.get_secret(namespace, name).await?;
    let checksum = compute_secret_checksum(&secret);

    debug!(
        namespace = %namespace,
        secret = %name,
        checksum = %checksum,
        "Resolved backup secret"
    );

    Ok((secret, checksum))
}
