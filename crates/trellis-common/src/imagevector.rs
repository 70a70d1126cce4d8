//! Image vector: a static, overridable registry mapping logical image names
//! to repository/tag references.
//!
//! Provider extensions package their image list as a YAML resource compiled
//! into the binary. The vector is parsed once at process start (a parse
//! failure there is fatal), optionally overridden from the environment, and
//! then shared read-only into every admission handler.
//!
//! ## Resource format
//!
//! ```yaml
//! images:
//! - name: etcd-backup-restore
//!   repository: quay.io/trellis/etcd-backup-restore
//!   tag: "0.12.1"
//!   targetVersion: ">= 1.12"
//! ```
//!
//! Multiple entries may share a name; `find_image` returns the first entry
//! whose version requirements are satisfied.

use std::fmt;

use semver::{Version, VersionReq};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Prefix of the environment variables that override image vector entries.
///
/// An entry named `etcd-backup-restore` is overridden by
/// `TRELLIS_IMAGE_ETCD_BACKUP_RESTORE`, whose value is `repository[:tag]`.
pub const IMAGE_OVERRIDE_ENV_PREFIX: &str = "TRELLIS_IMAGE_";

/// Errors from loading or querying an image vector
#[derive(Debug, Error)]
pub enum ImageVectorError {
    /// The YAML resource could not be parsed
    #[error("malformed image vector resource: {source}")]
    Parse {
        /// The underlying YAML error
        #[from]
        source: serde_yaml::Error,
    },

    /// The resource parsed but contains no image entries
    #[error("image vector resource contains no images")]
    Empty,

    /// An entry carries a version requirement that is not valid semver
    #[error("invalid version requirement {value:?} for image {name:?}: {message}")]
    InvalidRequirement {
        /// Name of the image entry
        name: String,
        /// The offending requirement string
        value: String,
        /// Description of what's invalid
        message: String,
    },

    /// An environment override exists but its value is unusable
    #[error("invalid override {value:?} for image {name:?} (expected repository[:tag])")]
    InvalidOverride {
        /// Name of the image entry
        name: String,
        /// The offending override value
        value: String,
    },

    /// No entry matched the requested name and versions
    #[error("image {name:?} not found in vector")]
    NotFound {
        /// The requested image name
        name: String,
    },
}

/// One candidate entry of the image vector
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    /// Logical image name (e.g. "etcd-backup-restore")
    pub name: String,
    /// Image repository without tag
    pub repository: String,
    /// Optional image tag
    pub tag: Option<String>,
    /// Constraint on the container runtime version, if any
    pub runtime_version: Option<VersionReq>,
    /// Constraint on the target Kubernetes version, if any
    pub target_version: Option<VersionReq>,
}

impl ImageSource {
    /// Check whether this entry matches the given name and versions.
    ///
    /// An absent requirement matches any version; a present requirement does
    /// not match when the corresponding version is unknown.
    fn matches(
        &self,
        name: &str,
        runtime_version: Option<&Version>,
        target_version: Option<&Version>,
    ) -> bool {
        self.name == name
            && requirement_satisfied(self.runtime_version.as_ref(), runtime_version)
            && requirement_satisfied(self.target_version.as_ref(), target_version)
    }

    /// Resolve this entry to an [`Image`]
    fn to_image(&self) -> Image {
        Image {
            name: self.name.clone(),
            repository: self.repository.clone(),
            tag: self.tag.clone(),
        }
    }
}

fn requirement_satisfied(requirement: Option<&VersionReq>, version: Option<&Version>) -> bool {
    match (requirement, version) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(req), Some(version)) => req.matches(version),
    }
}

/// A resolved image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Logical image name
    pub name: String,
    /// Image repository
    pub repository: String,
    /// Image tag, if any
    pub tag: Option<String>,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawImageVector {
    images: Vec<RawImageSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawImageSource {
    name: String,
    repository: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    runtime_version: Option<String>,
    #[serde(default)]
    target_version: Option<String>,
}

impl RawImageSource {
    fn parse(self) -> Result<ImageSource, ImageVectorError> {
        let runtime_version = self
            .runtime_version
            .as_deref()
            .map(|raw| parse_requirement(&self.name, raw))
            .transpose()?;
        let target_version = self
            .target_version
            .as_deref()
            .map(|raw| parse_requirement(&self.name, raw))
            .transpose()?;

        Ok(ImageSource {
            name: self.name,
            repository: self.repository,
            tag: self.tag,
            runtime_version,
            target_version,
        })
    }
}

fn parse_requirement(name: &str, raw: &str) -> Result<VersionReq, ImageVectorError> {
    VersionReq::parse(raw).map_err(|e| ImageVectorError::InvalidRequirement {
        name: name.to_string(),
        value: raw.to_string(),
        message: e.to_string(),
    })
}

/// Ordered list of image candidates, queried by name and version
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageVector {
    images: Vec<ImageSource>,
}

impl ImageVector {
    /// Create a vector from pre-built entries (mainly for tests and tools)
    pub fn new(images: Vec<ImageSource>) -> Self {
        Self { images }
    }

    /// Parse an image vector from its YAML resource.
    ///
    /// Fails on malformed YAML, unknown keys, invalid version requirements,
    /// or an empty image list. Callers load the packaged resource once at
    /// process start and treat a failure as fatal: every subsequent mutation
    /// needs the vector, so the process must not come up without it.
    pub fn read(yaml: &str) -> Result<Self, ImageVectorError> {
        let raw: RawImageVector = serde_yaml::from_str(yaml)?;
        if raw.images.is_empty() {
            return Err(ImageVectorError::Empty);
        }

        let images = raw
            .images
            .into_iter()
            .map(RawImageSource::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { images })
    }

    /// Entries of the vector, in resource order
    pub fn images(&self) -> &[ImageSource] {
        &self.images
    }

    /// Apply environment overrides, returning a new vector.
    ///
    /// For each entry whose override variable (see
    /// [`IMAGE_OVERRIDE_ENV_PREFIX`]) is set, the repository and tag are
    /// replaced by the variable's `repository[:tag]` value. The input vector
    /// is not mutated.
    pub fn with_env_override(&self) -> Result<Self, ImageVectorError> {
        self.with_override_lookup(|var| std::env::var(var).ok())
    }

    /// Apply overrides through an explicit lookup function.
    ///
    /// Extracted from [`Self::with_env_override`] so tests can inject
    /// overrides without touching process-global environment state.
    pub fn with_override_lookup<F>(&self, lookup: F) -> Result<Self, ImageVectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let images = self
            .images
            .iter()
            .map(|source| {
                let var = override_env_var(&source.name);
                match lookup(&var) {
                    Some(value) => apply_override(source, &value),
                    None => Ok(source.clone()),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { images })
    }

    /// Find the first entry matching the name whose version requirements are
    /// satisfied, resolved to an [`Image`].
    pub fn find_image(
        &self,
        name: &str,
        runtime_version: Option<&Version>,
        target_version: Option<&Version>,
    ) -> Result<Image, ImageVectorError> {
        self.images
            .iter()
            .find(|source| source.matches(name, runtime_version, target_version))
            .map(ImageSource::to_image)
            .ok_or_else(|| ImageVectorError::NotFound {
                name: name.to_string(),
            })
    }
}

/// Override variable name for an image entry: the name uppercased, with `-`
/// and `.` mapped to `_`, behind [`IMAGE_OVERRIDE_ENV_PREFIX`].
pub fn override_env_var(name: &str) -> String {
    let suffix = name.to_uppercase().replace(['-', '.'], "_");
    format!("{}{}", IMAGE_OVERRIDE_ENV_PREFIX, suffix)
}

fn apply_override(source: &ImageSource, value: &str) -> Result<ImageSource, ImageVectorError> {
    if value.is_empty() {
        return Err(ImageVectorError::InvalidOverride {
            name: source.name.clone(),
            value: value.to_string(),
        });
    }

    // A colon after the last slash separates repository from tag; a colon
    // before it belongs to a registry port (host:5000/repo).
    let tag_sep = value
        .rfind(':')
        .filter(|&i| i > value.rfind('/').unwrap_or(0));

    let (repository, tag) = match tag_sep {
        Some(i) => (&value[..i], Some(value[i + 1..].to_string())),
        None => (value, None),
    };

    if repository.is_empty() || tag.as_deref() == Some("") {
        return Err(ImageVectorError::InvalidOverride {
            name: source.name.clone(),
            value: value.to_string(),
        });
    }

    debug!(
        image = %source.name,
        repository = %repository,
        tag = ?tag,
        "Overriding image vector entry from environment"
    );

    Ok(ImageSource {
        name: source.name.clone(),
        repository: repository.to_string(),
        tag,
        runtime_version: source.runtime_version.clone(),
        target_version: source.target_version.clone(),
    })
}
