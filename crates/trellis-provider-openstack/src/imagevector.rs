//! Packaged image vector and named image lookups
//!
//! The provider's image list is compiled into the binary and parsed once at
//! startup; a parse failure keeps the process from coming up. Individual
//! entries can be redirected at deploy time through `TRELLIS_IMAGE_*`
//! environment variables.

use semver::Version;
use trellis_common::imagevector::{Image, ImageVector, ImageVectorError};

/// Name of the etcd backup sidecar image
pub const ETCD_BACKUP_RESTORE_IMAGE_NAME: &str = "etcd-backup-restore";

/// Name of the Terraformer image used for infrastructure provisioning
pub const TERRAFORMER_IMAGE_NAME: &str = "terraformer";

const IMAGES_RESOURCE: &str = include_str!("../resources/images.yaml");

/// Load the packaged image vector with environment overrides applied.
///
/// Called once in `main`; the result is shared read-only into every
/// admission handler.
pub fn load() -> Result<ImageVector, ImageVectorError> {
    ImageVector::read(IMAGES_RESOURCE)?.with_env_override()
}

/// Resolve the etcd backup sidecar image for a shoot Kubernetes version
pub fn etcd_backup_restore_image(
    images: &ImageVector,
    target_version: &Version,
) -> Result<Image, ImageVectorError> {
    images.find_image(ETCD_BACKUP_RESTORE_IMAGE_NAME, None, Some(target_version))
}

/// Resolve the Terraformer image
pub fn terraformer_image(images: &ImageVector) -> Result<Image, ImageVectorError> {
    images.find_image(TERRAFORMER_IMAGE_NAME, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packaged_resource_parses() {
        let images = load().unwrap();
        assert!(!images.images().is_empty());
    }

    #[test]
    fn etcd_backup_restore_image_resolves() {
        let images = load().unwrap();
        let image = etcd_backup_restore_image(&images, &Version::new(1, 13, 4)).unwrap();
        assert_eq!(image.name, ETCD_BACKUP_RESTORE_IMAGE_NAME);
        assert!(image.to_string().starts_with("quay.io/trellis/etcd-backup-restore:"));
    }

    #[test]
    fn terraformer_image_resolves() {
        let images = load().unwrap();
        let image = terraformer_image(&images).unwrap();
        assert_eq!(image.name, TERRAFORMER_IMAGE_NAME);
    }
}
