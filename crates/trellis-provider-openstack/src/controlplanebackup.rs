//! Etcd backup ensurer for the OpenStack provider
//!
//! Reconciles the `backup-restore` sidecar into the etcd StatefulSets the
//! lifecycle manager generates for each shoot control plane:
//!
//! - `etcd-main` with a seed backup profile: Swift credentials from the
//!   `etcd-backup` secret wired in as env vars, the secret checksum pinned
//!   on the pod template so credential rotation restarts the pods, and the
//!   store prefix/schedule embedded in the sidecar command.
//! - `etcd-main` without a profile, and `etcd-events` always: the same
//!   sidecar with no store access.
//!
//! The managed container is rebuilt from scratch on every pass, so the
//! result is identical whether the object is fresh, already ensured, or
//! carries stale wiring from an earlier configuration.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use tracing::debug;

use trellis_common::imagevector::ImageVector;
use trellis_common::secrets::{resolve_secret_checksum, SecretSource};
use trellis_common::{checksum_secret_annotation_key, Result};
use trellis_webhook::cluster::ClusterContext;
use trellis_webhook::etcd::{
    backup_restore_container, ensure_container, pod_template_containers_mut,
    remove_pod_template_annotation, set_pod_template_annotation, EtcdRole,
};
use trellis_webhook::mutator::StatefulSetEnsurer;

use crate::config::EtcdBackupConfig;
use crate::imagevector::etcd_backup_restore_image;
use crate::openstack::{
    AUTH_URL_KEY, BACKUP_SECRET_NAME, BUCKET_NAME_KEY, DOMAIN_NAME_KEY, PASSWORD_KEY,
    STORAGE_PROVIDER_NAME, TENANT_NAME_KEY, USERNAME_KEY,
};

/// Ensurer wiring Swift-backed etcd backups into shoot control planes
pub struct BackupEnsurer {
    backup: EtcdBackupConfig,
    images: Arc<ImageVector>,
    secrets: Arc<dyn SecretSource>,
}

impl BackupEnsurer {
    /// Create an ensurer with its statically-bound collaborators
    pub fn new(
        backup: EtcdBackupConfig,
        images: Arc<ImageVector>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            backup,
            images,
            secrets,
        }
    }
}

#[async_trait]
impl StatefulSetEnsurer for BackupEnsurer {
    async fn ensure_statefulset(
        &self,
        ctx: &ClusterContext,
        role: EtcdRole,
        statefulset: &StatefulSet,
    ) -> Result<StatefulSet> {
        let version = ctx.shoot_kubernetes_version()?;
        let image = etcd_backup_restore_image(&self.images, &version)?;
        let schedule = self.backup.schedule();
        let annotation_key = checksum_secret_annotation_key(BACKUP_SECRET_NAME);

        let mut ensured = statefulset.clone();

        let container = if role == EtcdRole::Main && ctx.backup_enabled() {
            let namespace = statefulset.metadata.namespace.as_deref().unwrap_or_default();
            let (_, checksum) =
                resolve_secret_checksum(self.secrets.as_ref(), namespace, BACKUP_SECRET_NAME)
                    .await?;
            set_pod_template_annotation(&mut ensured, &annotation_key, checksum);

            backup_restore_container(
                role,
                schedule,
                STORAGE_PROVIDER_NAME,
                &ctx.store_prefix(),
                &image.to_string(),
                Some(backup_env()),
                None,
            )
        } else {
            // Backup disabled (or the events member): strip any stale
            // checksum and render the sidecar without store access.
            remove_pod_template_annotation(&mut ensured, &annotation_key);

            backup_restore_container(role, schedule, "", "", &image.to_string(), None, None)
        };

        ensure_container(pod_template_containers_mut(&mut ensured), container);

        debug!(
            statefulset = role.statefulset_name(),
            backup = ctx.backup_enabled(),
            "Ensured etcd StatefulSet"
        );

        Ok(ensured)
    }
}

/// The fixed, ordered credentials env list of the backup sidecar.
///
/// Consumers match variables by name, but the order is kept stable so the
/// reconciled container is byte-identical across passes.
pub fn backup_env() -> Vec<EnvVar> {
    vec![
        env_from_secret("STORAGE_CONTAINER", BUCKET_NAME_KEY),
        env_from_secret("OS_AUTH_URL", AUTH_URL_KEY),
        env_from_secret("OS_DOMAIN_NAME", DOMAIN_NAME_KEY),
        env_from_secret("OS_USERNAME", USERNAME_KEY),
        env_from_secret("OS_PASSWORD", PASSWORD_KEY),
        env_from_secret("OS_TENANT_NAME", TENANT_NAME_KEY),
    ]
}

fn env_from_secret(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: BACKUP_SECRET_NAME.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagevector::ETCD_BACKUP_RESTORE_IMAGE_NAME;
    use k8s_openapi::api::core::v1::{Container, Secret};
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;
    use trellis_common::imagevector::ImageSource;
    use trellis_common::secrets::SecretError;
    use trellis_webhook::cluster::{SeedBackupProfile, SeedInfo, ShootInfo};
    use trellis_webhook::etcd::container_with_name;

    const NAMESPACE: &str = "test";
    const SCHEDULE: &str = "0 */24 * * *";
    const SECRET_CHECKSUM: &str =
        "8bafb35ff1ac60275d62e1cbd495aceb511fb354f74a20f7d06ecb48b3a68432";

    mockall::mock! {
        SecretStore {}

        #[async_trait]
        impl SecretSource for SecretStore {
            async fn get_secret(
                &self,
                namespace: &str,
                name: &str,
            ) -> std::result::Result<Secret, SecretError>;
        }
    }

    fn backup_secret() -> Secret {
        let mut data = BTreeMap::new();
        data.insert("foo".to_string(), ByteString(b"bar".to_vec()));
        Secret {
            metadata: ObjectMeta {
                name: Some(BACKUP_SECRET_NAME.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    /// Source expecting exactly the backup secret lookup
    fn secret_store() -> Arc<MockSecretStore> {
        let mut store = MockSecretStore::new();
        store
            .expect_get_secret()
            .withf(|ns, name| ns == NAMESPACE && name == BACKUP_SECRET_NAME)
            .returning(|_, _| Ok(backup_secret()));
        Arc::new(store)
    }

    /// Source that panics on any lookup; for paths that must not do I/O
    fn untouched_secret_store() -> Arc<MockSecretStore> {
        Arc::new(MockSecretStore::new())
    }

    fn failing_secret_store() -> Arc<MockSecretStore> {
        let mut store = MockSecretStore::new();
        store.expect_get_secret().returning(|ns, name| {
            Err(SecretError::NotFound {
                namespace: ns.to_string(),
                name: name.to_string(),
            })
        });
        Arc::new(store)
    }

    fn test_images() -> Arc<ImageVector> {
        Arc::new(ImageVector::new(vec![ImageSource {
            name: ETCD_BACKUP_RESTORE_IMAGE_NAME.to_string(),
            repository: "test-repository".to_string(),
            tag: Some("test-tag".to_string()),
            runtime_version: None,
            target_version: None,
        }]))
    }

    fn ensurer(secrets: Arc<MockSecretStore>) -> BackupEnsurer {
        BackupEnsurer::new(
            EtcdBackupConfig {
                schedule: Some(SCHEDULE.to_string()),
            },
            test_images(),
            secrets,
        )
    }

    fn context(with_backup: bool) -> ClusterContext {
        ClusterContext {
            shoot: ShootInfo {
                technical_id: "shoot--test--sample".to_string(),
                uid: "test-uid".to_string(),
                kubernetes_version: "1.13.4".to_string(),
            },
            seed: SeedInfo {
                backup: with_backup.then(SeedBackupProfile::default),
            },
        }
    }

    fn statefulset(name: &str) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn statefulset_with_containers(name: &str, containers: Vec<Container>) -> StatefulSet {
        let mut statefulset = statefulset(name);
        *pod_template_containers_mut(&mut statefulset) = containers;
        statefulset
    }

    fn bare_container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn expected_env() -> Vec<EnvVar> {
        let from_secret = |name: &str, key: &str| EnvVar {
            name: name.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: "etcd-backup".to_string(),
                    key: key.to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
        };
        vec![
            from_secret("STORAGE_CONTAINER", "bucketName"),
            from_secret("OS_AUTH_URL", "authURL"),
            from_secret("OS_DOMAIN_NAME", "domainName"),
            from_secret("OS_USERNAME", "username"),
            from_secret("OS_PASSWORD", "password"),
            from_secret("OS_TENANT_NAME", "tenantName"),
        ]
    }

    fn managed_container(statefulset: &StatefulSet) -> &Container {
        let containers = &statefulset
            .spec
            .as_ref()
            .expect("statefulset spec")
            .template
            .spec
            .as_ref()
            .expect("pod spec")
            .containers;
        container_with_name(containers, "backup-restore").expect("backup-restore container")
    }

    fn pod_template_annotations(statefulset: &StatefulSet) -> Option<&BTreeMap<String, String>> {
        statefulset
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
    }

    fn check_etcd_main(statefulset: &StatefulSet) {
        let container = managed_container(statefulset);
        assert_eq!(container.env.as_deref(), Some(expected_env().as_slice()));
        assert_eq!(
            container,
            &backup_restore_container(
                EtcdRole::Main,
                SCHEDULE,
                "Swift",
                "shoot--test--sample--test-uid",
                "test-repository:test-tag",
                Some(expected_env()),
                None,
            )
        );

        let mut expected_annotations = BTreeMap::new();
        expected_annotations.insert(
            "checksum/secret-etcd-backup".to_string(),
            SECRET_CHECKSUM.to_string(),
        );
        assert_eq!(pod_template_annotations(statefulset), Some(&expected_annotations));
    }

    fn check_etcd_main_without_backup(statefulset: &StatefulSet) {
        let container = managed_container(statefulset);
        assert_eq!(
            container,
            &backup_restore_container(
                EtcdRole::Main,
                SCHEDULE,
                "",
                "",
                "test-repository:test-tag",
                None,
                None,
            )
        );
        assert_eq!(pod_template_annotations(statefulset), None);
    }

    fn check_etcd_events(statefulset: &StatefulSet) {
        let container = managed_container(statefulset);
        assert_eq!(
            container,
            &backup_restore_container(
                EtcdRole::Events,
                SCHEDULE,
                "",
                "",
                "test-repository:test-tag",
                None,
                None,
            )
        );
        assert_eq!(pod_template_annotations(statefulset), None);
    }

    // =========================================================================
    // etcd-main
    // =========================================================================

    #[tokio::test]
    async fn adds_backup_wiring_to_fresh_etcd_main() {
        let ensurer = ensurer(secret_store());

        let ensured = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();

        check_etcd_main(&ensured);
    }

    #[tokio::test]
    async fn replaces_existing_container_on_etcd_main() {
        let ensurer = ensurer(secret_store());
        let input =
            statefulset_with_containers("etcd-main", vec![bare_container("backup-restore")]);

        let ensured = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Main, &input)
            .await
            .unwrap();

        check_etcd_main(&ensured);
    }

    #[tokio::test]
    async fn skips_backup_wiring_when_seed_profile_is_missing() {
        // The untouched store panics on any lookup: the disabled branch
        // must not perform I/O.
        let ensurer = ensurer(untouched_secret_store());

        let ensured = ensurer
            .ensure_statefulset(&context(false), EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();

        check_etcd_main_without_backup(&ensured);
    }

    #[tokio::test]
    async fn strips_stale_backup_wiring_when_profile_is_removed() {
        let ensurer_with_backup = ensurer(secret_store());
        let ensured = ensurer_with_backup
            .ensure_statefulset(&context(true), EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();

        // Same object, profile now gone: env and checksum must disappear.
        let ensurer_without = ensurer(untouched_secret_store());
        let stripped = ensurer_without
            .ensure_statefulset(&context(false), EtcdRole::Main, &ensured)
            .await
            .unwrap();

        check_etcd_main_without_backup(&stripped);
    }

    #[tokio::test]
    async fn repeated_application_converges_on_etcd_main() {
        let ensurer = ensurer(secret_store());
        let ctx = context(true);

        let once = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();
        let twice = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &once)
            .await
            .unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn repeated_application_converges_without_backup() {
        let ensurer = ensurer(untouched_secret_store());
        let ctx = context(false);

        let once = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();
        let twice = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &once)
            .await
            .unwrap();

        assert_eq!(once, twice);
    }

    // =========================================================================
    // etcd-events
    // =========================================================================

    #[tokio::test]
    async fn adds_reduced_wiring_to_fresh_etcd_events() {
        // Events never touches the backup secret, profile or not.
        let ensurer = ensurer(untouched_secret_store());

        let ensured = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Events, &statefulset("etcd-events"))
            .await
            .unwrap();

        check_etcd_events(&ensured);
    }

    #[tokio::test]
    async fn replaces_existing_container_on_etcd_events() {
        let ensurer = ensurer(untouched_secret_store());
        let input =
            statefulset_with_containers("etcd-events", vec![bare_container("backup-restore")]);

        let ensured = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Events, &input)
            .await
            .unwrap();

        check_etcd_events(&ensured);
    }

    #[tokio::test]
    async fn repeated_application_converges_on_etcd_events() {
        let ensurer = ensurer(untouched_secret_store());
        let ctx = context(true);

        let once = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Events, &statefulset("etcd-events"))
            .await
            .unwrap();
        let twice = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Events, &once)
            .await
            .unwrap();

        assert_eq!(once, twice);
    }

    // =========================================================================
    // Cross-cutting properties
    // =========================================================================

    #[tokio::test]
    async fn role_switching_does_not_cross_contaminate() {
        let ensurer = ensurer(secret_store());
        let ctx = context(true);

        let main = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap();
        let events = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Events, &statefulset("etcd-events"))
            .await
            .unwrap();

        check_etcd_main(&main);
        check_etcd_events(&events);
    }

    #[tokio::test]
    async fn unmanaged_fields_and_containers_survive() {
        let mut input = statefulset_with_containers(
            "etcd-main",
            vec![bare_container("etcd"), bare_container("backup-restore")],
        );
        input.spec.as_mut().unwrap().replicas = Some(1);
        input.metadata.labels = Some(BTreeMap::from([(
            "role".to_string(),
            "main".to_string(),
        )]));

        let ensurer = ensurer(secret_store());
        let ensured = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Main, &input)
            .await
            .unwrap();

        check_etcd_main(&ensured);
        let spec = ensured.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.template.spec.as_ref().unwrap().containers[0],
            bare_container("etcd")
        );
        assert_eq!(ensured.metadata.labels, input.metadata.labels);
    }

    #[tokio::test]
    async fn secret_read_failure_fails_the_whole_mutation() {
        let ensurer = ensurer(failing_secret_store());
        let input = statefulset("etcd-main");

        let err = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Main, &input)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("etcd-backup"));
        // Pure transformation: the input is untouched on failure.
        assert_eq!(input, statefulset("etcd-main"));
    }

    #[tokio::test]
    async fn unknown_image_fails_the_mutation() {
        let ensurer = BackupEnsurer::new(
            EtcdBackupConfig::default(),
            Arc::new(ImageVector::new(vec![ImageSource {
                name: "terraformer".to_string(),
                repository: "quay.io/trellis/terraformer".to_string(),
                tag: None,
                runtime_version: None,
                target_version: None,
            }])),
            untouched_secret_store(),
        );

        let err = ensurer
            .ensure_statefulset(&context(true), EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("etcd-backup-restore"));
    }

    #[tokio::test]
    async fn invalid_shoot_version_fails_the_mutation() {
        let mut ctx = context(true);
        ctx.shoot.kubernetes_version = "thirteen".to_string();

        let ensurer = ensurer(untouched_secret_store());
        let err = ensurer
            .ensure_statefulset(&ctx, EtcdRole::Main, &statefulset("etcd-main"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("thirteen"));
    }
}
