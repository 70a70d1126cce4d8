//! Generic StatefulSet mutator
//!
//! Owns the admission-side plumbing around an ensurer: decoding the typed
//! object, role dispatch, computing the RFC 6902 patch between the incoming
//! and the reconciled object, and turning ensurer failures into denials.
//! Ensurers stay pure transformations; everything protocol-shaped is here.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, error, info};

use trellis_common::{Error, Result};

use crate::cluster::ClusterContext;
use crate::etcd::EtcdRole;

/// A provider's etcd StatefulSet ensurer.
///
/// Given the incoming object and the cluster context, computes the fully
/// reconciled object. Implementations must be convergent: applying the
/// ensurer to its own output yields an identical result. The input is
/// never mutated; on error the caller keeps the object untouched.
#[async_trait]
pub trait StatefulSetEnsurer: Send + Sync {
    /// Compute the reconciled StatefulSet
    async fn ensure_statefulset(
        &self,
        ctx: &ClusterContext,
        role: EtcdRole,
        statefulset: &StatefulSet,
    ) -> Result<StatefulSet>;
}

/// Reconcile an incoming StatefulSet and express the change as a JSON patch.
///
/// Returns `Ok(None)` for objects outside the ensurer's contract (a name
/// that is neither etcd StatefulSet) and for already-converged objects.
pub async fn reconcile_patch(
    ensurer: &dyn StatefulSetEnsurer,
    ctx: &ClusterContext,
    statefulset: &StatefulSet,
) -> Result<Option<json_patch::Patch>> {
    let name = statefulset.metadata.name.as_deref().unwrap_or_default();
    let Some(role) = EtcdRole::from_statefulset_name(name) else {
        debug!(statefulset = %name, "Not an etcd StatefulSet, leaving unchanged");
        return Ok(None);
    };

    let ensured = ensurer.ensure_statefulset(ctx, role, statefulset).await?;

    let before = serde_json::to_value(statefulset)
        .map_err(|e| Error::serialization_for_kind("StatefulSet", e.to_string()))?;
    let after = serde_json::to_value(&ensured)
        .map_err(|e| Error::serialization_for_kind("StatefulSet", e.to_string()))?;

    let patch = json_patch::diff(&before, &after);
    if patch.0.is_empty() {
        Ok(None)
    } else {
        Ok(Some(patch))
    }
}

/// Process one admission request through the ensurer.
///
/// Ensurer errors deny the request; the host framework owns any retry.
pub async fn mutate_statefulset(
    ensurer: &dyn StatefulSetEnsurer,
    ctx: &ClusterContext,
    request: &AdmissionRequest<StatefulSet>,
) -> AdmissionResponse {
    let uid = request.uid.clone();

    let Some(statefulset) = &request.object else {
        debug!(uid = %uid, "No StatefulSet object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    match reconcile_patch(ensurer, ctx, statefulset).await {
        Ok(None) => AdmissionResponse::from(request),
        Ok(Some(patch)) => {
            info!(
                uid = %uid,
                statefulset = ?statefulset.metadata.name,
                patch_ops = patch.0.len(),
                "Applying patch to StatefulSet"
            );
            match AdmissionResponse::from(request).with_patch(patch) {
                Ok(response) => response,
                Err(e) => {
                    error!(uid = %uid, error = %e, "Failed to serialize patch");
                    AdmissionResponse::from(request)
                        .deny(format!("patch serialization error: {e}"))
                }
            }
        }
        Err(e) => {
            error!(
                uid = %uid,
                statefulset = ?statefulset.metadata.name,
                error = %e,
                "Mutation failed"
            );
            AdmissionResponse::from(request).deny(e.to_string())
        }
    }
}
