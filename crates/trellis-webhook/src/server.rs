//! Admission webhook HTTP server
//!
//! Serves the mutating admission endpoint for etcd StatefulSets. The host
//! manager registers the webhook configuration and terminates TLS; this
//! server only speaks the AdmissionReview protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{error, info};

use crate::cluster::ClusterContext;
use crate::mutator::{mutate_statefulset, StatefulSetEnsurer};

/// Path of the control-plane backup mutation endpoint
pub const CONTROLPLANE_BACKUP_WEBHOOK_PATH: &str = "/webhooks/controlplanebackup";

/// Shared state of the webhook server
pub struct WebhookState {
    /// The provider's ensurer
    pub ensurer: Arc<dyn StatefulSetEnsurer>,
    /// Cluster context handed to the ensurer with each request
    pub cluster: ClusterContext,
}

/// Build the webhook router with shared state
pub fn webhook_routes(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(CONTROLPLANE_BACKUP_WEBHOOK_PATH, post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the webhook until the listener fails or the task is cancelled
pub async fn start_webhook_server(state: Arc<WebhookState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Control-plane backup webhook started");
    axum::serve(listener, webhook_routes(state)).await
}

/// Handle one AdmissionReview round-trip
async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<StatefulSet>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<StatefulSet> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_statefulset(state.ensurer.as_ref(), &state.cluster, &req).await;
    Json(response.into_review())
}
