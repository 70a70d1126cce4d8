//! Trellis OpenStack provider extension - control-plane backup webhook

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use trellis_common::secrets::KubeSecretSource;
use trellis_common::telemetry;
use trellis_provider_openstack::config::ProviderConfig;
use trellis_provider_openstack::controlplanebackup::BackupEnsurer;
use trellis_provider_openstack::imagevector;
use trellis_provider_openstack::openstack::PROVIDER_TYPE;
use trellis_webhook::server::{start_webhook_server, WebhookState};

/// OpenStack provider extension for the Trellis cluster-lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "trellis-provider-openstack", version, about, long_about = None)]
struct Cli {
    /// Address the webhook server listens on
    #[arg(long, default_value = "0.0.0.0:9443")]
    listen: SocketAddr,

    /// Path to the provider configuration file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry()?;
    let cli = Cli::parse();

    let config = ProviderConfig::from_yaml_file(&cli.config)?;

    // Startup precondition: every mutation needs the image vector, so a
    // missing or malformed resource keeps the process from coming up.
    let images = Arc::new(imagevector::load()?);

    let client = kube::Client::try_default().await?;
    let ensurer = BackupEnsurer::new(
        config.etcd_backup.clone(),
        images,
        Arc::new(KubeSecretSource::new(client)),
    );

    info!(
        provider = PROVIDER_TYPE,
        shoot = %config.cluster.shoot.technical_id,
        backup = config.cluster.backup_enabled(),
        "Starting control-plane backup webhook"
    );

    let state = Arc::new(WebhookState {
        ensurer: Arc::new(ensurer),
        cluster: config.cluster,
    });

    start_webhook_server(state, cli.listen).await?;
    Ok(())
}
