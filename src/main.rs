use std::sync::Arc;
use tracing::info;
use zkpay::config::{DeploymentConfig, ServerConfig};
use zkpay::seal::KeyMaterial;
use zkpay::{api, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("🚀 ZkPay Ledger {} Starting...", env!("CARGO_PKG_VERSION"));
    let deployment = DeploymentConfig::from_env()?;
    let server = ServerConfig::from_env();
    let keys = KeyMaterial::from_env();
    if keys.signing.is_some() {
        info!("Journal records will be signed");
    }

    let ledger = Arc::new(Ledger::open(&deployment, keys, server.state_file.clone())?);
    ledger.audit()?;
    ledger.commit().await?;

    let app = api::router(ledger.clone());

    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    info!("✅ Listening on {}", server.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    ledger.commit().await?;
    info!("Ledger committed, shutting down");
    Ok(())
}
