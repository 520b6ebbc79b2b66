use anyhow::Result;
use tracing::{info, warn};
use healthrisk_core::{init_tracing, init_metrics, mark_ready, set_status, shutdown_signal};
use prediction_service::{router, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = ServiceConfig::load()?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    init_metrics()?;
    info!(?cfg, "config loaded");

    let state = AppState::from_config(&cfg);
    set_status("artifact_path", cfg.artifact_path.display().to_string());
    match &state {
        AppState::Ready(ctx) => {
            set_status("artifact_state", "loaded");
            set_status("artifact_sha256", ctx.artifact().digest.clone());
            mark_ready();
            info!("service ready");
        }
        AppState::Unavailable(e) => {
            set_status("artifact_state", e.to_string());
            warn!("serving the load error until the artifact is fixed and the service restarted");
        }
    }

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown");
    Ok(())
}
