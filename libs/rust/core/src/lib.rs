//! Core shared utilities for the health risk services.

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;
pub use metrics::{PredictionMetrics, PREDICTION_METRICS};

/// Prefix for every environment override (`HEALTHRISK__BIND_ADDR`, ...).
pub const ENV_PREFIX: &str = "HEALTHRISK";
/// Names an optional YAML/JSON/TOML config file layered under the environment.
pub const CONFIG_FILE_ENV: &str = "HEALTHRISK_CONFIG_FILE";
/// `1`/`true` switches the log formatter to JSON lines.
pub const JSON_LOG_ENV: &str = "HEALTHRISK_JSON_LOG";

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);
static STATUS_FIELDS: Lazy<RwLock<serde_json::Map<String, serde_json::Value>>> =
    Lazy::new(|| RwLock::new(serde_json::Map::new()));

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Publishes a key on `/status` (artifact path, load state, ...).
pub fn set_status(key: &str, value: impl Into<serde_json::Value>) {
    STATUS_FIELDS.write().insert(key.to_string(), value.into());
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = env_flag(JSON_LOG_ENV);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let json_layer = json.then(|| {
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
        });
        let text_layer = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(text_layer)
            .try_init()?;
        Ok(())
    })?;
    info!(target: "healthrisk_core", service, "tracing initialized");
    Ok(())
}

/// Registers the metric groups with the default Prometheus registry.
pub fn init_metrics() -> Result<()> {
    Lazy::force(&PREDICTION_METRICS);
    Ok(())
}

/// Layered config: struct defaults, then the file named by `HEALTHRISK_CONFIG_FILE`,
/// then `HEALTHRISK__*` environment variables.
pub fn load_config<T: DeserializeOwned>(service: &str) -> Result<T> {
    let file = std::env::var(CONFIG_FILE_ENV).ok();
    load_config_from(service, file.as_deref().map(Path::new))
}

pub fn load_config_from<T: DeserializeOwned>(service: &str, file: Option<&Path>) -> Result<T> {
    let mut builder = config::Config::builder().set_default("service_name", service)?;
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder.build()?;
    Ok(cfg.try_deserialize()?)
}

/// `/live`, `/ready`, `/status` and `/metrics`. Merge into a service router after `with_state`.
pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(ready_handler))
        .route("/status", get(|| async {
            let mut body = STATUS_FIELDS.read().clone();
            body.insert("live".into(), NODE_LIVENESS.load(Ordering::SeqCst).into());
            body.insert("ready".into(), is_ready().into());
            Json(serde_json::Value::Object(body))
        }))
        .route("/metrics", get(metrics_handler))
}

async fn ready_handler() -> (StatusCode, Json<serde_json::Value>) {
    let ready = is_ready();
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(serde_json::json!({"ready": ready})))
}

async fn metrics_handler() -> Response {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        let mut resp = Response::new(Body::from(format!("encode error: {e}")));
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return resp;
    }
    let mut resp = Response::new(Body::from(buf));
    if let Ok(ct) = header::HeaderValue::from_str(TextEncoder::new().format_type()) {
        resp.headers_mut().insert(header::CONTENT_TYPE, ct);
    }
    resp
}

/// Resolves on Ctrl-C; used for graceful shutdown.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error=?e, "ctrl_c handler failed");
    }
    clear_ready();
    info!("shutdown signal received");
}
