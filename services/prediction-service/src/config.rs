use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which optional outputs the form offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputToggles {
    /// Run `model_exact` when the artifact has one.
    pub exact_cause: bool,
    pub evaluation_report: bool,
    pub category_debug: bool,
    pub history: bool,
    /// Master switch; each submission can still opt out.
    pub log_predictions: bool,
}

impl Default for OutputToggles {
    fn default() -> Self {
        Self { exact_cause: true, evaluation_report: true, category_debug: false, history: true, log_predictions: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service_name: String,
    pub bind_addr: String,
    pub artifact_path: PathBuf,
    pub artifact_sha256: Option<String>,
    pub log_path: PathBuf,
    pub history_limit: usize,
    pub log_level: String,
    pub outputs: OutputToggles,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: Self::SERVICE.into(),
            bind_addr: "0.0.0.0:8080".into(),
            artifact_path: PathBuf::from("cause_and_exact_pipeline.json"),
            artifact_sha256: None,
            log_path: PathBuf::from("predictions_log.csv"),
            history_limit: 50,
            log_level: "info".into(),
            outputs: OutputToggles::default(),
        }
    }
}

impl ServiceConfig {
    pub const SERVICE: &'static str = "prediction-service";

    pub fn load() -> anyhow::Result<Self> { healthrisk_core::load_config(Self::SERVICE) }
}
