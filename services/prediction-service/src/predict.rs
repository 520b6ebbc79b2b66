use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument, warn};

use healthrisk_core::PREDICTION_METRICS;

use crate::artifact::ModelArtifact;
use crate::config::{OutputToggles, ServiceConfig};
use crate::error::{Error, Result};
use crate::history::{LogEntry, PredictionLog};
use crate::normalize::{InputRecord, NormalizedRecord, Normalizer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionResult {
    pub cause_group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_exact: Option<String>,
    pub record: NormalizedRecord,
}

impl PredictionResult {
    pub fn messages(&self) -> Vec<String> {
        let mut out = vec![format!("Predicted Cause Group: {}", self.cause_group)];
        if let Some(exact) = &self.cause_exact {
            out.push(format!("Predicted Exact Cause: {exact}"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LogStatus {
    Skipped,
    Logged,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub log: LogStatus,
}

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Debug)]
pub struct ServiceContext {
    artifact: ModelArtifact,
    toggles: OutputToggles,
    log: PredictionLog,
    history_limit: usize,
}

impl ServiceContext {
    pub fn new(artifact: ModelArtifact, cfg: &ServiceConfig) -> Self {
        let toggles = cfg.outputs;
        if toggles.exact_cause && artifact.exact.is_none() {
            warn!("exact cause output enabled but the artifact has no model_exact");
        }
        let with_exact = toggles.exact_cause && artifact.exact.is_some();
        Self { artifact, toggles, log: PredictionLog::new(&cfg.log_path, with_exact), history_limit: cfg.history_limit }
    }

    pub fn load(cfg: &ServiceConfig) -> Result<Self> {
        let artifact = ModelArtifact::load(&cfg.artifact_path, cfg.artifact_sha256.as_deref())?;
        Ok(Self::new(artifact, cfg))
    }

    pub fn artifact(&self) -> &ModelArtifact { &self.artifact }
    pub fn toggles(&self) -> OutputToggles { self.toggles }
    pub fn log(&self) -> &PredictionLog { &self.log }

    pub fn exact_enabled(&self) -> bool { self.toggles.exact_cause && self.artifact.exact.is_some() }

    pub fn normalize(&self, input: &InputRecord) -> Result<NormalizedRecord> {
        Normalizer::new(&self.artifact.categories, self.artifact.requires_encoding()).normalize(input)
    }

    /// Pure inference: same input and artifact, same result.
    #[instrument(skip(self), fields(age = input.age))]
    pub fn predict(&self, input: &InputRecord) -> Result<PredictionResult> {
        let start = Instant::now();
        let outcome = self.predict_inner(input);
        PREDICTION_METRICS.prediction_latency_ms.observe(start.elapsed().as_secs_f64() * 1000.0);
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        PREDICTION_METRICS.predictions_total.with_label_values(&[label]).inc();
        outcome
    }

    fn predict_inner(&self, input: &InputRecord) -> Result<PredictionResult> {
        let record = self.normalize(input)?;
        let cause_group = self.artifact.group.predict_label(&record)?;
        let cause_exact = match (&self.artifact.exact, self.toggles.exact_cause) {
            (Some(model), true) => Some(model.predict_label(&record)?),
            _ => None,
        };
        Ok(PredictionResult { cause_group, cause_exact, record })
    }

    /// Predicts and, when requested and allowed, appends the log row.
    /// A failed append is reported alongside the prediction rather than replacing it.
    pub async fn submit(&self, input: InputRecord, log_requested: bool) -> Result<Submission> {
        let result = self.predict(&input)?;
        let log = if log_requested && self.toggles.log_predictions {
            let entry = LogEntry::from_result(&result, chrono::Local::now());
            let log = self.log.clone();
            let appended = tokio::task::spawn_blocking(move || log.append(&entry))
                .await
                .map_err(|e| Error::Log(e.to_string()))
                .and_then(|r| r);
            match appended {
                Ok(()) => {
                    PREDICTION_METRICS.log_appends_total.with_label_values(&["ok"]).inc();
                    LogStatus::Logged
                }
                Err(e) => {
                    PREDICTION_METRICS.log_appends_total.with_label_values(&["error"]).inc();
                    warn!(error = %e, "prediction_log_failed");
                    LogStatus::Failed(e.to_string())
                }
            }
        } else {
            LogStatus::Skipped
        };
        info!(cause_group = %result.cause_group, cause_exact = ?result.cause_exact, log = ?log, "prediction_served");
        Ok(Submission { result, log })
    }

    /// Last `history_limit` log rows, `None` if nothing was logged yet.
    pub async fn history(&self) -> Result<Option<Vec<LogEntry>>> {
        let log = self.log.clone();
        let limit = self.history_limit;
        tokio::task::spawn_blocking(move || log.read_tail(limit))
            .await
            .map_err(|e| Error::Log(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{Categories, CategoryMapping};
    use crate::classifier::{ClassValue, Classifier, Estimator, TargetModel};
    use crate::normalize::Column;
    use std::sync::Arc;

    #[derive(Debug)]
    struct AlwaysCardio;

    impl Classifier for AlwaysCardio {
        fn predict(&self, _row: &NormalizedRecord) -> Result<ClassValue> {
            Ok(ClassValue::Label("Cardiovascular".into()))
        }
    }

    fn config(dir: &std::path::Path) -> ServiceConfig {
        ServiceConfig { log_path: dir.join("predictions_log.csv"), ..ServiceConfig::default() }
    }

    #[test]
    fn same_input_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::new(ModelArtifact::new(TargetModel::new(AlwaysCardio)), &config(dir.path()));
        let input = InputRecord::new(30, "F", "Urban");
        let a = ctx.predict(&input).unwrap();
        let b = ctx.predict(&input).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.messages(), vec!["Predicted Cause Group: Cardiovascular"]);
    }

    #[test]
    fn exact_model_respects_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = || {
            ModelArtifact::new(TargetModel::new(AlwaysCardio))
                .with_exact(TargetModel::new(Estimator::Constant { value: ClassValue::Code(0) }).with_labels(["Stroke"]))
        };
        let ctx = ServiceContext::new(artifact(), &config(dir.path()));
        let res = ctx.predict(&InputRecord::new(70, "M", "Rural")).unwrap();
        assert_eq!(res.cause_exact.as_deref(), Some("Stroke"));
        assert_eq!(res.messages()[1], "Predicted Exact Cause: Stroke");

        let mut cfg = config(dir.path());
        cfg.outputs.exact_cause = false;
        let ctx = ServiceContext::new(artifact(), &cfg);
        assert!(!ctx.exact_enabled());
        assert_eq!(ctx.predict(&InputRecord::new(70, "M", "Rural")).unwrap().cause_exact, None);
        assert_eq!(ctx.log().columns().len(), 6);
    }

    #[test]
    fn unseen_category_surfaces_through_predict() {
        let dir = tempfile::tempdir().unwrap();
        let mut cats = Categories::default();
        cats.insert(Column::Gender, CategoryMapping::encoded(["F", "M"]));
        cats.insert(Column::Location, CategoryMapping::encoded(["Urban"]));
        cats.insert(Column::AgeGroup, CategoryMapping::encoded(["19-40"]));
        let tree = Estimator::Tree { nodes: vec![crate::classifier::TreeNode::Leaf { value: ClassValue::Label("x".into()) }] };
        let ctx = ServiceContext::new(ModelArtifact::new(TargetModel::new(tree)).with_categories(cats), &config(dir.path()));
        let err = ctx.predict(&InputRecord::new(30, "F", "Rural")).unwrap_err();
        assert!(matches!(err, Error::EncodingKeyMissing { field: Column::Location, .. }));
        assert!(!err.halts_session());
    }

    #[tokio::test]
    async fn submit_logs_one_matching_row() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ServiceContext::new(ModelArtifact::new(TargetModel::new(AlwaysCardio)), &config(dir.path())));
        let sub = ctx.submit(InputRecord::new(30, "F", "Urban"), true).await.unwrap();
        assert_eq!(sub.log, LogStatus::Logged);
        let rows = ctx.history().await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].age, rows[0].gender.as_str(), rows[0].location.as_str()), (30, "F", "Urban"));
        assert_eq!(rows[0].age_group, "19-40");
        assert_eq!(rows[0].cause_group, "Cardiovascular");
    }

    #[tokio::test]
    async fn submit_without_logging_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ServiceContext::new(ModelArtifact::new(TargetModel::new(AlwaysCardio)), &config(dir.path())));
        let sub = ctx.submit(InputRecord::new(30, "F", "Urban"), false).await.unwrap();
        assert_eq!(sub.log, LogStatus::Skipped);
        assert_eq!(ctx.history().await.unwrap(), None);
    }

    #[tokio::test]
    async fn log_failure_keeps_the_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig { log_path: dir.path().join("missing-dir").join("log.csv"), ..ServiceConfig::default() };
        let ctx = Arc::new(ServiceContext::new(ModelArtifact::new(TargetModel::new(AlwaysCardio)), &cfg));
        let sub = ctx.submit(InputRecord::new(30, "F", "Urban"), true).await.unwrap();
        assert_eq!(sub.result.cause_group, "Cardiovascular");
        assert!(matches!(sub.log, LogStatus::Failed(_)));
    }
}
