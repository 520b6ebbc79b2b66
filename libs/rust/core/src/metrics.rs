//! Prometheus metric groups shared by the prediction services.

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};

pub struct PredictionMetrics {
    /// Labelled by `outcome`: ok, invalid_input, encoding_key_missing, prediction_error, unavailable.
    pub predictions_total: IntCounterVec,
    pub prediction_latency_ms: Histogram,
    /// Labelled by `result`: ok, error.
    pub log_appends_total: IntCounterVec,
}

pub static PREDICTION_METRICS: Lazy<PredictionMetrics> = Lazy::new(|| PredictionMetrics {
    predictions_total: register_int_counter_vec!(
        "healthrisk_predictions_total",
        "Prediction requests by outcome",
        &["outcome"]
    )
    .expect("predictions_total registration"),
    prediction_latency_ms: register_histogram!(
        "healthrisk_prediction_latency_ms",
        "Normalize + inference latency (ms)",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0]
    )
    .expect("prediction_latency_ms registration"),
    log_appends_total: register_int_counter_vec!(
        "healthrisk_log_appends_total",
        "Prediction log appends by result",
        &["result"]
    )
    .expect("log_appends_total registration"),
});
