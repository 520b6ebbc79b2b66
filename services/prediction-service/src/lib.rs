//! Demographic cause-of-death prediction service.
//!
//! A pre-trained artifact is loaded once; each form submission is normalized,
//! classified, optionally logged to CSV and rendered back as HTML.

pub mod artifact;
pub mod categories;
pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod normalize;
pub mod predict;
pub mod render;
pub mod report;
pub mod web;

pub use artifact::ModelArtifact;
pub use classifier::{ClassValue, Classifier, TargetModel};
pub use config::{OutputToggles, ServiceConfig};
pub use error::{Error, Result};
pub use normalize::{derive_age_group, InputRecord, NormalizedRecord};
pub use predict::{PredictionResult, ServiceContext};
pub use report::EvaluationReport;
pub use web::{router, AppState};
