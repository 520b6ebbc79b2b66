//! Loads the offline-trained model bundle.
//!
//! The bundle carries the cause-group model, an optional exact-cause model,
//! per-column category mappings and the evaluation reports produced at
//! training time. It is read once at startup and never mutated.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::categories::Categories;
use crate::classifier::{ModelSpec, TargetModel};
use crate::error::{Error, Result};
use crate::report::EvaluationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Yaml,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => ArtifactFormat::Yaml,
            _ => ArtifactFormat::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    model_group: ModelSpec,
    #[serde(default)]
    model_exact: Option<ModelSpec>,
    #[serde(default)]
    categories: Categories,
    #[serde(default)]
    eval_group: Option<EvaluationReport>,
    #[serde(default)]
    eval_exact: Option<EvaluationReport>,
}

#[derive(Debug)]
pub struct ModelArtifact {
    pub group: TargetModel,
    pub exact: Option<TargetModel>,
    pub categories: Categories,
    pub eval_group: Option<EvaluationReport>,
    pub eval_exact: Option<EvaluationReport>,
    /// Hex SHA-256 of the file bytes, empty for in-memory artifacts.
    pub digest: String,
}

impl ModelArtifact {
    pub fn new(group: TargetModel) -> Self {
        Self { group, exact: None, categories: Categories::default(), eval_group: None, eval_exact: None, digest: String::new() }
    }

    pub fn with_exact(mut self, exact: TargetModel) -> Self {
        self.exact = Some(exact);
        self
    }

    pub fn with_categories(mut self, categories: Categories) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_reports(mut self, group: Option<EvaluationReport>, exact: Option<EvaluationReport>) -> Self {
        self.eval_group = group;
        self.eval_exact = exact;
        self
    }

    /// Reads and validates the bundle. `expected_sha256` pins the file contents.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ArtifactNotFound(path.to_path_buf()),
            _ => Error::ArtifactLoad(e.to_string()),
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));
        if let Some(expect) = expected_sha256.map(str::trim).filter(|s| !s.is_empty()) {
            if !expect.eq_ignore_ascii_case(&digest) {
                return Err(Error::ArtifactLoad(format!("artifact hash mismatch expected={expect} got={digest}")));
            }
        }
        let mut artifact = Self::from_slice(&bytes, ArtifactFormat::from_path(path))?;
        artifact.digest = digest;
        info!(
            digest = %artifact.digest,
            exact_model = artifact.exact.is_some(),
            encoded_inputs = artifact.requires_encoding(),
            "artifact_loaded"
        );
        Ok(artifact)
    }

    pub fn from_slice(bytes: &[u8], format: ArtifactFormat) -> Result<Self> {
        let file: ArtifactFile = match format {
            ArtifactFormat::Json => serde_json::from_slice(bytes).map_err(|e| Error::ArtifactLoad(e.to_string()))?,
            ArtifactFormat::Yaml => serde_yaml::from_slice(bytes).map_err(|e| Error::ArtifactLoad(e.to_string()))?,
        };
        let group = TargetModel::try_from(file.model_group).map_err(|e| Error::ArtifactLoad(format!("model_group: {e}")))?;
        let exact = file
            .model_exact
            .map(TargetModel::try_from)
            .transpose()
            .map_err(|e| Error::ArtifactLoad(format!("model_exact: {e}")))?;
        let artifact = ModelArtifact {
            group,
            exact,
            categories: file.categories,
            eval_group: file.eval_group,
            eval_exact: file.eval_exact,
            digest: String::new(),
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// True when any model reads integer-coded categoricals.
    pub fn requires_encoding(&self) -> bool {
        self.group.requires_encoding() || self.exact.as_ref().map(TargetModel::requires_encoding).unwrap_or(false)
    }

    fn validate(&self) -> Result<()> {
        if self.requires_encoding() {
            let missing = self.categories.missing_encoders();
            if !missing.is_empty() {
                let cols: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
                return Err(Error::ArtifactLoad(format!(
                    "models expect encoded inputs but no encoder is stored for {}",
                    cols.join(", ")
                )));
            }
        }
        if self.eval_group.as_ref().map(EvaluationReport::is_empty).unwrap_or(false) {
            warn!("eval_group present but empty");
        }
        Ok(())
    }
}
