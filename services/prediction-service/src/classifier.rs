//! Fitted estimators carried by the artifact, and the decoding wrapper around them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::categories::LabelEncoder;
use crate::error::{Error, Result};
use crate::normalize::{Column, NormalizedRecord};

/// What a classifier emits: an integer class code or the label itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassValue {
    Code(u64),
    Label(String),
}

impl fmt::Display for ClassValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassValue::Code(c) => write!(f, "{c}"),
            ClassValue::Label(l) => f.write_str(l),
        }
    }
}

/// Single-row inference.
pub trait Classifier: Send + Sync + fmt::Debug {
    fn predict(&self, row: &NormalizedRecord) -> Result<ClassValue>;

    /// True when the model reads integer-coded categoricals.
    fn requires_encoding(&self) -> bool { false }
}

/// Right-hand side of a rule condition, compared against the raw column text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Integer(n) => write!(f, "{n}"),
            Condition::Number(x) => write!(f, "{x}"),
            Condition::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule {
    pub when: BTreeMap<Column, Condition>,
    pub value: ClassValue,
}

impl Rule {
    fn matches(&self, row: &NormalizedRecord) -> bool {
        self.when.iter().all(|(col, want)| row.raw(*col) == want.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split { feature: Column, threshold: f64, left: usize, right: usize },
    Leaf { value: ClassValue },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Constant { value: ClassValue },
    Rules { rules: Vec<Rule>, default: ClassValue },
    Tree { nodes: Vec<TreeNode> },
}

impl Estimator {
    /// Structural checks done once at load time.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let Estimator::Tree { nodes } = self else { return Ok(()) };
        if nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, threshold, .. } = node {
                for child in [*left, *right] {
                    if child <= idx || child >= nodes.len() {
                        return Err(format!("node {idx} points at invalid child {child}"));
                    }
                }
                if !threshold.is_finite() {
                    return Err(format!("node {idx} has a non-finite threshold"));
                }
            }
        }
        Ok(())
    }
}

impl Classifier for Estimator {
    fn predict(&self, row: &NormalizedRecord) -> Result<ClassValue> {
        match self {
            Estimator::Constant { value } => Ok(value.clone()),
            Estimator::Rules { rules, default } => Ok(rules
                .iter()
                .find(|r| r.matches(row))
                .map(|r| r.value.clone())
                .unwrap_or_else(|| default.clone())),
            Estimator::Tree { nodes } => {
                let mut idx = 0usize;
                // children always sit after their parent, so this bound is never hit on validated trees
                for _ in 0..nodes.len() {
                    match nodes.get(idx) {
                        Some(TreeNode::Leaf { value }) => return Ok(value.clone()),
                        Some(TreeNode::Split { feature, threshold, left, right }) => {
                            let x = row
                                .feature(*feature)
                                .ok_or_else(|| Error::Prediction(format!("feature {feature} is not encoded")))?;
                            idx = if x <= *threshold { *left } else { *right };
                        }
                        None => break,
                    }
                }
                Err(Error::Prediction(format!("tree walk ended without a leaf at node {idx}")))
            }
        }
    }

    fn requires_encoding(&self) -> bool { matches!(self, Estimator::Tree { .. }) }
}

/// Artifact form of one target model: the estimator plus its target label encoder.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    #[serde(flatten)]
    pub estimator: Estimator,
    #[serde(default)]
    pub classes: Option<Vec<String>>,
}

/// A classifier together with the mapping that turns its codes back into labels.
#[derive(Debug)]
pub struct TargetModel {
    classifier: Box<dyn Classifier>,
    labels: Option<LabelEncoder>,
}

impl TargetModel {
    pub fn new(classifier: impl Classifier + 'static) -> Self {
        Self { classifier: Box::new(classifier), labels: None }
    }

    pub fn with_labels<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(LabelEncoder::new(classes));
        self
    }

    pub fn requires_encoding(&self) -> bool { self.classifier.requires_encoding() }

    pub fn labels(&self) -> Option<&LabelEncoder> { self.labels.as_ref() }

    /// Runs inference and decodes integer output; labels pass through.
    pub fn predict_label(&self, row: &NormalizedRecord) -> Result<String> {
        match self.classifier.predict(row)? {
            ClassValue::Label(label) => Ok(label),
            ClassValue::Code(code) => {
                let labels = self
                    .labels
                    .as_ref()
                    .ok_or_else(|| Error::Prediction(format!("model emitted class code {code} but the artifact has no label mapping")))?;
                labels
                    .value(code)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Prediction(format!("class code {code} is outside the label mapping ({} classes)", labels.classes().len())))
            }
        }
    }
}

impl TryFrom<ModelSpec> for TargetModel {
    type Error = String;

    fn try_from(spec: ModelSpec) -> std::result::Result<Self, Self::Error> {
        spec.estimator.validate()?;
        let model = TargetModel::new(spec.estimator);
        Ok(match spec.classes {
            Some(classes) => model.with_labels(classes),
            None => model,
        })
    }
}
