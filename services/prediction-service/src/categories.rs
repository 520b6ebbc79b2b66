//! Per-column category mappings stored in the artifact.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::normalize::{AgeBucket, Column};

/// A fitted label encoder: `classes[code]` is the value, the index is the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    codes: HashMap<String, usize>,
}

impl LabelEncoder {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        let codes = classes.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        Self { classes, codes }
    }

    pub fn code(&self, value: &str) -> Option<usize> { self.codes.get(value).copied() }

    pub fn value(&self, code: u64) -> Option<&str> {
        usize::try_from(code).ok().and_then(|i| self.classes.get(i)).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] { &self.classes }
}

/// How a categorical column is represented, chosen once when the artifact loads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawMapping")]
pub enum CategoryMapping {
    /// Plain option list, only used to populate the form.
    Options(Vec<String>),
    /// Fitted encoder; models see the integer code.
    Encoded(LabelEncoder),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMapping {
    Options(Vec<String>),
    Encoder { classes: Vec<String> },
}

impl From<RawMapping> for CategoryMapping {
    fn from(raw: RawMapping) -> Self {
        match raw {
            RawMapping::Options(list) => CategoryMapping::Options(list),
            RawMapping::Encoder { classes } => CategoryMapping::Encoded(LabelEncoder::new(classes)),
        }
    }
}

impl CategoryMapping {
    pub fn encoded<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryMapping::Encoded(LabelEncoder::new(classes))
    }

    pub fn options<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryMapping::Options(values.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[String] {
        match self {
            CategoryMapping::Options(v) => v,
            CategoryMapping::Encoded(enc) => enc.classes(),
        }
    }

    pub fn is_encoded(&self) -> bool { matches!(self, CategoryMapping::Encoded(_)) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Categories(BTreeMap<Column, CategoryMapping>);

impl Categories {
    pub fn insert(&mut self, column: Column, mapping: CategoryMapping) { self.0.insert(column, mapping); }

    pub fn get(&self, column: Column) -> Option<&CategoryMapping> { self.0.get(&column) }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &CategoryMapping)> { self.0.iter().map(|(c, m)| (*c, m)) }

    /// Form choices for a column, falling back to the built-in defaults.
    pub fn options(&self, column: Column) -> Vec<String> {
        if let Some(m) = self.0.get(&column) {
            if !m.values().is_empty() {
                return m.values().to_vec();
            }
        }
        match column {
            Column::Gender => vec!["M".into(), "F".into()],
            Column::Location => vec!["Unknown".into()],
            Column::AgeGroup => AgeBucket::ALL.iter().map(|b| b.as_str().to_string()).collect(),
            Column::Age => Vec::new(),
        }
    }

    pub fn encode(&self, column: Column, value: &str) -> Result<usize> {
        match self.0.get(&column) {
            Some(CategoryMapping::Encoded(enc)) => enc
                .code(value)
                .ok_or_else(|| Error::EncodingKeyMissing { field: column, value: value.to_string() }),
            _ => Err(Error::Prediction(format!("{column} has no fitted encoder"))),
        }
    }

    /// Columns a code-consuming model needs but the artifact left unencoded.
    pub fn missing_encoders(&self) -> Vec<Column> {
        Column::CATEGORICAL
            .into_iter()
            .filter(|c| !self.0.get(c).map(CategoryMapping::is_encoded).unwrap_or(false))
            .collect()
    }
}
