//! Turns raw form fields into the single-row record the models expect.
//!
//! The age bucket is derived from the numeric age unless the caller picked
//! one explicitly. When the artifact's models consume integer-coded
//! categoricals every categorical value is translated through its fitted
//! encoder; a value the encoder never saw is an error, never code 0.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::categories::Categories;
use crate::error::{Error, Result};

pub const MAX_AGE: u32 = 120;

/// Model schema columns, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Column {
    Age,
    Gender,
    Location,
    AgeGroup,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Age, Column::Gender, Column::Location, Column::AgeGroup];
    pub const CATEGORICAL: [Column; 3] = [Column::Gender, Column::Location, Column::AgeGroup];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Age => "AGE",
            Column::Gender => "GENDER",
            Column::Location => "LOCATION",
            Column::AgeGroup => "AGE_GROUP",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    Infant,
    Youth,
    Adult,
    MiddleAged,
    Senior,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 5] = [AgeBucket::Infant, AgeBucket::Youth, AgeBucket::Adult, AgeBucket::MiddleAged, AgeBucket::Senior];

    pub fn as_str(self) -> &'static str {
        match self {
            AgeBucket::Infant => "0-5",
            AgeBucket::Youth => "6-18",
            AgeBucket::Adult => "19-40",
            AgeBucket::MiddleAged => "41-60",
            AgeBucket::Senior => "60+",
        }
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Upper bounds are inclusive: 5 is "0-5", 6 is "6-18", 60 is "41-60".
pub fn derive_age_group(age: u32) -> AgeBucket {
    match age {
        0..=5 => AgeBucket::Infant,
        6..=18 => AgeBucket::Youth,
        19..=40 => AgeBucket::Adult,
        41..=60 => AgeBucket::MiddleAged,
        _ => AgeBucket::Senior,
    }
}

/// What the user submitted. `age_group: None` means derive it from `age`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub age: u32,
    pub gender: String,
    pub location: String,
    #[serde(default)]
    pub age_group: Option<String>,
}

impl InputRecord {
    pub fn new(age: u32, gender: impl Into<String>, location: impl Into<String>) -> Self {
        Self { age, gender: gender.into(), location: location.into(), age_group: None }
    }

    pub fn with_age_group(mut self, age_group: impl Into<String>) -> Self {
        self.age_group = Some(age_group.into());
        self
    }

    pub fn is_derived(&self) -> bool { self.age_group.is_none() }

    pub fn resolved_age_group(&self) -> String {
        match &self.age_group {
            Some(g) => g.clone(),
            None => derive_age_group(self.age).as_str().to_string(),
        }
    }
}

/// Integer codes assigned by the fitted encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedCodes {
    #[serde(rename = "GENDER")]
    pub gender: usize,
    #[serde(rename = "LOCATION")]
    pub location: usize,
    #[serde(rename = "AGE_GROUP")]
    pub age_group: usize,
}

/// One row in model schema order. Serializes as
/// `{"AGE":30,"GENDER":"F","LOCATION":"Urban","AGE_GROUP":"19-40"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    #[serde(rename = "AGE")]
    pub age: u32,
    #[serde(rename = "GENDER")]
    pub gender: String,
    #[serde(rename = "LOCATION")]
    pub location: String,
    #[serde(rename = "AGE_GROUP")]
    pub age_group: String,
    #[serde(rename = "CODES", skip_serializing_if = "Option::is_none")]
    pub codes: Option<EncodedCodes>,
}

impl NormalizedRecord {
    /// Raw textual value of a column, as the rules model compares it.
    pub fn raw(&self, column: Column) -> String {
        match column {
            Column::Age => self.age.to_string(),
            Column::Gender => self.gender.clone(),
            Column::Location => self.location.clone(),
            Column::AgeGroup => self.age_group.clone(),
        }
    }

    /// Numeric feature value; categoricals are only numeric once encoded.
    pub fn feature(&self, column: Column) -> Option<f64> {
        match column {
            Column::Age => Some(f64::from(self.age)),
            Column::Gender => self.codes.map(|c| c.gender as f64),
            Column::Location => self.codes.map(|c| c.location as f64),
            Column::AgeGroup => self.codes.map(|c| c.age_group as f64),
        }
    }
}

pub struct Normalizer<'a> {
    categories: &'a Categories,
    encode: bool,
}

impl<'a> Normalizer<'a> {
    pub fn new(categories: &'a Categories, encode: bool) -> Self { Self { categories, encode } }

    pub fn normalize(&self, input: &InputRecord) -> Result<NormalizedRecord> {
        if input.age > MAX_AGE {
            return Err(Error::InvalidInput(format!("age must be between 0 and {MAX_AGE}, got {}", input.age)));
        }
        let gender = required(Column::Gender, &input.gender)?;
        let location = required(Column::Location, &input.location)?;
        let age_group = input.resolved_age_group();
        let age_group = required(Column::AgeGroup, &age_group)?;

        let codes = if self.encode {
            Some(EncodedCodes {
                gender: self.categories.encode(Column::Gender, gender)?,
                location: self.categories.encode(Column::Location, location)?,
                age_group: self.categories.encode(Column::AgeGroup, age_group)?,
            })
        } else {
            None
        };

        Ok(NormalizedRecord {
            age: input.age,
            gender: gender.to_string(),
            location: location.to_string(),
            age_group: age_group.to_string(),
            codes,
        })
    }
}

fn required(column: Column, value: &str) -> Result<&str> {
    let v = value.trim();
    if v.is_empty() {
        return Err(Error::InvalidInput(format!("{column} is required")));
    }
    Ok(v)
}
