//! Precomputed evaluation reports (classification-report shaped).

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    #[serde(default)]
    pub precision: Option<f64>,
    #[serde(default)]
    pub recall: Option<f64>,
    #[serde(default, rename = "f1-score")]
    pub f1_score: Option<f64>,
    #[serde(default)]
    pub support: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Precision,
    Recall,
    F1Score,
    Support,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Precision, Metric::Recall, Metric::F1Score, Metric::Support];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1Score => "f1-score",
            Metric::Support => "support",
        }
    }
}

impl ClassMetrics {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::F1Score => self.f1_score,
            Metric::Support => self.support,
        }
    }
}

/// A report row is either per-class metrics or a scalar such as `accuracy`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportRow {
    Scalar(f64),
    Class(ClassMetrics),
}

/// Rows in the order the training pipeline wrote them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationReport {
    rows: Vec<(String, ReportRow)>,
}

impl EvaluationReport {
    pub fn new(rows: Vec<(String, ReportRow)>) -> Self { Self { rows } }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn class_rows(&self) -> impl Iterator<Item = (&str, &ClassMetrics)> {
        self.rows.iter().filter_map(|(name, row)| match row {
            ReportRow::Class(m) => Some((name.as_str(), m)),
            ReportRow::Scalar(_) => None,
        })
    }

    pub fn scalar_rows(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rows.iter().filter_map(|(name, row)| match row {
            ReportRow::Scalar(v) => Some((name.as_str(), *v)),
            ReportRow::Class(_) => None,
        })
    }

    /// Only the metric columns at least one class row carries.
    pub fn columns(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| self.class_rows().any(|(_, row)| row.get(*m).is_some()))
            .collect()
    }
}

/// Rounded to three decimals; whole supports print without a fraction.
pub fn format_metric(metric: Metric, value: f64) -> String {
    if metric == Metric::Support && value.fract() == 0.0 {
        return format!("{value:.0}");
    }
    format!("{value:.3}")
}

impl<'de> Deserialize<'de> for EvaluationReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = EvaluationReport;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of class name to metrics")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut rows = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, row)) = map.next_entry::<String, ReportRow>()? {
                    rows.push((name, row));
                }
                Ok(EvaluationReport { rows })
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Respiratory": {"precision": 0.5, "recall": 0.25, "f1-score": 0.3333333, "support": 4.0},
        "Cardiovascular": {"precision": 0.8123, "recall": 0.9, "f1-score": 0.85, "support": 10},
        "accuracy": 0.7142857,
        "macro avg": {"precision": 0.65, "recall": 0.575, "f1-score": 0.59, "support": 14}
    }"#;

    #[test]
    fn keeps_file_order_and_splits_scalars() {
        let report: EvaluationReport = serde_json::from_str(SAMPLE).unwrap();
        let names: Vec<_> = report.class_rows().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Respiratory", "Cardiovascular", "macro avg"]);
        let scalars: Vec<_> = report.scalar_rows().collect();
        assert_eq!(scalars.len(), 1);
        assert_eq!(scalars[0].0, "accuracy");
    }

    #[test]
    fn columns_follow_what_is_present() {
        let report: EvaluationReport = serde_json::from_str(r#"{"A": {"precision": 1.0}, "B": {"recall": 0.5}}"#).unwrap();
        assert_eq!(report.columns(), vec![Metric::Precision, Metric::Recall]);
    }

    #[test]
    fn rounding() {
        assert_eq!(format_metric(Metric::Precision, 0.8123), "0.812");
        assert_eq!(format_metric(Metric::Support, 10.0), "10");
        assert_eq!(format_metric(Metric::Support, 2.5), "2.500");
    }
}
