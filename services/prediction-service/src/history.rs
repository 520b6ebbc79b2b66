//! Append-only CSV log of submitted predictions.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::predict::PredictionResult;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BASE_COLUMNS: [&str; 6] = ["timestamp", "age", "gender", "location", "age_group", "cause_group"];
const EXACT_COLUMN: &str = "cause_exact";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub age: u32,
    pub gender: String,
    pub location: String,
    pub age_group: String,
    pub cause_group: String,
    #[serde(default)]
    pub cause_exact: Option<String>,
}

impl LogEntry {
    pub fn from_result(result: &PredictionResult, at: DateTime<Local>) -> Self {
        Self {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            age: result.record.age,
            gender: result.record.gender.clone(),
            location: result.record.location.clone(),
            age_group: result.record.age_group.clone(),
            cause_group: result.cause_group.clone(),
            cause_exact: result.cause_exact.clone(),
        }
    }
}

/// Appends are serialized through one lock held across open, write and flush,
/// so concurrent submissions never interleave rows.
#[derive(Debug, Clone)]
pub struct PredictionLog {
    path: PathBuf,
    with_exact: bool,
    lock: Arc<Mutex<()>>,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>, with_exact: bool) -> Self {
        Self { path: path.into(), with_exact, lock: Arc::new(Mutex::new(())) }
    }

    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = BASE_COLUMNS.to_vec();
        if self.with_exact {
            cols.push(EXACT_COLUMN);
        }
        cols
    }

    /// Blocking; call from `spawn_blocking` inside async handlers.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let _guard = self.lock.lock();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Log(format!("{}: {e}", self.path.display())))?;
        let fresh = file.metadata().map(|m| m.len() == 0).map_err(|e| Error::Log(e.to_string()))?;
        // an existing file keeps the layout its header was written with
        let with_exact = if fresh { self.with_exact } else { self.file_has_exact_column()? };
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if fresh {
            writer.write_record(self.columns())?;
        }
        let age = entry.age.to_string();
        let mut record = vec![
            entry.timestamp.as_str(),
            age.as_str(),
            entry.gender.as_str(),
            entry.location.as_str(),
            entry.age_group.as_str(),
            entry.cause_group.as_str(),
        ];
        if with_exact {
            record.push(entry.cause_exact.as_deref().unwrap_or(""));
        }
        writer.write_record(&record)?;
        writer.flush().map_err(|e| Error::Log(e.to_string()))?;
        debug!(path = %self.path.display(), fresh, "prediction_logged");
        Ok(())
    }

    fn file_has_exact_column(&self) -> Result<bool> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        Ok(reader.headers()?.iter().any(|h| h == EXACT_COLUMN))
    }

    /// `None` when nothing has been logged yet.
    pub fn read_all(&self) -> Result<Option<Vec<LogEntry>>> {
        self.read_tail(usize::MAX)
    }

    /// The last `limit` rows in file order.
    pub fn read_tail(&self, limit: usize) -> Result<Option<Vec<LogEntry>>> {
        let _guard = self.lock.lock();
        let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(&self.path) {
            Ok(r) => r,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    if io.kind() == ErrorKind::NotFound {
                        return Ok(None);
                    }
                }
                return Err(e.into());
            }
        };
        let mut rows = VecDeque::new();
        for row in reader.deserialize::<LogEntry>() {
            rows.push_back(row?);
            if rows.len() > limit {
                rows.pop_front();
            }
        }
        Ok(Some(rows.into()))
    }
}
