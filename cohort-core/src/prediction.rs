//! Prediction records and mutation payloads.

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::Timestamp;

/// Risk classification produced by the prediction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Good,
    Average,
    #[serde(rename = "At Risk")]
    AtRisk,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Good => "Good",
            RiskLevel::Average => "Average",
            RiskLevel::AtRisk => "At Risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored prediction, as listed by history and dashboard views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    /// ISO-8601 timestamp as written by the backend (may lack an offset).
    pub timestamp: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
}

impl PredictionRecord {
    /// Parse `timestamp`, accepting RFC 3339 or a naive local form treated as UTC.
    pub fn recorded_at(&self) -> Option<Timestamp> {
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

/// A page of prediction history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionPage {
    pub items: Vec<PredictionRecord>,
    pub total: u32,
}

/// Request body for creating a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInput {
    pub student_id: String,
    pub student_name: String,
    pub attendance_percentage: f64,
    pub internal_marks: f64,
    pub assignment_score: f64,
    pub study_hours_per_day: f64,
}

impl StudentInput {
    /// Reject inputs the backend would refuse, before any request is sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let id_len = self.student_id.chars().count();
        if id_len == 0 || id_len > 20 {
            return Err(ValidationError::InvalidValue {
                field: "student_id".to_string(),
                reason: "must be 1-20 characters".to_string(),
            });
        }
        if !self
            .student_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidValue {
                field: "student_id".to_string(),
                reason: "must be alphanumeric".to_string(),
            });
        }

        let name = self.student_name.trim();
        let name_len = name.chars().count();
        if !(2..=100).contains(&name_len) {
            return Err(ValidationError::InvalidValue {
                field: "student_name".to_string(),
                reason: "must be 2-100 characters".to_string(),
            });
        }
        if name.chars().any(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidValue {
                field: "student_name".to_string(),
                reason: "must not contain digits".to_string(),
            });
        }

        check_range("attendance_percentage", self.attendance_percentage, 100.0)?;
        check_range("internal_marks", self.internal_marks, 100.0)?;
        check_range("assignment_score", self.assignment_score, 100.0)?;
        check_range("study_hours_per_day", self.study_hours_per_day, 12.0)?;
        Ok(())
    }
}

fn check_range(field: &str, value: f64, max: f64) -> Result<(), ValidationError> {
    if !(0.0..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            max,
        });
    }
    Ok(())
}

/// Status of an asynchronous batch upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// Returned immediately when a CSV batch upload is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadReceipt {
    pub batch_id: String,
    pub filename: String,
    pub total: u32,
    pub status: BatchStatus,
}

/// Progress of a batch upload job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: u32,
    pub processed: u32,
    #[serde(default)]
    pub failed: u32,
    pub status: BatchStatus,
}

impl BatchProgress {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, BatchStatus::Done | BatchStatus::Failed)
    }
}

/// Students whose most recent predictions are consecutively "At Risk".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertList {
    pub count: u32,
    pub students: Vec<AlertStudent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStudent {
    pub student_id: String,
    pub student_name: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub consecutive_at_risk: u32,
    pub last_seen: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn valid_input() -> StudentInput {
        StudentInput {
            student_id: "CS-2024_01".to_string(),
            student_name: "Grace Hopper".to_string(),
            attendance_percentage: 92.5,
            internal_marks: 81.0,
            assignment_score: 77.0,
            study_hours_per_day: 3.5,
        }
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(valid_input().validate().is_ok());
    }

    #[test]
    fn test_student_id_rejects_symbols() {
        let mut input = valid_input();
        input.student_id = "CS#1".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_student_name_rejects_digits() {
        let mut input = valid_input();
        input.student_name = "R2 D2".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_study_hours_capped_at_twelve() {
        let mut input = valid_input();
        input.study_hours_per_day = 12.5;
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("study_hours_per_day"));
    }

    #[test]
    fn test_risk_level_serde_uses_display_name() {
        let json = serde_json::to_string(&RiskLevel::AtRisk).unwrap();
        assert_eq!(json, "\"At Risk\"");
        assert_eq!(RiskLevel::AtRisk.to_string(), "At Risk");
    }

    #[test]
    fn test_recorded_at_accepts_naive_timestamps() {
        let record = PredictionRecord {
            id: "p1".to_string(),
            student_id: "S1".to_string(),
            student_name: "Ada".to_string(),
            risk_level: RiskLevel::Good,
            confidence: 0.8,
            timestamp: "2024-03-01T09:30:15.123456".to_string(),
            batch_id: None,
            section: None,
        };
        let ts = record.recorded_at().unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.hour(), 9);
    }

    #[test]
    fn test_batch_progress_finished() {
        let progress = BatchProgress {
            batch_id: "b1".to_string(),
            total: 10,
            processed: 10,
            failed: 0,
            status: BatchStatus::Done,
        };
        assert!(progress.is_finished());
    }
}
