use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Present/absent/total counts for one session, re-read from the database
/// after reconciliation so they always reflect persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceCounts {
    /// Number of records marked present
    pub present: u64,
    /// Number of records marked absent
    pub absent: u64,
    /// Total number of records in the session
    pub total: u64,
}

impl AttendanceCounts {
    pub fn new(present: u64, total: u64) -> Self {
        Self {
            present,
            absent: total.saturating_sub(present),
            total,
        }
    }
}

/// Summary of one attendance session returned after processing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSummary {
    /// Session ID
    pub session_id: i32,
    /// Classroom the session belongs to
    pub classroom_id: i32,
    /// Calendar day of the session
    pub session_date: NaiveDate,
    /// Session status (PENDING, IN_REVIEW, FINALIZED)
    pub status: String,
    /// Attendance counts for the session
    #[serde(flatten)]
    pub counts: AttendanceCounts,
}

/// Result of one call to the external recognition service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecognitionOutcome {
    /// Student IDs the service recognized as present
    pub present_student_ids: Vec<i32>,
    /// Per-student match confidence, where the service reported one
    #[serde(default)]
    pub confidences: HashMap<i32, f32>,
}

impl RecognitionOutcome {
    pub fn confidence_for(&self, student_id: i32) -> Option<f32> {
        self.confidences.get(&student_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_never_underflow() {
        let counts = AttendanceCounts::new(5, 3);
        assert_eq!(counts.absent, 0);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn summary_flattens_counts() {
        let summary = AttendanceSummary {
            session_id: 1,
            classroom_id: 2,
            session_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            status: "PENDING".to_string(),
            counts: AttendanceCounts::new(2, 3),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["present"], 2);
        assert_eq!(json["absent"], 1);
        assert_eq!(json["total"], 3);
    }
}
