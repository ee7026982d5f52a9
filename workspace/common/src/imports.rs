use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of one roster row during bulk student import.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RosterRowOutcome {
    /// 1-based row number in the uploaded sheet (excluding the header row)
    pub row: usize,
    /// Roll number from the sheet, if the cell was present
    pub roll_number: Option<String>,
    /// Student name from the sheet, if the cell was present
    pub name: Option<String>,
    /// Failure reason; `None` means the row was imported
    pub reason: Option<String>,
}

/// Itemized report for a bulk roster import. Partial success is the norm:
/// one bad row never blocks the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RosterImportReport {
    /// Rows successfully inserted
    pub imported: Vec<RosterRowOutcome>,
    /// Rows rejected, with reasons
    pub failed: Vec<RosterRowOutcome>,
}

impl RosterImportReport {
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Outcome of one file entry during bulk photo import.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhotoOutcome {
    /// Entry name inside the uploaded archive
    pub file_name: String,
    /// Matched student ID, when the filename stem matched a roll number
    pub student_id: Option<i32>,
    /// Stored image URL on success
    pub image_url: Option<String>,
    /// Skip or failure reason
    pub reason: Option<String>,
}

/// Itemized report for a bulk photo import. A student with no matching
/// photo is a skip, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PhotoImportReport {
    /// Photos uploaded and attached to a student
    pub uploaded: Vec<PhotoOutcome>,
    /// Entries skipped (no matching student, not an image)
    pub skipped: Vec<PhotoOutcome>,
    /// Entries that matched a student but failed to upload
    pub failed: Vec<PhotoOutcome>,
}
