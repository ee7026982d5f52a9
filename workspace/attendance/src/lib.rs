//! Attendance-session resolution and reconciliation.
//!
//! This crate owns the one piece of real logic in the system: merging the
//! output of the external recognition service into per-student attendance
//! records without losing teacher corrections or double-counting, keyed on
//! the database's unique indexes rather than application-level locking.

pub mod engine;
pub mod error;
pub mod recognizer;

#[cfg(test)]
mod testing;

pub use engine::{process_attendance, resolve_session, session_counts, ProcessRequest};
pub use error::{AttendanceError, Result};
pub use recognizer::{HttpRecognizer, Recognizer, RecognizerError};

#[cfg(any(test, feature = "test-utils"))]
pub use recognizer::MockRecognizer;
