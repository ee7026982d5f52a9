//! Common transport-layer types shared between the backend and the
//! attendance domain crate. These structs mirror the handlers' response
//! payloads so the domain layer can produce them without depending on axum.

mod attendance;
mod imports;

pub use attendance::{AttendanceCounts, AttendanceSummary, RecognitionOutcome};
pub use imports::{PhotoImportReport, PhotoOutcome, RosterImportReport, RosterRowOutcome};
