use thiserror::Error;

use crate::recognizer::RecognizerError;

/// Error types for attendance processing
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// No image URLs remained after normalizing the request
    #[error("no images supplied for attendance processing")]
    NoImages,

    /// The classroom does not exist
    #[error("classroom {0} not found")]
    ClassroomNotFound(i32),

    /// An explicitly requested session does not exist
    #[error("attendance session {0} not found")]
    SessionNotFound(i32),

    /// An explicitly requested session belongs to a different classroom
    #[error("session {session_id} does not belong to classroom {classroom_id}")]
    SessionMismatch { session_id: i32, classroom_id: i32 },

    /// The session is finalized and no longer accepts automated writes
    #[error("session {0} is finalized")]
    SessionFinalized(i32),

    /// The external recognition service failed; nothing was applied
    #[error("recognition service failed: {0}")]
    Recognizer(#[from] RecognizerError),

    /// Error from the database operations
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Type alias for Result with AttendanceError
pub type Result<T> = std::result::Result<T, AttendanceError>;
