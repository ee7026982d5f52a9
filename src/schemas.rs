use std::fmt;
use std::sync::Arc;

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use attendance::Recognizer;
use common::{
    AttendanceCounts, AttendanceSummary, PhotoImportReport, PhotoOutcome, RosterImportReport,
    RosterRowOutcome,
};

use crate::auth::AuthSettings;
use crate::clients::{ImageStore, Mailer};

/// Application state shared across handlers. All external collaborators are
/// constructed once at startup and injected here; handlers never reach for
/// globals.
#[derive(Clone)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Cache for generated reports
    pub cache: Cache<String, CachedReport>,
    /// Token and OTP settings
    pub auth: Arc<AuthSettings>,
    /// External face-recognition service
    pub recognizer: Arc<dyn Recognizer>,
    /// External image storage
    pub images: Arc<dyn ImageStore>,
    /// External email delivery
    pub mailer: Arc<dyn Mailer>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").field("db", &self.db).finish()
    }
}

/// Cached data types
#[derive(Clone, Debug)]
pub enum CachedReport {
    Csv(String),
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

/// Error response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::auth::register_admin,
        crate::handlers::auth::send_otp,
        crate::handlers::auth::verify_otp,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::users::create_user,
        crate::handlers::users::get_users,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::classrooms::create_classroom,
        crate::handlers::classrooms::get_classrooms,
        crate::handlers::classrooms::get_classroom,
        crate::handlers::classrooms::update_classroom,
        crate::handlers::classrooms::delete_classroom,
        crate::handlers::classrooms::get_classroom_students,
        crate::handlers::students::create_student,
        crate::handlers::students::get_student,
        crate::handlers::students::update_student,
        crate::handlers::students::delete_student,
        crate::handlers::students::upload_student_photo,
        crate::handlers::students::bulk_upload_students,
        crate::handlers::students::bulk_upload_photos,
        crate::handlers::sessions::get_sessions,
        crate::handlers::sessions::get_session,
        crate::handlers::sessions::process_attendance,
        crate::handlers::sessions::update_session_status,
        crate::handlers::records::get_session_records,
        crate::handlers::records::update_record,
        crate::handlers::records::bulk_update_records,
        crate::handlers::reports::session_report_csv,
        crate::handlers::reports::classroom_report_csv,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            AttendanceCounts,
            AttendanceSummary,
            RosterImportReport,
            RosterRowOutcome,
            PhotoImportReport,
            PhotoOutcome,
            crate::handlers::auth::RegisterAdminRequest,
            crate::handlers::auth::SendOtpRequest,
            crate::handlers::auth::VerifyOtpRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::RefreshTokenRequest,
            crate::handlers::auth::ForgotPasswordRequest,
            crate::handlers::auth::ResetPasswordRequest,
            crate::handlers::auth::TokenPairResponse,
            crate::handlers::auth::LoginResponse,
            crate::handlers::users::CreateUserRequest,
            crate::handlers::users::UpdateUserRequest,
            crate::handlers::users::UserResponse,
            crate::handlers::classrooms::CreateClassroomRequest,
            crate::handlers::classrooms::UpdateClassroomRequest,
            crate::handlers::classrooms::ClassroomResponse,
            crate::handlers::students::CreateStudentRequest,
            crate::handlers::students::UpdateStudentRequest,
            crate::handlers::students::StudentResponse,
            crate::handlers::sessions::SessionResponse,
            crate::handlers::sessions::UpdateSessionStatusRequest,
            crate::handlers::records::RecordRow,
            crate::handlers::records::UpdateRecordRequest,
            crate::handlers::records::BulkUpdateRecordsRequest,
            crate::handlers::records::BulkRecordUpdate,
            crate::handlers::records::BulkUpdateOutcome,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, OTP verification, and session endpoints"),
        (name = "users", description = "Teacher and principal account management"),
        (name = "classrooms", description = "Classroom management"),
        (name = "students", description = "Student management and bulk import"),
        (name = "attendance", description = "Attendance sessions and processing"),
        (name = "records", description = "Per-student attendance records"),
        (name = "reports", description = "CSV report export"),
    ),
    info(
        title = "MarkME API",
        description = "School attendance management API with AI-assisted attendance marking",
        version = "0.1.0",
        contact(
            name = "MarkME Team",
            email = "contact@markme.app"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
