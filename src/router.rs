use crate::handlers::{
    auth::{
        forgot_password, login, logout, refresh_token, register_admin, reset_password, send_otp,
        verify_otp,
    },
    classrooms::{
        create_classroom, delete_classroom, get_classroom, get_classroom_students, get_classrooms,
        update_classroom,
    },
    health::health_check,
    records::{bulk_update_records, get_session_records, update_record},
    reports::{classroom_report_csv, session_report_csv},
    sessions::{get_session, get_sessions, process_attendance, update_session_status},
    students::{
        bulk_upload_photos, bulk_upload_students, create_student, delete_student, get_student,
        update_student, upload_student_photo,
    },
    users::{create_user, delete_user, get_user, get_users, update_user},
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Auth routes
        .route("/api/v1/auth/register-admin", post(register_admin))
        .route("/api/v1/auth/send-otp", post(send_otp))
        .route("/api/v1/auth/verify-otp", post(verify_otp))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh-token", post(refresh_token))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/forgot-password", post(forgot_password))
        .route("/api/v1/auth/reset-password", post(reset_password))
        // User CRUD routes
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/users", get(get_users))
        .route("/api/v1/users/:user_id", get(get_user))
        .route("/api/v1/users/:user_id", put(update_user))
        .route("/api/v1/users/:user_id", delete(delete_user))
        // Classroom CRUD routes
        .route("/api/v1/classrooms", post(create_classroom))
        .route("/api/v1/classrooms", get(get_classrooms))
        .route("/api/v1/classrooms/:classroom_id", get(get_classroom))
        .route("/api/v1/classrooms/:classroom_id", put(update_classroom))
        .route("/api/v1/classrooms/:classroom_id", delete(delete_classroom))
        .route(
            "/api/v1/classrooms/:classroom_id/students",
            get(get_classroom_students),
        )
        // Student CRUD and import routes
        .route("/api/v1/students", post(create_student))
        .route("/api/v1/students/:student_id", get(get_student))
        .route("/api/v1/students/:student_id", put(update_student))
        .route("/api/v1/students/:student_id", delete(delete_student))
        .route(
            "/api/v1/students/:student_id/photo",
            post(upload_student_photo),
        )
        .route(
            "/api/v1/classrooms/:classroom_id/students/bulk-upload",
            post(bulk_upload_students),
        )
        .route(
            "/api/v1/classrooms/:classroom_id/students/bulk-photo-upload",
            post(bulk_upload_photos),
        )
        // Attendance session routes
        .route("/api/v1/attendance-sessions", get(get_sessions))
        .route("/api/v1/attendance-sessions/process", post(process_attendance))
        .route("/api/v1/attendance-sessions/:session_id", get(get_session))
        .route(
            "/api/v1/attendance-sessions/:session_id/status",
            patch(update_session_status),
        )
        .route(
            "/api/v1/attendance-sessions/:session_id/records",
            get(get_session_records),
        )
        // Record edit routes
        .route("/api/v1/attendance-records/bulk", patch(bulk_update_records))
        .route("/api/v1/attendance-records/:record_id", patch(update_record))
        // Report routes
        .route(
            "/api/v1/reports/sessions/:session_id/csv",
            get(session_report_csv),
        )
        .route(
            "/api/v1/reports/classrooms/:classroom_id/csv",
            get(classroom_report_csv),
        )
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
