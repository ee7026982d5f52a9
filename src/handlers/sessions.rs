use axum::{
    extract::{Multipart, Path, Query, State},
    response::Json,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use attendance::ProcessRequest;
use common::AttendanceSummary;
use model::entities::{
    attendance_session, attendance_session::SessionStatus, classroom_image,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::classrooms::classroom_in_school;
use crate::schemas::{ApiResponse, AppState};

/// Query parameters for listing sessions
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListSessionsQuery {
    pub classroom_id: i32,
    /// Earliest session date (inclusive)
    pub from: Option<NaiveDate>,
    /// Latest session date (inclusive)
    pub to: Option<NaiveDate>,
}

/// Request body for a session status transition
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateSessionStatusRequest {
    /// IN_REVIEW or FINALIZED
    pub status: String,
}

/// Session response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: i32,
    pub classroom_id: i32,
    pub session_date: NaiveDate,
    pub status: String,
    pub teacher_id: i32,
}

impl From<attendance_session::Model> for SessionResponse {
    fn from(model: attendance_session::Model) -> Self {
        Self {
            id: model.id,
            classroom_id: model.classroom_id,
            session_date: model.session_date,
            status: model.status.as_str().to_string(),
            teacher_id: model.teacher_id,
        }
    }
}

/// Normalized multipart payload for attendance processing.
#[derive(Default)]
struct ProcessForm {
    classroom_id: Option<i32>,
    session_id: Option<i32>,
    image_urls: Vec<String>,
    upload: Option<(String, Vec<u8>)>,
}

async fn parse_process_form(multipart: &mut Multipart) -> Result<ProcessForm, ApiError> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "classroom_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read field: {e}")))?;
                form.classroom_id = Some(text.trim().parse().map_err(|_| {
                    ApiError::BadRequest("classroom_id must be an integer".to_string())
                })?);
            }
            "session_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read field: {e}")))?;
                form.session_id = Some(text.trim().parse().map_err(|_| {
                    ApiError::BadRequest("session_id must be an integer".to_string())
                })?);
            }
            "image_urls" | "image_url" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read field: {e}")))?;
                let url = text.trim().to_string();
                if !url.is_empty() {
                    form.image_urls.push(url);
                }
            }
            "file" | "image" => {
                let file_name = field.file_name().unwrap_or("classroom.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read upload: {e}")))?
                    .to_vec();
                form.upload = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    Ok(form)
}

/// List a classroom's sessions
#[utoipa::path(
    get,
    path = "/api/v1/attendance-sessions",
    tag = "attendance",
    params(
        ("classroom_id" = i32, Query, description = "Classroom ID"),
        ("from" = Option<NaiveDate>, Query, description = "Earliest date"),
        ("to" = Option<NaiveDate>, Query, description = "Latest date"),
    ),
    responses(
        (status = 200, description = "Sessions retrieved successfully", body = ApiResponse<Vec<SessionResponse>>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ApiResponse<Vec<SessionResponse>>>, ApiError> {
    classroom_in_school(&state, auth.school_id, query.classroom_id).await?;

    let mut finder = attendance_session::Entity::find()
        .filter(attendance_session::Column::ClassroomId.eq(query.classroom_id));
    if let Some(from) = query.from {
        finder = finder.filter(attendance_session::Column::SessionDate.gte(from));
    }
    if let Some(to) = query.to {
        finder = finder.filter(attendance_session::Column::SessionDate.lte(to));
    }

    let sessions = finder
        .order_by_desc(attendance_session::Column::SessionDate)
        .all(&state.db)
        .await?;

    let response = ApiResponse {
        data: sessions.into_iter().map(SessionResponse::from).collect(),
        message: "Sessions retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Fetch a session scoped to the caller's school.
pub(crate) async fn session_in_school(
    state: &AppState,
    school_id: i32,
    session_id: i32,
) -> Result<attendance_session::Model, ApiError> {
    let session = attendance_session::Entity::find_by_id(session_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;

    classroom_in_school(state, school_id, session.classroom_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("session {session_id} not found")))?;

    Ok(session)
}

/// Get one session with its current counts
#[utoipa::path(
    get,
    path = "/api/v1/attendance-sessions/{session_id}",
    tag = "attendance",
    params(
        ("session_id" = i32, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "Session retrieved successfully", body = ApiResponse<AttendanceSummary>),
        (status = 404, description = "Session not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_session(
    Path(session_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<AttendanceSummary>>, ApiError> {
    let session = session_in_school(&state, auth.school_id, session_id).await?;
    let counts = attendance::session_counts(&state.db, session.id).await?;

    let response = ApiResponse {
        data: AttendanceSummary {
            session_id: session.id,
            classroom_id: session.classroom_id,
            session_date: session.session_date,
            status: session.status.as_str().to_string(),
            counts,
        },
        message: "Session retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Process classroom images into attendance records
///
/// Multipart form: `classroom_id` (required), optional `session_id`,
/// repeatable `image_urls`, and optionally one `file` upload which is
/// stored first. The recognizer result is reconciled into per-student
/// records; teacher edits are never overwritten.
#[utoipa::path(
    post,
    path = "/api/v1/attendance-sessions/process",
    tag = "attendance",
    responses(
        (status = 200, description = "Attendance processed", body = ApiResponse<AttendanceSummary>),
        (status = 400, description = "Missing classroom or images", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Session is finalized", body = crate::schemas::ErrorResponse),
        (status = 503, description = "Recognition service unavailable", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, multipart))]
pub async fn process_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<AttendanceSummary>>, ApiError> {
    auth.require_staff()?;

    let form = parse_process_form(&mut multipart).await?;
    let classroom_id = form
        .classroom_id
        .ok_or_else(|| ApiError::BadRequest("classroom_id is required".to_string()))?;
    classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let mut image_urls = form.image_urls;
    if let Some((file_name, bytes)) = form.upload {
        let url = state
            .images
            .upload(&file_name, bytes)
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("image upload failed: {e}")))?;
        image_urls.push(url);
    }

    let request = ProcessRequest {
        classroom_id,
        session_id: form.session_id,
        teacher_id: auth.user_id,
        image_urls: image_urls.clone(),
        session_date: Utc::now().date_naive(),
    };

    let summary = attendance::process_attendance(&state.db, state.recognizer.as_ref(), request).await?;

    // Keep the raw inputs for audit/history.
    let now = Utc::now();
    for url in &image_urls {
        classroom_image::ActiveModel {
            session_id: Set(summary.session_id),
            image_url: Set(url.clone()),
            uploaded_by: Set(auth.user_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&state.db)
        .await?;
    }

    info!(
        session_id = summary.session_id,
        present = summary.counts.present,
        total = summary.counts.total,
        "Attendance processed"
    );
    Ok(Json(ApiResponse {
        data: summary,
        message: "Attendance processed".to_string(),
        success: true,
    }))
}

/// Advance a session's status
///
/// Transitions run PENDING -> IN_REVIEW -> FINALIZED; FINALIZED is
/// terminal.
#[utoipa::path(
    patch,
    path = "/api/v1/attendance-sessions/{session_id}/status",
    tag = "attendance",
    params(
        ("session_id" = i32, Path, description = "Session ID"),
    ),
    request_body = UpdateSessionStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<SessionResponse>),
        (status = 404, description = "Session not found", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Illegal transition", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Unknown status", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn update_session_status(
    Path(session_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateSessionStatusRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    auth.require_staff()?;

    let next = SessionStatus::parse(&request.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown status '{}'", request.status)))?;

    let session = session_in_school(&state, auth.school_id, session_id).await?;
    if !session.status.can_transition_to(next) {
        return Err(ApiError::Conflict(format!(
            "cannot transition session from {} to {}",
            session.status.as_str(),
            next.as_str()
        )));
    }

    let mut session_active: attendance_session::ActiveModel = session.into();
    session_active.status = Set(next);
    let updated = session_active.update(&state.db).await?;

    info!(session_id, status = updated.status.as_str(), "Session status updated");
    let response = ApiResponse {
        data: SessionResponse::from(updated),
        message: "Status updated".to_string(),
        success: true,
    };
    Ok(Json(response))
}
