use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, State},
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use model::entities::{
    attendance_record,
    attendance_record::{RecordSource, RecordStatus},
    student,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::sessions::session_in_school;
use crate::schemas::{ApiResponse, AppState};

/// One student's record within a session, joined with roster data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordRow {
    pub record_id: i32,
    pub student_id: i32,
    pub roll_number: String,
    pub student_name: String,
    /// P or A
    pub status: String,
    /// SYSTEM or TEACHER
    pub source: String,
    pub edited: bool,
    pub confidence: Option<f32>,
}

/// Request body for a manual record edit
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateRecordRequest {
    /// P or A
    pub status: String,
}

/// One item of a bulk record update
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BulkRecordUpdate {
    pub record_id: i32,
    /// P or A
    pub status: String,
}

/// Request body for a bulk record update
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BulkUpdateRecordsRequest {
    pub updates: Vec<BulkRecordUpdate>,
}

/// Result of a bulk record update; unknown record ids are silent no-ops
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkUpdateOutcome {
    pub updated: u64,
    pub skipped: u64,
}

/// Assemble joined rows for a session, ordered by roll number.
pub(crate) async fn session_record_rows(
    state: &AppState,
    session_id: i32,
    classroom_id: i32,
) -> Result<Vec<RecordRow>, ApiError> {
    let records = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .all(&state.db)
        .await?;

    let students: HashMap<i32, student::Model> = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut rows: Vec<RecordRow> = records
        .into_iter()
        .filter_map(|record| {
            let student = students.get(&record.student_id)?;
            Some(RecordRow {
                record_id: record.id,
                student_id: record.student_id,
                roll_number: student.roll_number.clone(),
                student_name: student.name.clone(),
                status: record.status.as_str().to_string(),
                source: record.source.as_str().to_string(),
                edited: record.edited,
                confidence: record.confidence,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.roll_number.cmp(&b.roll_number));
    Ok(rows)
}

/// List a session's records with student details
#[utoipa::path(
    get,
    path = "/api/v1/attendance-sessions/{session_id}/records",
    tag = "records",
    params(
        ("session_id" = i32, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "Records retrieved successfully", body = ApiResponse<Vec<RecordRow>>),
        (status = 404, description = "Session not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_session_records(
    Path(session_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<RecordRow>>>, ApiError> {
    let session = session_in_school(&state, auth.school_id, session_id).await?;
    let rows = session_record_rows(&state, session.id, session.classroom_id).await?;

    debug!(session_id, count = rows.len(), "Retrieved records");
    let response = ApiResponse {
        data: rows,
        message: "Records retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Manually override one record
///
/// Sets the edited flag, which permanently locks the record against
/// SYSTEM writes from later reconciliation passes.
#[utoipa::path(
    patch,
    path = "/api/v1/attendance-records/{record_id}",
    tag = "records",
    params(
        ("record_id" = i32, Path, description = "Record ID"),
    ),
    request_body = UpdateRecordRequest,
    responses(
        (status = 200, description = "Record updated", body = ApiResponse<RecordRow>),
        (status = 404, description = "Record not found", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Invalid status", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn update_record(
    Path(record_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateRecordRequest>,
) -> Result<Json<ApiResponse<RecordRow>>, ApiError> {
    auth.require_staff()?;

    let status = RecordStatus::parse(&request.status)
        .ok_or_else(|| ApiError::Validation(format!("status must be P or A, got '{}'", request.status)))?;

    let record = attendance_record::Entity::find_by_id(record_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("record {record_id} not found")))?;

    // Scope check rides on the session.
    session_in_school(&state, auth.school_id, record.session_id).await?;

    let student_id = record.student_id;
    let mut record_active: attendance_record::ActiveModel = record.into();
    record_active.status = Set(status);
    record_active.source = Set(RecordSource::Teacher);
    record_active.edited = Set(true);
    record_active.confidence = Set(None);
    let updated = record_active.update(&state.db).await?;

    let student_model = student::Entity::find_by_id(student_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("student {student_id} not found")))?;

    info!(record_id, status = updated.status.as_str(), "Record edited by teacher");
    let response = ApiResponse {
        data: RecordRow {
            record_id: updated.id,
            student_id: updated.student_id,
            roll_number: student_model.roll_number,
            student_name: student_model.name,
            status: updated.status.as_str().to_string(),
            source: updated.source.as_str().to_string(),
            edited: updated.edited,
            confidence: updated.confidence,
        },
        message: "Record updated".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Bulk-override records
///
/// Items are applied independently; unknown record ids and invalid
/// statuses are counted as skipped, never as failures of the batch.
#[utoipa::path(
    patch,
    path = "/api/v1/attendance-records/bulk",
    tag = "records",
    request_body = BulkUpdateRecordsRequest,
    responses(
        (status = 200, description = "Bulk update applied", body = ApiResponse<BulkUpdateOutcome>)
    )
)]
#[instrument(skip(state, request), fields(items = request.updates.len()))]
pub async fn bulk_update_records(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<BulkUpdateRecordsRequest>,
) -> Result<Json<ApiResponse<BulkUpdateOutcome>>, ApiError> {
    auth.require_staff()?;

    let mut outcome = BulkUpdateOutcome {
        updated: 0,
        skipped: 0,
    };
    // Sessions already confirmed to be in the caller's school.
    let mut allowed_sessions: HashSet<i32> = HashSet::new();

    for item in request.updates {
        let Some(status) = RecordStatus::parse(&item.status) else {
            outcome.skipped += 1;
            continue;
        };

        let Some(record) = attendance_record::Entity::find_by_id(item.record_id)
            .one(&state.db)
            .await?
        else {
            outcome.skipped += 1;
            continue;
        };

        if !allowed_sessions.contains(&record.session_id) {
            if session_in_school(&state, auth.school_id, record.session_id)
                .await
                .is_err()
            {
                outcome.skipped += 1;
                continue;
            }
            allowed_sessions.insert(record.session_id);
        }

        let mut record_active: attendance_record::ActiveModel = record.into();
        record_active.status = Set(status);
        record_active.source = Set(RecordSource::Teacher);
        record_active.edited = Set(true);
        record_active.confidence = Set(None);
        record_active.update(&state.db).await?;
        outcome.updated += 1;
    }

    info!(
        updated = outcome.updated,
        skipped = outcome.skipped,
        "Bulk record update applied"
    );
    let message = format!("{} records updated, {} skipped", outcome.updated, outcome.skipped);
    Ok(Json(ApiResponse {
        data: outcome,
        message,
        success: true,
    }))
}
