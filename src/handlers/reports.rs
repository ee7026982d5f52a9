use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName},
};
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use model::entities::{
    attendance_record, attendance_record::RecordStatus, attendance_session, student,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::classrooms::classroom_in_school;
use crate::handlers::records::session_record_rows;
use crate::handlers::sessions::session_in_school;
use crate::schemas::{AppState, CachedReport};

/// Query parameters for the classroom range report
#[derive(Debug, Deserialize, ToSchema)]
pub struct RangeReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

type CsvResponse = ([(HeaderName, String); 2], String);

fn csv_response(filename: &str, body: String) -> CsvResponse {
    (
        [
            (
                header::CONTENT_TYPE,
                "text/csv; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String, ApiError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("could not finish csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("csv was not utf-8: {e}")))
}

/// Export one session's records as CSV
#[utoipa::path(
    get,
    path = "/api/v1/reports/sessions/{session_id}/csv",
    tag = "reports",
    params(
        ("session_id" = i32, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "CSV report", body = String),
        (status = 404, description = "Session not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn session_report_csv(
    Path(session_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<CsvResponse, ApiError> {
    let session = session_in_school(&state, auth.school_id, session_id).await?;

    let cache_key = format!("session_csv_{session_id}");
    if let Some(CachedReport::Csv(csv)) = state.cache.get(&cache_key).await {
        debug!(session_id, "Session report served from cache");
        return Ok(csv_response(
            &format!("attendance_session_{session_id}.csv"),
            csv,
        ));
    }

    let rows = session_record_rows(&state, session.id, session.classroom_id).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["Roll Number", "Name", "Status", "Source", "Edited"])
        .map_err(|e| ApiError::Internal(format!("could not write csv: {e}")))?;
    for row in rows {
        writer
            .write_record([
                row.roll_number,
                row.student_name,
                row.status,
                row.source,
                row.edited.to_string(),
            ])
            .map_err(|e| ApiError::Internal(format!("could not write csv: {e}")))?;
    }

    let csv = finish_csv(writer)?;
    state
        .cache
        .insert(cache_key, CachedReport::Csv(csv.clone()))
        .await;

    Ok(csv_response(
        &format!("attendance_session_{session_id}.csv"),
        csv,
    ))
}

/// Export a per-student attendance summary over a date range as CSV
#[utoipa::path(
    get,
    path = "/api/v1/reports/classrooms/{classroom_id}/csv",
    tag = "reports",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
        ("from" = NaiveDate, Query, description = "Range start (inclusive)"),
        ("to" = NaiveDate, Query, description = "Range end (inclusive)"),
    ),
    responses(
        (status = 200, description = "CSV report", body = String),
        (status = 400, description = "Invalid date range", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn classroom_report_csv(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RangeReportQuery>,
) -> Result<CsvResponse, ApiError> {
    if query.from > query.to {
        return Err(ApiError::BadRequest(
            "'from' must not be after 'to'".to_string(),
        ));
    }
    classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let cache_key = format!("classroom_csv_{classroom_id}_{}_{}", query.from, query.to);
    if let Some(CachedReport::Csv(csv)) = state.cache.get(&cache_key).await {
        debug!(classroom_id, "Classroom report served from cache");
        return Ok(csv_response(
            &format!("attendance_classroom_{classroom_id}.csv"),
            csv,
        ));
    }

    let sessions = attendance_session::Entity::find()
        .filter(attendance_session::Column::ClassroomId.eq(classroom_id))
        .filter(attendance_session::Column::SessionDate.gte(query.from))
        .filter(attendance_session::Column::SessionDate.lte(query.to))
        .all(&state.db)
        .await?;
    let session_ids: Vec<i32> = sessions.iter().map(|s| s.id).collect();

    // (present, total) per student across the range.
    let mut tallies: HashMap<i32, (u64, u64)> = HashMap::new();
    if !session_ids.is_empty() {
        let records = attendance_record::Entity::find()
            .filter(attendance_record::Column::SessionId.is_in(session_ids))
            .all(&state.db)
            .await?;
        for record in records {
            let tally = tallies.entry(record.student_id).or_insert((0, 0));
            tally.1 += 1;
            if record.status == RecordStatus::Present {
                tally.0 += 1;
            }
        }
    }

    let students = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom_id))
        .order_by_asc(student::Column::RollNumber)
        .all(&state.db)
        .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "Roll Number",
            "Name",
            "Present Days",
            "Absent Days",
            "Attendance %",
        ])
        .map_err(|e| ApiError::Internal(format!("could not write csv: {e}")))?;
    for student_model in students {
        let (present, total) = tallies
            .get(&student_model.id)
            .copied()
            .unwrap_or((0, 0));
        let absent = total - present;
        let percentage = if total > 0 {
            format!("{:.1}", present as f64 * 100.0 / total as f64)
        } else {
            "-".to_string()
        };
        writer
            .write_record([
                student_model.roll_number,
                student_model.name,
                present.to_string(),
                absent.to_string(),
                percentage,
            ])
            .map_err(|e| ApiError::Internal(format!("could not write csv: {e}")))?;
    }

    let csv = finish_csv(writer)?;
    state
        .cache
        .insert(cache_key, CachedReport::Csv(csv.clone()))
        .await;

    Ok(csv_response(
        &format!("attendance_classroom_{classroom_id}.csv"),
        csv,
    ))
}
