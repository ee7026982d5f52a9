use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use common::{PhotoImportReport, PhotoOutcome, RosterImportReport, RosterRowOutcome};
use model::entities::student;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::classrooms::classroom_in_school;
use crate::helpers::{photos, roster};
use crate::schemas::{ApiResponse, AppState};

/// Parallel uploads to the image store within one bulk request.
const MAX_CONCURRENT_UPLOADS: usize = 5;

/// Request body for enrolling a student
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateStudentRequest {
    pub classroom_id: i32,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub roll_number: String,
}

/// Request body for updating a student
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub roll_number: Option<String>,
}

/// Student response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StudentResponse {
    pub id: i32,
    pub classroom_id: i32,
    pub name: String,
    pub roll_number: String,
    pub profile_image_url: Option<String>,
}

impl From<student::Model> for StudentResponse {
    fn from(model: student::Model) -> Self {
        Self {
            id: model.id,
            classroom_id: model.classroom_id,
            name: model.name,
            roll_number: model.roll_number,
            profile_image_url: model.profile_image_url,
        }
    }
}

/// Pull the first file field out of a multipart body.
pub(crate) async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" || name == "photo" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("could not read upload: {e}")))?
                .to_vec();
            return Ok((file_name, bytes));
        }
    }

    Err(ApiError::BadRequest(
        "missing 'file' field in multipart body".to_string(),
    ))
}

/// Fetch a student scoped to the caller's school.
async fn student_in_school(
    state: &AppState,
    school_id: i32,
    student_id: i32,
) -> Result<student::Model, ApiError> {
    let student_model = student::Entity::find_by_id(student_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("student {student_id} not found")))?;

    // The school check rides on the classroom; a student outside the
    // caller's school reads as not found.
    classroom_in_school(state, school_id, student_model.classroom_id)
        .await
        .map_err(|_| ApiError::NotFound(format!("student {student_id} not found")))?;

    Ok(student_model)
}

/// Enroll a student
#[utoipa::path(
    post,
    path = "/api/v1/students",
    tag = "students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created successfully", body = ApiResponse<StudentResponse>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Roll number already exists", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn create_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StudentResponse>>), ApiError> {
    auth.require_admin()?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    classroom_in_school(&state, auth.school_id, request.classroom_id).await?;

    let new_student = student::ActiveModel {
        classroom_id: Set(request.classroom_id),
        name: Set(request.name.clone()),
        roll_number: Set(request.roll_number.clone()),
        profile_image_url: Set(None),
        ..Default::default()
    };

    match new_student.insert(&state.db).await {
        Ok(student_model) => {
            info!(student_id = student_model.id, "Student created");
            let response = ApiResponse {
                data: StudentResponse::from(student_model),
                message: "Student created successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => Err(ApiError::from_db(
            db_error,
            &format!(
                "roll number '{}' already exists in this classroom",
                request.roll_number
            ),
        )),
    }
}

/// Get a specific student by ID
#[utoipa::path(
    get,
    path = "/api/v1/students/{student_id}",
    tag = "students",
    params(
        ("student_id" = i32, Path, description = "Student ID"),
    ),
    responses(
        (status = 200, description = "Student retrieved successfully", body = ApiResponse<StudentResponse>),
        (status = 404, description = "Student not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_student(
    Path(student_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<StudentResponse>>, ApiError> {
    let student_model = student_in_school(&state, auth.school_id, student_id).await?;

    let response = ApiResponse {
        data: StudentResponse::from(student_model),
        message: "Student retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Update a student
#[utoipa::path(
    put,
    path = "/api/v1/students/{student_id}",
    tag = "students",
    params(
        ("student_id" = i32, Path, description = "Student ID"),
    ),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student updated successfully", body = ApiResponse<StudentResponse>),
        (status = 404, description = "Student not found", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Roll number already exists", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn update_student(
    Path(student_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateStudentRequest>,
) -> Result<Json<ApiResponse<StudentResponse>>, ApiError> {
    auth.require_admin()?;

    let existing = student_in_school(&state, auth.school_id, student_id).await?;

    let mut student_active: student::ActiveModel = existing.into();
    if let Some(name) = request.name {
        student_active.name = Set(name);
    }
    if let Some(roll_number) = request.roll_number {
        student_active.roll_number = Set(roll_number);
    }

    match student_active.update(&state.db).await {
        Ok(updated) => {
            info!(student_id, "Student updated");
            let response = ApiResponse {
                data: StudentResponse::from(updated),
                message: "Student updated successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Err(db_error) => Err(ApiError::from_db(
            db_error,
            "that roll number already exists in this classroom",
        )),
    }
}

/// Remove a student
#[utoipa::path(
    delete,
    path = "/api/v1/students/{student_id}",
    tag = "students",
    params(
        ("student_id" = i32, Path, description = "Student ID"),
    ),
    responses(
        (status = 200, description = "Student deleted successfully", body = ApiResponse<String>),
        (status = 404, description = "Student not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_student(
    Path(student_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    auth.require_admin()?;

    student_in_school(&state, auth.school_id, student_id).await?;
    student::Entity::delete_by_id(student_id)
        .exec(&state.db)
        .await?;
    info!(student_id, "Student deleted");

    let response = ApiResponse {
        data: format!("Student {student_id} deleted"),
        message: "Student deleted successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Upload one student's profile photo
///
/// The image goes to the object store first; embedding generation is
/// attempted afterwards but its failure never fails the upload.
#[utoipa::path(
    post,
    path = "/api/v1/students/{student_id}/photo",
    tag = "students",
    params(
        ("student_id" = i32, Path, description = "Student ID"),
    ),
    responses(
        (status = 200, description = "Photo stored", body = ApiResponse<StudentResponse>),
        (status = 404, description = "Student not found", body = crate::schemas::ErrorResponse),
        (status = 503, description = "Image storage unavailable", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, multipart))]
pub async fn upload_student_photo(
    Path(student_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<StudentResponse>>, ApiError> {
    auth.require_staff()?;

    let student_model = student_in_school(&state, auth.school_id, student_id).await?;
    let (file_name, bytes) = read_upload(&mut multipart).await?;

    let url = state
        .images
        .upload(&file_name, bytes)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("image upload failed: {e}")))?;

    let mut student_active: student::ActiveModel = student_model.into();
    student_active.profile_image_url = Set(Some(url.clone()));
    let updated = student_active.update(&state.db).await?;

    if let Err(e) = state.recognizer.generate_embedding(student_id, &url).await {
        warn!(student_id, "Embedding generation failed: {e}");
    }

    info!(student_id, "Profile photo stored");
    let response = ApiResponse {
        data: StudentResponse::from(updated),
        message: "Photo stored".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Bulk-import students from an uploaded roster sheet
///
/// Rows are validated independently and inserted independently; one bad row
/// never blocks the rest, and the response itemizes every outcome.
#[utoipa::path(
    post,
    path = "/api/v1/classrooms/{classroom_id}/students/bulk-upload",
    tag = "students",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    responses(
        (status = 200, description = "Import report", body = ApiResponse<RosterImportReport>),
        (status = 400, description = "Unreadable sheet", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, multipart))]
pub async fn bulk_upload_students(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<RosterImportReport>>, ApiError> {
    auth.require_admin()?;
    classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let (file_name, bytes) = read_upload(&mut multipart).await?;
    let rows = roster::parse_roster(&file_name, &bytes)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if rows.is_empty() {
        return Err(ApiError::BadRequest(
            "the uploaded sheet has no data rows".to_string(),
        ));
    }

    let existing_rolls: HashSet<String> = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|s| s.roll_number)
        .collect();

    let mut report = RosterImportReport::default();
    let mut seen_in_file: HashSet<String> = HashSet::new();

    for row in rows {
        let outcome = RosterRowOutcome {
            row: row.row,
            roll_number: row.roll_number.clone(),
            name: row.name.clone(),
            reason: None,
        };

        let reason = match (&row.name, &row.roll_number) {
            (None, _) => Some("name is required".to_string()),
            (_, None) => Some("roll number is required".to_string()),
            (Some(_), Some(roll)) => {
                if !seen_in_file.insert(roll.clone()) {
                    Some("duplicate roll number in file".to_string())
                } else if existing_rolls.contains(roll) {
                    Some("roll number already exists in classroom".to_string())
                } else {
                    None
                }
            }
        };

        if let Some(reason) = reason {
            report.failed.push(RosterRowOutcome {
                reason: Some(reason),
                ..outcome
            });
            continue;
        }

        let insert = student::ActiveModel {
            classroom_id: Set(classroom_id),
            name: Set(row.name.clone().unwrap_or_default()),
            roll_number: Set(row.roll_number.clone().unwrap_or_default()),
            profile_image_url: Set(None),
            ..Default::default()
        }
        .insert(&state.db)
        .await;

        match insert {
            Ok(_) => report.imported.push(outcome),
            // A concurrent import can still slip a duplicate past the
            // pre-check; the unique index has the final word.
            Err(db_error) => report.failed.push(RosterRowOutcome {
                reason: Some(format!("insert failed: {db_error}")),
                ..outcome
            }),
        }
    }

    info!(
        classroom_id,
        imported = report.imported_count(),
        failed = report.failed_count(),
        "Roster import finished"
    );

    let message = format!(
        "Imported {} students, {} failures",
        report.imported_count(),
        report.failed_count()
    );
    Ok(Json(ApiResponse {
        data: report,
        message,
        success: true,
    }))
}

enum PhotoTaskResult {
    Uploaded(PhotoOutcome),
    Failed(PhotoOutcome),
}

/// Bulk-import student photos from an uploaded ZIP archive
///
/// Filename stems are matched to roll numbers; uploads run with bounded
/// concurrency. A student without a photo, or a photo without a student, is
/// a skip rather than an error.
#[utoipa::path(
    post,
    path = "/api/v1/classrooms/{classroom_id}/students/bulk-photo-upload",
    tag = "students",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    responses(
        (status = 200, description = "Import report", body = ApiResponse<PhotoImportReport>),
        (status = 400, description = "Unreadable archive", body = crate::schemas::ErrorResponse),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, multipart))]
pub async fn bulk_upload_photos(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<PhotoImportReport>>, ApiError> {
    auth.require_staff()?;
    classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let (_, bytes) = read_upload(&mut multipart).await?;
    let (images, skipped_entries) =
        photos::extract_images(&bytes).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let roll_to_student: HashMap<String, i32> = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|s| (s.roll_number.to_ascii_lowercase(), s.id))
        .collect();

    let mut report = PhotoImportReport::default();
    for entry in skipped_entries {
        report.skipped.push(PhotoOutcome {
            file_name: entry,
            student_id: None,
            image_url: None,
            reason: Some("not an image".to_string()),
        });
    }

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_UPLOADS));
    let mut tasks = tokio::task::JoinSet::new();

    for image in images {
        let Some(&student_id) = roll_to_student.get(&image.stem) else {
            report.skipped.push(PhotoOutcome {
                file_name: image.file_name,
                student_id: None,
                image_url: None,
                reason: Some("no matching roll number".to_string()),
            });
            continue;
        };

        let db = state.db.clone();
        let images_store = state.images.clone();
        let recognizer = state.recognizer.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return PhotoTaskResult::Failed(PhotoOutcome {
                    file_name: image.file_name,
                    student_id: Some(student_id),
                    image_url: None,
                    reason: Some("upload slot unavailable".to_string()),
                });
            };

            let url = match images_store.upload(&image.file_name, image.bytes).await {
                Ok(url) => url,
                Err(e) => {
                    return PhotoTaskResult::Failed(PhotoOutcome {
                        file_name: image.file_name,
                        student_id: Some(student_id),
                        image_url: None,
                        reason: Some(format!("upload failed: {e}")),
                    });
                }
            };

            let update = student::Entity::update_many()
                .set(student::ActiveModel {
                    profile_image_url: Set(Some(url.clone())),
                    ..Default::default()
                })
                .filter(student::Column::Id.eq(student_id))
                .exec(&db)
                .await;
            if let Err(e) = update {
                return PhotoTaskResult::Failed(PhotoOutcome {
                    file_name: image.file_name,
                    student_id: Some(student_id),
                    image_url: Some(url),
                    reason: Some(format!("database error: {e}")),
                });
            }

            if let Err(e) = recognizer.generate_embedding(student_id, &url).await {
                warn!(student_id, "Embedding generation failed: {e}");
            }

            PhotoTaskResult::Uploaded(PhotoOutcome {
                file_name: image.file_name,
                student_id: Some(student_id),
                image_url: Some(url),
                reason: None,
            })
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(PhotoTaskResult::Uploaded(outcome)) => report.uploaded.push(outcome),
            Ok(PhotoTaskResult::Failed(outcome)) => report.failed.push(outcome),
            Err(join_error) => {
                warn!("Photo upload task panicked: {join_error}");
                report.failed.push(PhotoOutcome {
                    file_name: "<unknown>".to_string(),
                    student_id: None,
                    image_url: None,
                    reason: Some("upload task failed".to_string()),
                });
            }
        }
    }

    debug!(
        classroom_id,
        uploaded = report.uploaded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Bulk photo import finished"
    );

    let message = format!(
        "Uploaded {} photos, {} skipped, {} failed",
        report.uploaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(Json(ApiResponse {
        data: report,
        message,
        success: true,
    }))
}
