use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use model::entities::{classroom, student, user, user::UserRole};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::students::StudentResponse;
use crate::schemas::{ApiResponse, AppState};

/// Request body for creating a classroom
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateClassroomRequest {
    #[validate(length(min = 1))]
    pub educational_year: String,
    #[validate(length(min = 1))]
    pub std: String,
    #[validate(length(min = 1))]
    pub division: String,
    pub class_teacher_id: i32,
}

/// Request body for updating a classroom
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateClassroomRequest {
    pub educational_year: Option<String>,
    pub std: Option<String>,
    pub division: Option<String>,
    pub class_teacher_id: Option<i32>,
}

/// Classroom response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassroomResponse {
    pub id: i32,
    pub school_id: i32,
    pub educational_year: String,
    pub std: String,
    pub division: String,
    pub class_teacher_id: i32,
}

impl From<classroom::Model> for ClassroomResponse {
    fn from(model: classroom::Model) -> Self {
        Self {
            id: model.id,
            school_id: model.school_id,
            educational_year: model.educational_year,
            std: model.std,
            division: model.division,
            class_teacher_id: model.class_teacher_id,
        }
    }
}

/// The assigned class teacher must exist, be a TEACHER, and belong to the
/// caller's school.
async fn validate_class_teacher(
    state: &AppState,
    school_id: i32,
    teacher_id: i32,
) -> Result<(), ApiError> {
    let teacher = user::Entity::find_by_id(teacher_id)
        .filter(user::Column::SchoolId.eq(school_id))
        .one(&state.db)
        .await?;

    match teacher {
        Some(teacher) if teacher.role == UserRole::Teacher => Ok(()),
        Some(_) => Err(ApiError::Validation(format!(
            "user {teacher_id} is not a teacher"
        ))),
        None => Err(ApiError::Validation(format!(
            "teacher {teacher_id} does not exist"
        ))),
    }
}

/// Fetch a classroom scoped to the caller's school.
pub(crate) async fn classroom_in_school(
    state: &AppState,
    school_id: i32,
    classroom_id: i32,
) -> Result<classroom::Model, ApiError> {
    classroom::Entity::find_by_id(classroom_id)
        .filter(classroom::Column::SchoolId.eq(school_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("classroom {classroom_id} not found")))
}

/// Create a classroom
#[utoipa::path(
    post,
    path = "/api/v1/classrooms",
    tag = "classrooms",
    request_body = CreateClassroomRequest,
    responses(
        (status = 201, description = "Classroom created successfully", body = ApiResponse<ClassroomResponse>),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Classroom already exists", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Invalid request", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn create_classroom(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateClassroomRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ClassroomResponse>>), ApiError> {
    auth.require_admin()?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    validate_class_teacher(&state, auth.school_id, request.class_teacher_id).await?;

    let new_classroom = classroom::ActiveModel {
        school_id: Set(auth.school_id),
        educational_year: Set(request.educational_year.clone()),
        std: Set(request.std.clone()),
        division: Set(request.division.clone()),
        class_teacher_id: Set(request.class_teacher_id),
        ..Default::default()
    };

    match new_classroom.insert(&state.db).await {
        Ok(classroom_model) => {
            info!(classroom_id = classroom_model.id, "Classroom created");
            let response = ApiResponse {
                data: ClassroomResponse::from(classroom_model),
                message: "Classroom created successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => Err(ApiError::from_db(
            db_error,
            &format!(
                "classroom {}-{} already exists for {}",
                request.std, request.division, request.educational_year
            ),
        )),
    }
}

/// List the school's classrooms
#[utoipa::path(
    get,
    path = "/api/v1/classrooms",
    tag = "classrooms",
    responses(
        (status = 200, description = "Classrooms retrieved successfully", body = ApiResponse<Vec<ClassroomResponse>>)
    )
)]
#[instrument(skip(state))]
pub async fn get_classrooms(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<ClassroomResponse>>>, ApiError> {
    let classrooms = classroom::Entity::find()
        .filter(classroom::Column::SchoolId.eq(auth.school_id))
        .order_by_asc(classroom::Column::Std)
        .order_by_asc(classroom::Column::Division)
        .all(&state.db)
        .await?;

    debug!(count = classrooms.len(), "Retrieved classrooms");
    let response = ApiResponse {
        data: classrooms.into_iter().map(ClassroomResponse::from).collect(),
        message: "Classrooms retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Get a specific classroom by ID
#[utoipa::path(
    get,
    path = "/api/v1/classrooms/{classroom_id}",
    tag = "classrooms",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    responses(
        (status = 200, description = "Classroom retrieved successfully", body = ApiResponse<ClassroomResponse>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_classroom(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<ClassroomResponse>>, ApiError> {
    let classroom_model = classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let response = ApiResponse {
        data: ClassroomResponse::from(classroom_model),
        message: "Classroom retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Update a classroom
#[utoipa::path(
    put,
    path = "/api/v1/classrooms/{classroom_id}",
    tag = "classrooms",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    request_body = UpdateClassroomRequest,
    responses(
        (status = 200, description = "Classroom updated successfully", body = ApiResponse<ClassroomResponse>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Classroom already exists", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn update_classroom(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateClassroomRequest>,
) -> Result<Json<ApiResponse<ClassroomResponse>>, ApiError> {
    auth.require_admin()?;

    let existing = classroom_in_school(&state, auth.school_id, classroom_id).await?;

    if let Some(teacher_id) = request.class_teacher_id {
        validate_class_teacher(&state, auth.school_id, teacher_id).await?;
    }

    let mut classroom_active: classroom::ActiveModel = existing.into();
    if let Some(educational_year) = request.educational_year {
        classroom_active.educational_year = Set(educational_year);
    }
    if let Some(std) = request.std {
        classroom_active.std = Set(std);
    }
    if let Some(division) = request.division {
        classroom_active.division = Set(division);
    }
    if let Some(teacher_id) = request.class_teacher_id {
        classroom_active.class_teacher_id = Set(teacher_id);
    }

    match classroom_active.update(&state.db).await {
        Ok(updated) => {
            info!(classroom_id, "Classroom updated");
            let response = ApiResponse {
                data: ClassroomResponse::from(updated),
                message: "Classroom updated successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Err(db_error) => Err(ApiError::from_db(
            db_error,
            "a classroom with that year/std/division already exists",
        )),
    }
}

/// Delete a classroom and everything under it
#[utoipa::path(
    delete,
    path = "/api/v1/classrooms/{classroom_id}",
    tag = "classrooms",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    responses(
        (status = 200, description = "Classroom deleted successfully", body = ApiResponse<String>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_classroom(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    auth.require_admin()?;

    classroom_in_school(&state, auth.school_id, classroom_id).await?;
    classroom::Entity::delete_by_id(classroom_id)
        .exec(&state.db)
        .await?;
    info!(classroom_id, "Classroom deleted");

    let response = ApiResponse {
        data: format!("Classroom {classroom_id} deleted"),
        message: "Classroom deleted successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// List a classroom's students
#[utoipa::path(
    get,
    path = "/api/v1/classrooms/{classroom_id}/students",
    tag = "classrooms",
    params(
        ("classroom_id" = i32, Path, description = "Classroom ID"),
    ),
    responses(
        (status = 200, description = "Students retrieved successfully", body = ApiResponse<Vec<StudentResponse>>),
        (status = 404, description = "Classroom not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_classroom_students(
    Path(classroom_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<StudentResponse>>>, ApiError> {
    classroom_in_school(&state, auth.school_id, classroom_id).await?;

    let students = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom_id))
        .order_by_asc(student::Column::RollNumber)
        .all(&state.db)
        .await?;

    let response = ApiResponse {
        data: students.into_iter().map(StudentResponse::from).collect(),
        message: "Students retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}
