use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use model::entities::{user, user::UserRole};

use crate::auth::{tokens, AuthUser};
use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState};

/// Request body for provisioning a teacher or principal account
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    /// TEACHER or PRINCIPAL; admins only come in through self-registration
    pub role: String,
}

/// Request body for updating a user
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListUsersQuery {
    /// Filter by role (ADMIN, TEACHER, PRINCIPAL)
    pub role: Option<String>,
}

/// User response model; never exposes the password hash
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub school_id: i32,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            school_id: model.school_id,
            email: model.email,
            full_name: model.full_name,
            role: model.role.as_str().to_string(),
            is_active: model.is_active,
            is_verified: model.is_verified,
        }
    }
}

/// Provision a teacher or principal account
///
/// Admin-provisioned accounts skip OTP verification entirely.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<UserResponse>),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse),
        (status = 409, description = "Email already in use", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Invalid request", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    auth.require_admin()?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let role = match UserRole::parse(&request.role) {
        Some(UserRole::Teacher) => UserRole::Teacher,
        Some(UserRole::Principal) => UserRole::Principal,
        _ => {
            return Err(ApiError::Validation(
                "role must be TEACHER or PRINCIPAL".to_string(),
            ))
        }
    };

    let password_hash = tokens::hash_password(&request.password)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;

    let new_user = user::ActiveModel {
        school_id: Set(auth.school_id),
        email: Set(request.email.clone()),
        password_hash: Set(password_hash),
        full_name: Set(request.full_name.clone()),
        role: Set(role),
        is_active: Set(true),
        // Only self-registered admins gate login on verification.
        is_verified: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match new_user.insert(&state.db).await {
        Ok(user_model) => {
            info!(
                user_id = user_model.id,
                role = user_model.role.as_str(),
                "User created"
            );
            let response = ApiResponse {
                data: UserResponse::from(user_model),
                message: "User created successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => Err(ApiError::from_db(
            db_error,
            &format!("email '{}' is already in use", request.email),
        )),
    }
}

/// List the school's users
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(
        ("role" = Option<String>, Query, description = "Filter by role"),
    ),
    responses(
        (status = 200, description = "Users retrieved successfully", body = ApiResponse<Vec<UserResponse>>),
        (status = 403, description = "Not an admin", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    auth.require_admin()?;

    let mut finder = user::Entity::find().filter(user::Column::SchoolId.eq(auth.school_id));
    if let Some(role) = query.role.as_deref() {
        let role = UserRole::parse(role)
            .ok_or_else(|| ApiError::Validation(format!("unknown role '{role}'")))?;
        finder = finder.filter(user::Column::Role.eq(role));
    }

    let users = finder.all(&state.db).await?;
    debug!(count = users.len(), "Retrieved users");

    let response = ApiResponse {
        data: users.into_iter().map(UserResponse::from).collect(),
        message: "Users retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Get a specific user by ID
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User retrieved successfully", body = ApiResponse<UserResponse>),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    auth.require_admin()?;

    let user_model = user::Entity::find_by_id(user_id)
        .filter(user::Column::SchoolId.eq(auth.school_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id} not found")))?;

    let response = ApiResponse {
        data: UserResponse::from(user_model),
        message: "User retrieved successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Update a user's name or active flag
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated successfully", body = ApiResponse<UserResponse>),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn update_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    auth.require_admin()?;

    let existing = user::Entity::find_by_id(user_id)
        .filter(user::Column::SchoolId.eq(auth.school_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id} not found")))?;

    let mut user_active: user::ActiveModel = existing.into();
    if let Some(full_name) = request.full_name {
        user_active.full_name = Set(full_name);
    }
    if let Some(is_active) = request.is_active {
        user_active.is_active = Set(is_active);
    }

    let updated = user_active.update(&state.db).await?;
    info!(user_id, "User updated");

    let response = ApiResponse {
        data: UserResponse::from(updated),
        message: "User updated successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Delete a teacher account
///
/// Principal and admin accounts cannot be deleted through the API.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User deleted successfully", body = ApiResponse<String>),
        (status = 403, description = "Only teacher accounts can be deleted", body = crate::schemas::ErrorResponse),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    auth.require_admin()?;

    let existing = user::Entity::find_by_id(user_id)
        .filter(user::Column::SchoolId.eq(auth.school_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id} not found")))?;

    if existing.role != UserRole::Teacher {
        warn!(user_id, role = existing.role.as_str(), "Refused deletion");
        return Err(ApiError::Forbidden(
            "only teacher accounts can be deleted".to_string(),
        ));
    }

    user::Entity::delete_by_id(user_id).exec(&state.db).await?;
    info!(user_id, "User deleted");

    let response = ApiResponse {
        data: format!("User {user_id} deleted"),
        message: "User deleted successfully".to_string(),
        success: true,
    };
    Ok(Json(response))
}
