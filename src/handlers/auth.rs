use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::Json,
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use model::entities::{pending_admin_registration, refresh_token, school, user, user::UserRole};

use crate::auth::{jwt, tokens};
use crate::error::ApiError;
use crate::handlers::users::UserResponse;
use crate::schemas::{ApiResponse, AppState};

const REFRESH_COOKIE: &str = "refreshToken";

/// Request body for the first phase of admin signup
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct RegisterAdminRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub school_name: String,
    pub school_address: Option<String>,
}

/// Request body for re-sending an OTP
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SendOtpRequest {
    pub email: String,
}

/// Request body for completing admin signup
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Request body for login
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for refresh and logout; the token may come from the
/// httpOnly cookie instead.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

/// Request body for requesting a password reset
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for completing a password reset
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

/// A freshly issued access/refresh token pair
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login (and OTP verification) response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

fn set_refresh_cookie(token: &str, max_age_seconds: i64) -> [(HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        format!(
            "{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_seconds}"
        ),
    )]
}

fn clear_refresh_cookie() -> [(HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        format!("{REFRESH_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"),
    )]
}

fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == REFRESH_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// Token from the request body when present, the cookie otherwise.
fn presented_refresh_token(headers: &HeaderMap, body: Option<RefreshTokenRequest>) -> Option<String> {
    body.and_then(|request| request.refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| read_refresh_cookie(headers))
}

/// Issue an access token and a rotated refresh token for the user.
async fn issue_session(state: &AppState, user: &user::Model) -> Result<TokenPairResponse, ApiError> {
    let access_token = jwt::issue_access_token(&state.auth, user)
        .map_err(|e| ApiError::Internal(format!("failed to sign access token: {e}")))?;

    let refresh = tokens::generate_opaque_token();
    let now = Utc::now();

    refresh_token::ActiveModel {
        user_id: Set(user.id),
        token_hash: Set(tokens::digest(&refresh)),
        expires_at: Set(now + Duration::days(state.auth.refresh_ttl_days)),
        revoked_at: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token: refresh,
    })
}

/// Start admin signup: stage the registration and email an OTP
///
/// No school or user rows exist until the OTP is verified.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register-admin",
    tag = "auth",
    request_body = RegisterAdminRequest,
    responses(
        (status = 202, description = "Verification code sent", body = ApiResponse<String>),
        (status = 409, description = "Account already exists", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Invalid request", body = crate::schemas::ErrorResponse),
        (status = 503, description = "Email delivery failed", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn register_admin(
    State(state): State<AppState>,
    Json(request): Json<RegisterAdminRequest>,
) -> Result<(StatusCode, Json<ApiResponse<String>>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&request.email))
        .one(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "an account already exists for {}",
            request.email
        )));
    }

    let password_hash = tokens::hash_password(&request.password)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;
    let otp = tokens::generate_otp();
    let now = Utc::now();

    // Re-registration replaces any previous pending row for the email.
    pending_admin_registration::Entity::delete_many()
        .filter(pending_admin_registration::Column::Email.eq(&request.email))
        .exec(&state.db)
        .await?;

    pending_admin_registration::ActiveModel {
        email: Set(request.email.clone()),
        password_hash: Set(password_hash),
        otp_hash: Set(tokens::digest(&otp)),
        full_name: Set(request.full_name.clone()),
        school_name: Set(request.school_name.clone()),
        school_address: Set(request.school_address.clone()),
        expires_at: Set(now + Duration::minutes(state.auth.otp_ttl_minutes)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    state
        .mailer
        .send_otp(&request.email, &otp)
        .await
        .map_err(|e| {
            ApiError::ServiceUnavailable(format!("could not send verification email: {e}"))
        })?;

    info!(email = %request.email, "Admin registration staged, OTP sent");
    let response = ApiResponse {
        data: request.email,
        message: "Verification code sent".to_string(),
        success: true,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Re-send the OTP for a pending registration
#[utoipa::path(
    post,
    path = "/api/v1/auth/send-otp",
    tag = "auth",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Verification code sent", body = ApiResponse<String>),
        (status = 404, description = "No pending registration", body = crate::schemas::ErrorResponse),
        (status = 503, description = "Email delivery failed", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let pending = pending_admin_registration::Entity::find()
        .filter(pending_admin_registration::Column::Email.eq(&request.email))
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("no pending registration for this email".to_string())
        })?;

    let otp = tokens::generate_otp();
    let now = Utc::now();

    let mut staged: pending_admin_registration::ActiveModel = pending.into();
    staged.otp_hash = Set(tokens::digest(&otp));
    staged.expires_at = Set(now + Duration::minutes(state.auth.otp_ttl_minutes));
    staged.update(&state.db).await?;

    state
        .mailer
        .send_otp(&request.email, &otp)
        .await
        .map_err(|e| {
            ApiError::ServiceUnavailable(format!("could not send verification email: {e}"))
        })?;

    let response = ApiResponse {
        data: request.email,
        message: "Verification code sent".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Complete admin signup: verify the OTP and create school + admin
///
/// Creation runs in a transaction; if a user already exists for the email
/// only the verified flag is flipped. Tokens are issued immediately.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-otp",
    tag = "auth",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Registration verified", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid or expired code", body = crate::schemas::ErrorResponse),
        (status = 404, description = "No pending registration", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<([(HeaderName, String); 1], Json<ApiResponse<LoginResponse>>), ApiError> {
    let pending = pending_admin_registration::Entity::find()
        .filter(pending_admin_registration::Column::Email.eq(&request.email))
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("no pending registration for this email".to_string())
        })?;

    if pending.expires_at <= Utc::now() {
        pending_admin_registration::Entity::delete_by_id(pending.id)
            .exec(&state.db)
            .await?;
        return Err(ApiError::BadRequest(
            "verification code expired; register again".to_string(),
        ));
    }

    if tokens::digest(&request.otp) != pending.otp_hash {
        return Err(ApiError::BadRequest(
            "invalid verification code".to_string(),
        ));
    }

    let txn = state.db.begin().await?;

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&pending.email))
        .one(&txn)
        .await?;

    let user_model = match existing {
        Some(existing) => {
            let mut verified: user::ActiveModel = existing.into();
            verified.is_verified = Set(true);
            verified.update(&txn).await?
        }
        None => {
            // The school index only needs to be stable and unique per
            // email, which the email digest already is.
            let school_idx = format!(
                "SCH-{}",
                tokens::digest(&pending.email)[..8].to_uppercase()
            );
            let school = school::ActiveModel {
                school_idx: Set(school_idx),
                name: Set(pending.school_name.clone()),
                address: Set(pending.school_address.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            user::ActiveModel {
                school_id: Set(school.id),
                email: Set(pending.email.clone()),
                password_hash: Set(pending.password_hash.clone()),
                full_name: Set(pending.full_name.clone()),
                role: Set(UserRole::Admin),
                is_active: Set(true),
                is_verified: Set(true),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    pending_admin_registration::Entity::delete_by_id(pending.id)
        .exec(&txn)
        .await?;
    txn.commit().await?;

    if let Err(e) = state
        .mailer
        .send_welcome(&user_model.email, &user_model.full_name)
        .await
    {
        warn!(email = %user_model.email, "Welcome email failed: {e}");
    }

    let pair = issue_session(&state, &user_model).await?;
    info!(user_id = user_model.id, "Admin registration verified");

    let cookie = set_refresh_cookie(&pair.refresh_token, state.auth.refresh_ttl_days * 86_400);
    let response = ApiResponse {
        data: LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserResponse::from(user_model),
        },
        message: "Registration verified".to_string(),
        success: true,
    };
    Ok((cookie, Json(response)))
}

/// Log in with email and password
///
/// Admins must have completed OTP verification; teachers and principals are
/// provisioned pre-verified and skip that gate.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Bad credentials", body = crate::schemas::ErrorResponse),
        (status = 403, description = "Account disabled or unverified", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<([(HeaderName, String); 1], Json<ApiResponse<LoginResponse>>), ApiError> {
    let user_model = user::Entity::find()
        .filter(user::Column::Email.eq(&request.email))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid email or password".to_string()))?;

    if !tokens::verify_password(&user_model.password_hash, &request.password) {
        return Err(ApiError::Unauthorized(
            "invalid email or password".to_string(),
        ));
    }

    if !user_model.is_active {
        return Err(ApiError::Forbidden("account is disabled".to_string()));
    }

    if user_model.role == UserRole::Admin && !user_model.is_verified {
        return Err(ApiError::Forbidden(
            "email not verified; complete OTP verification first".to_string(),
        ));
    }

    let pair = issue_session(&state, &user_model).await?;
    info!(user_id = user_model.id, role = user_model.role.as_str(), "User logged in");

    let cookie = set_refresh_cookie(&pair.refresh_token, state.auth.refresh_ttl_days * 86_400);
    let response = ApiResponse {
        data: LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserResponse::from(user_model),
        },
        message: "Logged in".to_string(),
        success: true,
    };
    Ok((cookie, Json(response)))
}

/// Rotate a refresh token
///
/// The presented token (body or cookie) is revoked and a fresh pair is
/// issued. A revoked or expired token yields 401; expired rows for the user
/// are pruned on the way through.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh-token",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = ApiResponse<TokenPairResponse>),
        (status = 401, description = "Invalid refresh token", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, headers, request))]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<RefreshTokenRequest>>,
) -> Result<([(HeaderName, String); 1], Json<ApiResponse<TokenPairResponse>>), ApiError> {
    let presented = presented_refresh_token(&headers, request.map(|Json(r)| r))
        .ok_or_else(|| ApiError::Unauthorized("missing refresh token".to_string()))?;

    let row = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(tokens::digest(&presented)))
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid refresh token".to_string()))?;

    let now = Utc::now();
    if !row.is_usable(now) {
        return Err(ApiError::Unauthorized(
            "refresh token expired or revoked".to_string(),
        ));
    }

    let user_model = user::Entity::find_by_id(row.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;

    if !user_model.is_active {
        return Err(ApiError::Forbidden("account is disabled".to_string()));
    }

    let user_id = row.user_id;
    let mut revoked: refresh_token::ActiveModel = row.into();
    revoked.revoked_at = Set(Some(now));
    revoked.update(&state.db).await?;

    // Stand-in for Mongo's TTL index: sweep this user's expired rows.
    refresh_token::Entity::delete_many()
        .filter(refresh_token::Column::UserId.eq(user_id))
        .filter(refresh_token::Column::ExpiresAt.lte(now))
        .exec(&state.db)
        .await?;

    let pair = issue_session(&state, &user_model).await?;

    let cookie = set_refresh_cookie(&pair.refresh_token, state.auth.refresh_ttl_days * 86_400);
    let response = ApiResponse {
        data: pair,
        message: "Tokens rotated".to_string(),
        success: true,
    };
    Ok((cookie, Json(response)))
}

/// Log out: revoke the presented refresh token and clear the cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out", body = ApiResponse<String>)
    )
)]
#[instrument(skip(state, headers, request))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<RefreshTokenRequest>>,
) -> Result<([(HeaderName, String); 1], Json<ApiResponse<String>>), ApiError> {
    if let Some(presented) = presented_refresh_token(&headers, request.map(|Json(r)| r)) {
        let row = refresh_token::Entity::find()
            .filter(refresh_token::Column::TokenHash.eq(tokens::digest(&presented)))
            .one(&state.db)
            .await?;

        if let Some(row) = row {
            let mut revoked: refresh_token::ActiveModel = row.into();
            revoked.revoked_at = Set(Some(Utc::now()));
            revoked.update(&state.db).await?;
        }
    }

    let response = ApiResponse {
        data: "logged out".to_string(),
        message: "Logged out".to_string(),
        success: true,
    };
    Ok((clear_refresh_cookie(), Json(response)))
}

/// Request a password reset email
///
/// Responds 200 whether or not the account exists.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent if the account exists", body = ApiResponse<String>),
        (status = 503, description = "Email delivery failed", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let user_model = user::Entity::find()
        .filter(user::Column::Email.eq(&request.email))
        .one(&state.db)
        .await?;

    if let Some(user_model) = user_model.filter(|u| u.is_active) {
        let token = jwt::issue_reset_token(&state.auth, user_model.id)
            .map_err(|e| ApiError::Internal(format!("failed to sign reset token: {e}")))?;

        state
            .mailer
            .send_password_reset(&user_model.email, &token)
            .await
            .map_err(|e| {
                ApiError::ServiceUnavailable(format!("could not send reset email: {e}"))
            })?;
    }

    let response = ApiResponse {
        data: request.email,
        message: "If the account exists, a reset email was sent".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// Complete a password reset
///
/// Replaces the password hash and revokes every outstanding refresh token
/// for the account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = ApiResponse<String>),
        (status = 401, description = "Invalid or expired reset token", body = crate::schemas::ErrorResponse),
        (status = 422, description = "Invalid request", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user_id = jwt::decode_reset_token(&state.auth, &request.token)
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired reset token".to_string()))?;

    let user_model = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired reset token".to_string()))?;

    let password_hash = tokens::hash_password(&request.new_password)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;

    let email = user_model.email.clone();
    let mut updated: user::ActiveModel = user_model.into();
    updated.password_hash = Set(password_hash);
    updated.update(&state.db).await?;

    // Force re-login everywhere.
    refresh_token::Entity::update_many()
        .set(refresh_token::ActiveModel {
            revoked_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(refresh_token::Column::UserId.eq(user_id))
        .filter(refresh_token::Column::RevokedAt.is_null())
        .exec(&state.db)
        .await?;

    info!(user_id, "Password reset completed");
    let response = ApiResponse {
        data: email,
        message: "Password reset".to_string(),
        success: true,
    };
    Ok(Json(response))
}
