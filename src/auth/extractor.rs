use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};

use model::entities::user::UserRole;

use crate::auth::jwt;
use crate::error::ApiError;
use crate::schemas::AppState;

/// Typed request context for an authenticated caller, extracted from the
/// Bearer access token. Replaces the ad-hoc `req.user` shape with something
/// handlers can gate on directly.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub school_id: i32,
    pub role: UserRole,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "this operation requires an admin account".to_string(),
            ))
        }
    }

    /// Admins and teachers may mutate attendance; principals are read-only.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        match self.role {
            UserRole::Admin | UserRole::Teacher => Ok(()),
            UserRole::Principal => Err(ApiError::Forbidden(
                "principal accounts are read-only".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

        let claims = jwt::decode_access_token(&state.auth, token)
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".to_string()))?;

        let role = UserRole::parse(&claims.role)
            .ok_or_else(|| ApiError::Unauthorized("unknown role in token".to_string()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            school_id: claims.school_id,
            role,
        })
    }
}
