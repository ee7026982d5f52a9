//! Access and password-reset token issuance. Access tokens are short-lived
//! HS256 JWTs; long-lived session renewal goes through opaque refresh
//! tokens instead (see `tokens`).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use model::entities::user;

use super::AuthSettings;

const RESET_PURPOSE: &str = "password-reset";

/// Claims carried by an access token; this is the whole request context a
/// handler gets about the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: i32,
    /// School the user belongs to
    pub school_id: i32,
    /// Role string (ADMIN, TEACHER, PRINCIPAL)
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims for a password-reset token. The purpose field keeps reset tokens
/// from being accepted as access tokens and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: i32,
    pub purpose: String,
    pub exp: i64,
}

pub fn issue_access_token(
    settings: &AuthSettings,
    user: &user::Model,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        school_id: user.school_id,
        role: user.role.as_str().to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(settings.access_ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
}

pub fn decode_access_token(
    settings: &AuthSettings,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn issue_reset_token(
    settings: &AuthSettings,
    user_id: i32,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = ResetClaims {
        sub: user_id,
        purpose: RESET_PURPOSE.to_string(),
        exp: (Utc::now() + Duration::minutes(settings.reset_ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
}

/// Decode a reset token, rejecting tokens minted for any other purpose.
pub fn decode_reset_token(settings: &AuthSettings, token: &str) -> Option<i32> {
    let data = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    if data.claims.purpose != RESET_PURPOSE {
        return None;
    }
    Some(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::entities::user::UserRole;

    fn settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
            otp_ttl_minutes: 10,
            reset_ttl_minutes: 30,
        }
    }

    fn test_user() -> user::Model {
        user::Model {
            id: 7,
            school_id: 3,
            email: "t@example.com".to_string(),
            password_hash: String::new(),
            full_name: "T".to_string(),
            role: UserRole::Teacher,
            is_active: true,
            is_verified: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let settings = settings();
        let token = issue_access_token(&settings, &test_user()).unwrap();
        let claims = decode_access_token(&settings, &token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.school_id, 3);
        assert_eq!(claims.role, "TEACHER");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let settings = settings();
        let token = issue_access_token(&settings, &test_user()).unwrap();

        let mut other = settings.clone();
        other.jwt_secret = "different".to_string();
        assert!(decode_access_token(&other, &token).is_err());
    }

    #[test]
    fn reset_token_is_not_an_access_token() {
        let settings = settings();
        let reset = issue_reset_token(&settings, 7).unwrap();
        assert!(decode_access_token(&settings, &reset).is_err());
        assert_eq!(decode_reset_token(&settings, &reset), Some(7));
    }

    #[test]
    fn access_token_is_not_a_reset_token() {
        let settings = settings();
        let access = issue_access_token(&settings, &test_user()).unwrap();
        assert_eq!(decode_reset_token(&settings, &access), None);
    }
}
