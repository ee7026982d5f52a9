pub mod extractor;
pub mod jwt;
pub mod tokens;

pub use extractor::AuthUser;

/// Token and OTP settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// HS256 signing secret for access and password-reset tokens.
    pub jwt_secret: String,
    /// Access-token lifetime in minutes.
    pub access_ttl_minutes: i64,
    /// Refresh-token lifetime in days.
    pub refresh_ttl_days: i64,
    /// OTP lifetime in minutes.
    pub otp_ttl_minutes: i64,
    /// Password-reset token lifetime in minutes.
    pub reset_ttl_minutes: i64,
}

impl AuthSettings {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: std::env::var("MARKME_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
            otp_ttl_minutes: 10,
            reset_ttl_minutes: 30,
        }
    }
}
