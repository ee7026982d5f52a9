use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use moka::future::Cache;
use sea_orm::Database;

use attendance::HttpRecognizer;

use crate::auth::AuthSettings;
use crate::clients::{CloudinaryStore, ResendMailer};
use crate::schemas::AppState;

/// Initialize application configuration and state
pub async fn initialize_app_state() -> Result<AppState> {
    // Load configuration
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://markme.db".to_string());

    initialize_app_state_with_url(&database_url).await
}

/// Initialize application state against an explicit database URL
pub async fn initialize_app_state_with_url(database_url: &str) -> Result<AppState> {
    // Connect to database
    tracing::info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url)
        .await
        .context("failed to connect to database")?;

    // Initialize report cache
    let cache = Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300)) // 5 minutes
        .build();

    let auth = Arc::new(AuthSettings::from_env());

    let recognizer_url =
        std::env::var("MARKME_AI_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let recognizer = HttpRecognizer::new(recognizer_url)
        .map_err(|e| anyhow::anyhow!("failed to build recognizer client: {e}"))?;

    let cloud_name =
        std::env::var("CLOUDINARY_CLOUD_NAME").unwrap_or_else(|_| "demo".to_string());
    let upload_preset =
        std::env::var("CLOUDINARY_UPLOAD_PRESET").unwrap_or_else(|_| "unsigned".to_string());
    let images = CloudinaryStore::new(cloud_name, upload_preset)
        .map_err(|e| anyhow::anyhow!("failed to build image store: {e}"))?;

    let resend_key = std::env::var("RESEND_API_KEY").unwrap_or_default();
    let mail_from = std::env::var("MARKME_MAIL_FROM")
        .unwrap_or_else(|_| "MarkME <noreply@markme.app>".to_string());
    let mailer = ResendMailer::new(resend_key, mail_from)
        .map_err(|e| anyhow::anyhow!("failed to build mailer: {e}"))?;

    Ok(AppState {
        db,
        cache,
        auth,
        recognizer: Arc::new(recognizer),
        images: Arc::new(images),
        mailer: Arc::new(mailer),
    })
}

/// Get bind address from environment or use default
pub fn get_bind_address() -> String {
    std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}
