#[cfg(test)]
pub mod test_utils {
    use std::sync::Arc;

    use axum::http::{header, HeaderValue};
    use axum_test::TestServer;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use moka::future::Cache;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    use attendance::MockRecognizer;
    use model::entities::{classroom, school, student, user, user::UserRole};

    use crate::auth::{jwt, tokens, AuthSettings};
    use crate::clients::images::MockImageStore;
    use crate::clients::mailer::MockMailer;
    use crate::router::create_router;
    use crate::schemas::AppState;

    /// Password used for every seeded account.
    pub const TEST_PASSWORD: &str = "correct-horse-battery";

    /// Everything a test needs: the state wired to mocks, handles on the
    /// mocks themselves, and a seeded school with one user per role.
    pub struct TestContext {
        pub state: AppState,
        pub recognizer: Arc<MockRecognizer>,
        pub images: Arc<MockImageStore>,
        pub mailer: Arc<MockMailer>,
        pub school: school::Model,
        pub admin: user::Model,
        pub teacher: user::Model,
        pub principal: user::Model,
    }

    /// Create an in-memory SQLite database for testing
    pub async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");

        // Run migrations
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    pub fn test_auth_settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
            otp_ttl_minutes: 10,
            reset_ttl_minutes: 30,
        }
    }

    pub async fn seed_user(
        db: &DatabaseConnection,
        school_id: i32,
        email: &str,
        role: UserRole,
        is_verified: bool,
    ) -> user::Model {
        user::ActiveModel {
            school_id: Set(school_id),
            email: Set(email.to_string()),
            password_hash: Set(tokens::hash_password(TEST_PASSWORD).expect("hash failed")),
            full_name: Set(format!("Test {}", role.as_str())),
            role: Set(role),
            is_active: Set(true),
            is_verified: Set(is_verified),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create test user")
    }

    /// Create AppState wired to mocks plus a seeded school and one account
    /// per role.
    pub async fn setup_test_context() -> TestContext {
        let db = setup_test_db().await;

        let school = school::ActiveModel {
            school_idx: Set("SCH-TEST0001".to_string()),
            name: Set("Test High School".to_string()),
            address: Set(Some("1 Test Lane".to_string())),
            ..Default::default()
        }
        .insert(&db)
        .await
        .expect("Failed to create test school");

        let admin = seed_user(&db, school.id, "admin@test.school", UserRole::Admin, true).await;
        let teacher =
            seed_user(&db, school.id, "teacher@test.school", UserRole::Teacher, false).await;
        let principal = seed_user(
            &db,
            school.id,
            "principal@test.school",
            UserRole::Principal,
            false,
        )
        .await;

        let recognizer = Arc::new(MockRecognizer::new());
        let images = Arc::new(MockImageStore::new());
        let mailer = Arc::new(MockMailer::new());

        let state = AppState {
            db,
            cache: Cache::new(100),
            auth: Arc::new(test_auth_settings()),
            recognizer: recognizer.clone(),
            images: images.clone(),
            mailer: mailer.clone(),
        };

        TestContext {
            state,
            recognizer,
            images,
            mailer,
            school,
            admin,
            teacher,
            principal,
        }
    }

    impl TestContext {
        pub fn server(&self) -> TestServer {
            let _ = init_test_tracing();
            TestServer::new(create_router(self.state.clone())).expect("Failed to build test server")
        }

        /// Authorization header value for a seeded user.
        pub fn bearer_for(&self, user: &user::Model) -> HeaderValue {
            let token =
                jwt::issue_access_token(&self.state.auth, user).expect("failed to sign token");
            HeaderValue::from_str(&format!("Bearer {token}")).expect("invalid header value")
        }

        pub async fn seed_classroom(&self, std: &str, division: &str) -> classroom::Model {
            classroom::ActiveModel {
                school_id: Set(self.school.id),
                educational_year: Set("2025-26".to_string()),
                std: Set(std.to_string()),
                division: Set(division.to_string()),
                class_teacher_id: Set(self.teacher.id),
                ..Default::default()
            }
            .insert(&self.state.db)
            .await
            .expect("Failed to create test classroom")
        }

        pub async fn seed_students(
            &self,
            classroom: &classroom::Model,
            count: usize,
        ) -> Vec<student::Model> {
            let mut students = Vec::with_capacity(count);
            for n in 1..=count {
                let student = student::ActiveModel {
                    classroom_id: Set(classroom.id),
                    name: Set(format!("Student {n}")),
                    roll_number: Set(n.to_string()),
                    profile_image_url: Set(None),
                    ..Default::default()
                }
                .insert(&self.state.db)
                .await
                .expect("Failed to create test student");
                students.push(student);
            }
            students
        }
    }

    pub const AUTHORIZATION: axum::http::HeaderName = header::AUTHORIZATION;

    /// Initialize tracing for tests with output to STDERR.
    ///
    /// The log level is determined by the RUST_LOG environment variable,
    /// defaulting to WARN if not set.
    fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| match level.to_uppercase().as_str() {
                "ERROR" => Some(Level::ERROR),
                "WARN" => Some(Level::WARN),
                "INFO" => Some(Level::INFO),
                "DEBUG" => Some(Level::DEBUG),
                "TRACE" => Some(Level::TRACE),
                _ => None,
            })
            .unwrap_or(Level::WARN);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr) // Output to stderr, which is captured by tests
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}
