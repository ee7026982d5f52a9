#[cfg(test)]
mod integration_tests {
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use chrono::{Duration, Utc};
    use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

    use model::entities::{attendance_record, pending_admin_registration, user, user::UserRole};

    use crate::handlers::auth::{
        ForgotPasswordRequest, LoginRequest, RefreshTokenRequest, RegisterAdminRequest,
        ResetPasswordRequest, VerifyOtpRequest,
    };
    use crate::handlers::classrooms::CreateClassroomRequest;
    use crate::handlers::records::{BulkRecordUpdate, BulkUpdateRecordsRequest, UpdateRecordRequest};
    use crate::handlers::sessions::UpdateSessionStatusRequest;
    use crate::handlers::students::CreateStudentRequest;
    use crate::handlers::users::CreateUserRequest;
    use crate::schemas::ApiResponse;
    use crate::test_utils::test_utils::{
        setup_test_context, TestContext, AUTHORIZATION, TEST_PASSWORD,
    };

    #[tokio::test]
    async fn test_health_check() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server.get("/health").await;
        response.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server.get("/api/v1/classrooms").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    // ===================== Auth =====================

    #[tokio::test]
    async fn test_admin_registration_and_otp_flow() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let register = RegisterAdminRequest {
            email: "newadmin@example.com".to_string(),
            password: "a-strong-password".to_string(),
            full_name: "New Admin".to_string(),
            school_name: "Sunrise Public School".to_string(),
            school_address: Some("42 Hill Road".to_string()),
        };

        let response = server.post("/api/v1/auth/register-admin").json(&register).await;
        response.assert_status(StatusCode::ACCEPTED);

        // No user or school rows exist yet; only the staged registration.
        let users = user::Entity::find()
            .filter(user::Column::Email.eq("newadmin@example.com"))
            .count(&ctx.state.db)
            .await
            .unwrap();
        assert_eq!(users, 0);

        let otp = ctx
            .mailer
            .last_otp_for("newadmin@example.com")
            .expect("OTP email not sent");

        // A wrong code is rejected and changes nothing.
        let bad = server
            .post("/api/v1/auth/verify-otp")
            .json(&VerifyOtpRequest {
                email: "newadmin@example.com".to_string(),
                otp: "000000".to_string(),
            })
            .await;
        // The real OTP is random; in the absurdly unlikely collision this
        // assertion is the one to suspect.
        if otp != "000000" {
            bad.assert_status(StatusCode::BAD_REQUEST);
        }

        let response = server
            .post("/api/v1/auth/verify-otp")
            .json(&VerifyOtpRequest {
                email: "newadmin@example.com".to_string(),
                otp,
            })
            .await;
        response.assert_status(StatusCode::OK);

        let body: ApiResponse<serde_json::Value> = response.json();
        assert!(body.success);
        assert!(!body.data["access_token"].as_str().unwrap().is_empty());
        assert!(!body.data["refresh_token"].as_str().unwrap().is_empty());
        assert_eq!(body.data["user"]["role"], "ADMIN");
        assert_eq!(body.data["user"]["is_verified"], true);

        // The pending row is consumed.
        let pending = pending_admin_registration::Entity::find()
            .count(&ctx.state.db)
            .await
            .unwrap();
        assert_eq!(pending, 0);

        // And the new admin can log in normally.
        let login = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: "newadmin@example.com".to_string(),
                password: "a-strong-password".to_string(),
            })
            .await;
        login.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_otp_is_rejected() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let register = RegisterAdminRequest {
            email: "late@example.com".to_string(),
            password: "a-strong-password".to_string(),
            full_name: "Late Admin".to_string(),
            school_name: "Sunset School".to_string(),
            school_address: None,
        };
        server
            .post("/api/v1/auth/register-admin")
            .json(&register)
            .await
            .assert_status(StatusCode::ACCEPTED);

        // Age the pending row past its expiry.
        let pending = pending_admin_registration::Entity::find()
            .filter(pending_admin_registration::Column::Email.eq("late@example.com"))
            .one(&ctx.state.db)
            .await
            .unwrap()
            .unwrap();
        let mut staged: pending_admin_registration::ActiveModel = pending.into();
        staged.expires_at = Set(Utc::now() - Duration::minutes(1));
        staged.update(&ctx.state.db).await.unwrap();

        let otp = ctx.mailer.last_otp_for("late@example.com").unwrap();
        let response = server
            .post("/api/v1/auth/verify-otp")
            .json(&VerifyOtpRequest {
                email: "late@example.com".to_string(),
                otp,
            })
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_admin_conflicts_with_existing_account() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let register = RegisterAdminRequest {
            email: ctx.admin.email.clone(),
            password: "a-strong-password".to_string(),
            full_name: "Imposter".to_string(),
            school_name: "Shadow School".to_string(),
            school_address: None,
        };

        let response = server.post("/api/v1/auth/register-admin").json(&register).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unverified_admin_login_forbidden_but_teacher_unaffected() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        // An admin that never completed OTP verification.
        let unverified = crate::test_utils::test_utils::seed_user(
            &ctx.state.db,
            ctx.school.id,
            "unverified@test.school",
            UserRole::Admin,
            false,
        )
        .await;

        let response = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: unverified.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        // The teacher account was seeded with is_verified = false; the flag
        // is irrelevant for teachers.
        let response = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.teacher.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.admin.email.clone(),
                password: "wrong".to_string(),
            })
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_rotation() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let login = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.admin.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await;
        login.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = login.json();
        let first_refresh = body.data["refresh_token"].as_str().unwrap().to_string();

        // First use rotates the token.
        let response = server
            .post("/api/v1/auth/refresh-token")
            .json(&RefreshTokenRequest {
                refresh_token: Some(first_refresh.clone()),
            })
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = response.json();
        let second_refresh = body.data["refresh_token"].as_str().unwrap().to_string();
        assert_ne!(first_refresh, second_refresh);

        // Replaying the revoked token fails.
        let response = server
            .post("/api/v1/auth/refresh-token")
            .json(&RefreshTokenRequest {
                refresh_token: Some(first_refresh),
            })
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        // The rotated token still works.
        let response = server
            .post("/api/v1/auth/refresh-token")
            .json(&RefreshTokenRequest {
                refresh_token: Some(second_refresh),
            })
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let login = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.teacher.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await;
        let body: ApiResponse<serde_json::Value> = login.json();
        let refresh = body.data["refresh_token"].as_str().unwrap().to_string();

        server
            .post("/api/v1/auth/logout")
            .json(&RefreshTokenRequest {
                refresh_token: Some(refresh.clone()),
            })
            .await
            .assert_status(StatusCode::OK);

        let response = server
            .post("/api/v1/auth/refresh-token")
            .json(&RefreshTokenRequest {
                refresh_token: Some(refresh),
            })
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        // Keep a session open; the reset must kill it.
        let login = server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.teacher.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await;
        let body: ApiResponse<serde_json::Value> = login.json();
        let old_refresh = body.data["refresh_token"].as_str().unwrap().to_string();

        server
            .post("/api/v1/auth/forgot-password")
            .json(&ForgotPasswordRequest {
                email: ctx.teacher.email.clone(),
            })
            .await
            .assert_status(StatusCode::OK);

        let token = ctx
            .mailer
            .last_reset_token_for(&ctx.teacher.email)
            .expect("reset email not sent");

        server
            .post("/api/v1/auth/reset-password")
            .json(&ResetPasswordRequest {
                token,
                new_password: "brand-new-password".to_string(),
            })
            .await
            .assert_status(StatusCode::OK);

        // Old password dead, new password works.
        server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.teacher.email.clone(),
                password: TEST_PASSWORD.to_string(),
            })
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/v1/auth/login")
            .json(&LoginRequest {
                email: ctx.teacher.email.clone(),
                password: "brand-new-password".to_string(),
            })
            .await
            .assert_status(StatusCode::OK);

        // Every pre-reset session is revoked.
        server
            .post("/api/v1/auth/refresh-token")
            .json(&RefreshTokenRequest {
                refresh_token: Some(old_refresh),
            })
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forgot_password_does_not_leak_accounts() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server
            .post("/api/v1/auth/forgot-password")
            .json(&ForgotPasswordRequest {
                email: "nobody@test.school".to_string(),
            })
            .await;
        response.assert_status(StatusCode::OK);
        assert!(ctx.mailer.last_reset_token_for("nobody@test.school").is_none());
    }

    // ===================== User management =====================

    #[tokio::test]
    async fn test_create_user_requires_admin() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let request = CreateUserRequest {
            email: "t2@test.school".to_string(),
            password: "password-123".to_string(),
            full_name: "Second Teacher".to_string(),
            role: "TEACHER".to_string(),
        };

        let response = server
            .post("/api/v1/users")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .json(&request)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post("/api/v1/users")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&request)
            .await;
        response.assert_status(StatusCode::CREATED);

        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["role"], "TEACHER");
        assert_eq!(body.data["is_verified"], true);
    }

    #[tokio::test]
    async fn test_create_user_rejects_admin_role_and_duplicates() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server
            .post("/api/v1/users")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&CreateUserRequest {
                email: "sneaky@test.school".to_string(),
                password: "password-123".to_string(),
                full_name: "Sneaky".to_string(),
                role: "ADMIN".to_string(),
            })
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let response = server
            .post("/api/v1/users")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&CreateUserRequest {
                email: ctx.teacher.email.clone(),
                password: "password-123".to_string(),
                full_name: "Duplicate".to_string(),
                role: "TEACHER".to_string(),
            })
            .await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_user_only_allows_teachers() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let response = server
            .delete(&format!("/api/v1/users/{}", ctx.principal.id))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server
            .delete(&format!("/api/v1/users/{}", ctx.teacher.id))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .delete("/api/v1/users/99999")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    // ===================== Classrooms =====================

    #[tokio::test]
    async fn test_classroom_crud_and_uniqueness() {
        let ctx = setup_test_context().await;
        let server = ctx.server();

        let request = CreateClassroomRequest {
            educational_year: "2025-26".to_string(),
            std: "8".to_string(),
            division: "A".to_string(),
            class_teacher_id: ctx.teacher.id,
        };

        let response = server
            .post("/api/v1/classrooms")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&request)
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<serde_json::Value> = response.json();
        let classroom_id = body.data["id"].as_i64().unwrap();

        // Same (school, year, std, division) conflicts.
        let response = server
            .post("/api/v1/classrooms")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&request)
            .await;
        response.assert_status(StatusCode::CONFLICT);

        // A principal cannot be the class teacher.
        let response = server
            .post("/api/v1/classrooms")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&CreateClassroomRequest {
                educational_year: "2025-26".to_string(),
                std: "9".to_string(),
                division: "A".to_string(),
                class_teacher_id: ctx.principal.id,
            })
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let response = server
            .get(&format!("/api/v1/classrooms/{classroom_id}"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .delete(&format!("/api/v1/classrooms/{classroom_id}"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .get(&format!("/api/v1/classrooms/{classroom_id}"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_principal_is_read_only() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        ctx.seed_classroom("8", "A").await;

        let response = server
            .get("/api/v1/classrooms")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Vec<serde_json::Value>> = response.json();
        assert_eq!(body.data.len(), 1);

        let response = server
            .post("/api/v1/classrooms")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .json(&CreateClassroomRequest {
                educational_year: "2025-26".to_string(),
                std: "9".to_string(),
                division: "B".to_string(),
                class_teacher_id: ctx.teacher.id,
            })
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    // ===================== Students =====================

    #[tokio::test]
    async fn test_student_crud_and_roll_uniqueness() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;

        let request = CreateStudentRequest {
            classroom_id: classroom.id,
            name: "Asha Patel".to_string(),
            roll_number: "1".to_string(),
        };

        let response = server
            .post("/api/v1/students")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&request)
            .await;
        response.assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/v1/students")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .json(&request)
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = server
            .get(&format!("/api/v1/classrooms/{}/students", classroom.id))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Vec<serde_json::Value>> = response.json();
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0]["name"], "Asha Patel");
    }

    #[tokio::test]
    async fn test_bulk_student_upload_reports_per_row() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        // Roll 3 already exists; the sheet row for it must fail.
        ctx.seed_students(&classroom, 3).await;

        let csv = "Name,Roll Number\n\
                   Kiran Rao,10\n\
                   ,11\n\
                   Meera Iyer,12\n\
                   Dev Nair,12\n\
                   Existing Kid,3\n";
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(csv.as_bytes().to_vec()).file_name("roster.csv"),
        );

        let response = server
            .post(&format!(
                "/api/v1/classrooms/{}/students/bulk-upload",
                classroom.id
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.admin))
            .multipart(form)
            .await;
        response.assert_status(StatusCode::OK);

        let body: ApiResponse<serde_json::Value> = response.json();
        let imported = body.data["imported"].as_array().unwrap();
        let failed = body.data["failed"].as_array().unwrap();

        // 2 good rows; missing name, duplicate-in-file, duplicate-in-db fail.
        assert_eq!(imported.len(), 2);
        assert_eq!(failed.len(), 3);
        assert!(failed
            .iter()
            .any(|row| row["reason"] == "name is required"));
        assert!(failed
            .iter()
            .any(|row| row["reason"] == "duplicate roll number in file"));
        assert!(failed
            .iter()
            .any(|row| row["reason"] == "roll number already exists in classroom"));

        // Exactly the valid rows landed.
        let count = model::entities::student::Entity::find()
            .filter(model::entities::student::Column::ClassroomId.eq(classroom.id))
            .count(&ctx.state.db)
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_bulk_photo_upload_matches_roll_numbers() {
        use std::io::{Cursor, Write};
        use zip::write::FileOptions;
        use zip::ZipWriter;

        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 3).await;

        let mut buffer = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut buffer);
        let opts = FileOptions::default();
        for name in ["1.jpg", "2.png", "99.jpg", "notes.txt"] {
            writer.start_file(name, opts).unwrap();
            writer.write_all(b"image-bytes").unwrap();
        }
        writer.finish().unwrap();
        drop(writer);
        let zip_bytes = buffer.into_inner();

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(zip_bytes).file_name("photos.zip"),
        );

        let response = server
            .post(&format!(
                "/api/v1/classrooms/{}/students/bulk-photo-upload",
                classroom.id
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .multipart(form)
            .await;
        response.assert_status(StatusCode::OK);

        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["uploaded"].as_array().unwrap().len(), 2);
        // "99.jpg" has no matching roll; "notes.txt" is not an image.
        assert_eq!(body.data["skipped"].as_array().unwrap().len(), 2);
        assert_eq!(body.data["failed"].as_array().unwrap().len(), 0);

        // The matched students now carry profile image URLs and embedding
        // generation was requested for them.
        let refreshed = model::entities::student::Entity::find_by_id(students[0].id)
            .one(&ctx.state.db)
            .await
            .unwrap()
            .unwrap();
        assert!(refreshed.profile_image_url.is_some());

        let embeddings = ctx.recognizer.embedding_requests();
        assert_eq!(embeddings.len(), 2);
    }

    // ===================== Attendance =====================

    async fn process_with_urls(
        ctx: &TestContext,
        server: &axum_test::TestServer,
        classroom_id: i32,
    ) -> axum_test::TestResponse {
        let form = MultipartForm::new()
            .add_text("classroom_id", classroom_id.to_string())
            .add_text("image_urls", "https://images.test/classroom-1.jpg");

        server
            .post("/api/v1/attendance-sessions/process")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .multipart(form)
            .await
    }

    #[tokio::test]
    async fn test_process_attendance_end_to_end() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 3).await;

        ctx.recognizer
            .set_present(vec![students[0].id, students[2].id]);

        let response = process_with_urls(&ctx, &server, classroom.id).await;
        response.assert_status(StatusCode::OK);

        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["present"], 2);
        assert_eq!(body.data["absent"], 1);
        assert_eq!(body.data["total"], 3);
        assert_eq!(body.data["status"], "PENDING");
        let session_id = body.data["session_id"].as_i64().unwrap();

        // Joined record rows come back ordered by roll number.
        let response = server
            .get(&format!(
                "/api/v1/attendance-sessions/{session_id}/records"
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Vec<serde_json::Value>> = response.json();
        assert_eq!(body.data.len(), 3);
        assert_eq!(body.data[0]["status"], "P");
        assert_eq!(body.data[1]["status"], "A");
        assert_eq!(body.data[2]["status"], "P");
        assert!(body.data.iter().all(|row| row["source"] == "SYSTEM"));

        // Re-processing the same day reuses the session and stays stable.
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["session_id"].as_i64().unwrap(), session_id);
        assert_eq!(body.data["present"], 2);
        assert_eq!(body.data["total"], 3);
    }

    #[tokio::test]
    async fn test_process_attendance_requires_images_and_classroom() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;

        // Missing classroom_id.
        let form = MultipartForm::new().add_text("image_urls", "https://images.test/x.jpg");
        let response = server
            .post("/api/v1/attendance-sessions/process")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .multipart(form)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // No images at all.
        let form = MultipartForm::new().add_text("classroom_id", classroom.id.to_string());
        let response = server
            .post("/api/v1/attendance-sessions/process")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .multipart(form)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_process_attendance_when_recognizer_is_down() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        ctx.seed_students(&classroom, 2).await;
        ctx.recognizer.set_fail(true);

        let response = process_with_urls(&ctx, &server, classroom.id).await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        // Nothing was applied.
        let records = attendance_record::Entity::find()
            .count(&ctx.state.db)
            .await
            .unwrap();
        assert_eq!(records, 0);
    }

    #[tokio::test]
    async fn test_teacher_edit_survives_reprocessing() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 3).await;

        ctx.recognizer
            .set_present(vec![students[0].id, students[2].id]);
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        let body: ApiResponse<serde_json::Value> = response.json();
        let session_id = body.data["session_id"].as_i64().unwrap();

        // Find S2's record and flip it to present manually.
        let records = server
            .get(&format!(
                "/api/v1/attendance-sessions/{session_id}/records"
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .await;
        let rows: ApiResponse<Vec<serde_json::Value>> = records.json();
        let s2_record_id = rows.data[1]["record_id"].as_i64().unwrap();

        let response = server
            .patch(&format!("/api/v1/attendance-records/{s2_record_id}"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .json(&UpdateRecordRequest {
                status: "P".to_string(),
            })
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["source"], "TEACHER");
        assert_eq!(body.data["edited"], true);

        // A later AI pass that only sees S1 demotes nobody and cannot touch
        // the teacher's correction.
        ctx.recognizer.set_present(vec![students[0].id]);
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["present"], 3);
        assert_eq!(body.data["absent"], 0);

        let records = server
            .get(&format!(
                "/api/v1/attendance-sessions/{session_id}/records"
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .await;
        let rows: ApiResponse<Vec<serde_json::Value>> = records.json();
        assert_eq!(rows.data[1]["status"], "P");
        assert_eq!(rows.data[1]["source"], "TEACHER");
        assert_eq!(rows.data[2]["status"], "P");
        assert_eq!(rows.data[2]["source"], "SYSTEM");
    }

    #[tokio::test]
    async fn test_invalid_record_status_is_rejected() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 1).await;

        ctx.recognizer.set_present(vec![students[0].id]);
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        let body: ApiResponse<serde_json::Value> = response.json();
        let session_id = body.data["session_id"].as_i64().unwrap();

        let records = server
            .get(&format!(
                "/api/v1/attendance-sessions/{session_id}/records"
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .await;
        let rows: ApiResponse<Vec<serde_json::Value>> = records.json();
        let record_id = rows.data[0]["record_id"].as_i64().unwrap();

        let response = server
            .patch(&format!("/api/v1/attendance-records/{record_id}"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .json(&UpdateRecordRequest {
                status: "LATE".to_string(),
            })
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_bulk_record_update_skips_unknown_ids() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 2).await;

        ctx.recognizer.set_present(vec![students[0].id]);
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        let body: ApiResponse<serde_json::Value> = response.json();
        let session_id = body.data["session_id"].as_i64().unwrap();

        let records = server
            .get(&format!(
                "/api/v1/attendance-sessions/{session_id}/records"
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .await;
        let rows: ApiResponse<Vec<serde_json::Value>> = records.json();
        let real_id = rows.data[1]["record_id"].as_i64().unwrap() as i32;

        let response = server
            .patch("/api/v1/attendance-records/bulk")
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .json(&BulkUpdateRecordsRequest {
                updates: vec![
                    BulkRecordUpdate {
                        record_id: real_id,
                        status: "P".to_string(),
                    },
                    BulkRecordUpdate {
                        record_id: 999_999,
                        status: "P".to_string(),
                    },
                    BulkRecordUpdate {
                        record_id: real_id,
                        status: "LATE".to_string(),
                    },
                ],
            })
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<serde_json::Value> = response.json();
        assert_eq!(body.data["updated"], 1);
        assert_eq!(body.data["skipped"], 2);
    }

    #[tokio::test]
    async fn test_session_status_transitions() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        ctx.seed_students(&classroom, 1).await;

        let response = process_with_urls(&ctx, &server, classroom.id).await;
        let body: ApiResponse<serde_json::Value> = response.json();
        let session_id = body.data["session_id"].as_i64().unwrap();

        // Skipping IN_REVIEW is not allowed.
        let response = server
            .patch(&format!("/api/v1/attendance-sessions/{session_id}/status"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
            .json(&UpdateSessionStatusRequest {
                status: "FINALIZED".to_string(),
            })
            .await;
        response.assert_status(StatusCode::CONFLICT);

        for status in ["IN_REVIEW", "FINALIZED"] {
            let response = server
                .patch(&format!("/api/v1/attendance-sessions/{session_id}/status"))
                .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.teacher))
                .json(&UpdateSessionStatusRequest {
                    status: status.to_string(),
                })
                .await;
            response.assert_status(StatusCode::OK);
        }

        // A finalized session no longer accepts processing.
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    // ===================== Reports =====================

    #[tokio::test]
    async fn test_session_report_csv() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 2).await;

        ctx.recognizer.set_present(vec![students[0].id]);
        let response = process_with_urls(&ctx, &server, classroom.id).await;
        let body: ApiResponse<serde_json::Value> = response.json();
        let session_id = body.data["session_id"].as_i64().unwrap();

        let response = server
            .get(&format!("/api/v1/reports/sessions/{session_id}/csv"))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::OK);

        let csv = response.text();
        assert!(csv.starts_with("Roll Number,Name,Status,Source,Edited"));
        assert!(csv.contains("1,Student 1,P,SYSTEM,false"));
        assert!(csv.contains("2,Student 2,A,SYSTEM,false"));
    }

    #[tokio::test]
    async fn test_classroom_report_csv() {
        let ctx = setup_test_context().await;
        let server = ctx.server();
        let classroom = ctx.seed_classroom("8", "A").await;
        let students = ctx.seed_students(&classroom, 2).await;

        ctx.recognizer.set_present(vec![students[0].id]);
        process_with_urls(&ctx, &server, classroom.id)
            .await
            .assert_status(StatusCode::OK);

        let today = Utc::now().date_naive();
        let response = server
            .get(&format!(
                "/api/v1/reports/classrooms/{}/csv?from={today}&to={today}",
                classroom.id
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::OK);

        let csv = response.text();
        assert!(csv.contains("1,Student 1,1,0,100.0"));
        assert!(csv.contains("2,Student 2,0,1,0.0"));

        // Reversed ranges are rejected.
        let response = server
            .get(&format!(
                "/api/v1/reports/classrooms/{}/csv?from=2025-12-31&to=2025-01-01",
                classroom.id
            ))
            .add_header(AUTHORIZATION, ctx.bearer_for(&ctx.principal))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
