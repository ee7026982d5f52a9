//! Shared fixtures for engine tests: an in-memory database with migrations
//! applied and a school/teacher/classroom/students graph.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};

use model::entities::{classroom, school, student, user, user::UserRole};

pub struct ClassroomFixture {
    pub school: school::Model,
    pub teacher: user::Model,
    pub classroom: classroom::Model,
    pub students: Vec<student::Model>,
}

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Create a school with one teacher, one classroom, and `count` students.
pub async fn classroom_with_students(db: &DatabaseConnection, count: usize) -> ClassroomFixture {
    static FIXTURE_ID: AtomicU64 = AtomicU64::new(0);
    let current_id = FIXTURE_ID.fetch_add(1, Ordering::SeqCst);

    let school = school::ActiveModel {
        school_idx: Set(format!("SCH-{current_id}")),
        name: Set(format!("Test School {current_id}")),
        address: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create school");

    let teacher = user::ActiveModel {
        school_id: Set(school.id),
        email: Set(format!("teacher{current_id}@example.com")),
        password_hash: Set("unused".to_string()),
        full_name: Set(format!("Teacher {current_id}")),
        role: Set(UserRole::Teacher),
        is_active: Set(true),
        is_verified: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create teacher");

    let classroom = classroom::ActiveModel {
        school_id: Set(school.id),
        educational_year: Set("2025-26".to_string()),
        std: Set("8".to_string()),
        division: Set("A".to_string()),
        class_teacher_id: Set(teacher.id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create classroom");

    let mut students = Vec::with_capacity(count);
    for n in 1..=count {
        let student = student::ActiveModel {
            classroom_id: Set(classroom.id),
            name: Set(format!("Student {n}")),
            roll_number: Set(n.to_string()),
            profile_image_url: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to create student");
        students.push(student);
    }

    ClassroomFixture {
        school,
        teacher,
        classroom,
        students,
    }
}
