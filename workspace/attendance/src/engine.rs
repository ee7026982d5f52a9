//! Session resolution and the two-phase reconciliation routine.
//!
//! Correctness rests on two unique indexes: (classroom, date) on sessions
//! and (session, student) on records. Session creation races are resolved
//! optimistically by re-fetching; the seed phase is an ON CONFLICT DO
//! NOTHING bulk insert, so running it on every call is safe.

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use tracing::{debug, info, instrument, warn};

use common::{AttendanceCounts, AttendanceSummary, RecognitionOutcome};
use model::entities::{
    attendance_record,
    attendance_record::{RecordSource, RecordStatus},
    attendance_session,
    attendance_session::SessionStatus,
    classroom, student,
};

use crate::error::{AttendanceError, Result};
use crate::recognizer::Recognizer;

/// One attendance-processing request, already normalized by the caller:
/// any uploaded file has been stored and its URL appended to `image_urls`.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub classroom_id: i32,
    /// Explicit session to process into; resolved per (classroom, date)
    /// when absent.
    pub session_id: Option<i32>,
    /// The teacher credited with creating the session.
    pub teacher_id: i32,
    pub image_urls: Vec<String>,
    /// Calendar day of the session, normally "today".
    pub session_date: NaiveDate,
}

fn is_unique_violation(err: &DbErr) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("unique") || msg.contains("duplicate")
}

/// Find or create the session for (classroom, day).
///
/// A concurrent request may create the same session between our lookup and
/// insert; the unique index turns that into a duplicate-key error, which we
/// answer by re-fetching the winner's row instead of failing.
#[instrument(skip(db))]
pub async fn resolve_session(
    db: &DatabaseConnection,
    classroom_id: i32,
    session_date: NaiveDate,
    teacher_id: i32,
) -> Result<attendance_session::Model> {
    let existing = attendance_session::Entity::find()
        .filter(attendance_session::Column::ClassroomId.eq(classroom_id))
        .filter(attendance_session::Column::SessionDate.eq(session_date))
        .one(db)
        .await?;

    if let Some(session) = existing {
        debug!(session_id = session.id, "Found existing session");
        return Ok(session);
    }

    let new_session = attendance_session::ActiveModel {
        classroom_id: Set(classroom_id),
        session_date: Set(session_date),
        status: Set(SessionStatus::Pending),
        teacher_id: Set(teacher_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match new_session.insert(db).await {
        Ok(session) => {
            info!(
                session_id = session.id,
                classroom_id, "Created attendance session"
            );
            Ok(session)
        }
        Err(err) if is_unique_violation(&err) => {
            // Lost the creation race; the winner's row must exist now.
            warn!(classroom_id, %session_date, "Session creation raced, re-fetching");
            attendance_session::Entity::find()
                .filter(attendance_session::Column::ClassroomId.eq(classroom_id))
                .filter(attendance_session::Column::SessionDate.eq(session_date))
                .one(db)
                .await?
                .ok_or(AttendanceError::Database(err))
        }
        Err(err) => Err(err.into()),
    }
}

/// Phase 1: upsert one absent/SYSTEM record per enrolled student.
///
/// ON CONFLICT DO NOTHING against the (session, student) unique index means
/// existing records, including teacher-edited ones, are never touched.
#[instrument(skip(db, student_ids), fields(students = student_ids.len()))]
pub async fn seed_absent_records(
    db: &DatabaseConnection,
    session_id: i32,
    student_ids: &[i32],
) -> Result<()> {
    if student_ids.is_empty() {
        debug!(session_id, "No students to seed");
        return Ok(());
    }

    let rows = student_ids
        .iter()
        .map(|&student_id| attendance_record::ActiveModel {
            session_id: Set(session_id),
            student_id: Set(student_id),
            status: Set(RecordStatus::Absent),
            source: Set(RecordSource::System),
            edited: Set(false),
            confidence: Set(None),
            ..Default::default()
        });

    let insert = attendance_record::Entity::insert_many(rows)
        .on_conflict(
            OnConflict::columns([
                attendance_record::Column::SessionId,
                attendance_record::Column::StudentId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(db)
        .await;

    match insert {
        Ok(_) => Ok(()),
        // Every row hit the conflict clause: the session was already fully
        // seeded, which is the expected steady state on re-runs.
        Err(DbErr::RecordNotInserted) => {
            debug!(session_id, "All records already seeded");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Phase 2: promote AI-detected students to present.
///
/// One updateOne per reported student, filtered on `edited = false` so a
/// teacher's manual correction is never clobbered. There is deliberately no
/// demote pass: a student missing from the present-list keeps whatever
/// status the record already has.
#[instrument(skip(db, outcome), fields(present = outcome.present_student_ids.len()))]
pub async fn promote_present(
    db: &DatabaseConnection,
    session_id: i32,
    outcome: &RecognitionOutcome,
) -> Result<u64> {
    let mut promoted = 0;

    for &student_id in &outcome.present_student_ids {
        let update = attendance_record::Entity::update_many()
            .set(attendance_record::ActiveModel {
                status: Set(RecordStatus::Present),
                source: Set(RecordSource::System),
                confidence: Set(outcome.confidence_for(student_id)),
                ..Default::default()
            })
            .filter(attendance_record::Column::SessionId.eq(session_id))
            .filter(attendance_record::Column::StudentId.eq(student_id))
            .filter(attendance_record::Column::Edited.eq(false))
            .exec(db)
            .await?;

        promoted += update.rows_affected;
    }

    debug!(session_id, promoted, "Promoted present records");
    Ok(promoted)
}

/// Re-read present/absent/total counts from the database so the reply
/// reflects true persisted state, not in-memory deltas.
pub async fn session_counts(db: &DatabaseConnection, session_id: i32) -> Result<AttendanceCounts> {
    let total = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .count(db)
        .await?;

    let present = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session_id))
        .filter(attendance_record::Column::Status.eq(RecordStatus::Present))
        .count(db)
        .await?;

    Ok(AttendanceCounts::new(present, total))
}

/// Process one attendance request end to end: resolve the session, call the
/// recognizer, reconcile the result, and read the counts back.
///
/// The recognizer is called before any write so a failed recognition leaves
/// the session untouched rather than partially applied.
#[instrument(skip(db, recognizer, request), fields(classroom_id = request.classroom_id))]
pub async fn process_attendance(
    db: &DatabaseConnection,
    recognizer: &dyn Recognizer,
    request: ProcessRequest,
) -> Result<AttendanceSummary> {
    if request.image_urls.is_empty() {
        return Err(AttendanceError::NoImages);
    }

    let classroom = classroom::Entity::find_by_id(request.classroom_id)
        .one(db)
        .await?
        .ok_or(AttendanceError::ClassroomNotFound(request.classroom_id))?;

    let session = match request.session_id {
        Some(session_id) => {
            let session = attendance_session::Entity::find_by_id(session_id)
                .one(db)
                .await?
                .ok_or(AttendanceError::SessionNotFound(session_id))?;
            if session.classroom_id != classroom.id {
                return Err(AttendanceError::SessionMismatch {
                    session_id,
                    classroom_id: classroom.id,
                });
            }
            session
        }
        None => {
            resolve_session(db, classroom.id, request.session_date, request.teacher_id).await?
        }
    };

    if session.status == SessionStatus::Finalized {
        return Err(AttendanceError::SessionFinalized(session.id));
    }

    let students = student::Entity::find()
        .filter(student::Column::ClassroomId.eq(classroom.id))
        .all(db)
        .await?;
    let student_ids: Vec<i32> = students.iter().map(|s| s.id).collect();

    let mut outcome = recognizer.recognize(&request.image_urls).await?;

    // The service occasionally reports ids outside the roster (stale
    // embeddings after a transfer); those must not create records.
    outcome
        .present_student_ids
        .retain(|id| student_ids.contains(id));

    seed_absent_records(db, session.id, &student_ids).await?;
    let promoted = promote_present(db, session.id, &outcome).await?;

    let counts = session_counts(db, session.id).await?;
    info!(
        session_id = session.id,
        promoted,
        present = counts.present,
        total = counts.total,
        "Attendance processed"
    );

    Ok(AttendanceSummary {
        session_id: session.id,
        classroom_id: session.classroom_id,
        session_date: session.session_date,
        status: session.status.as_str().to_string(),
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use crate::testing;

    fn request(classroom_id: i32, teacher_id: i32) -> ProcessRequest {
        ProcessRequest {
            classroom_id,
            session_id: None,
            teacher_id,
            image_urls: vec!["https://img.example/class.jpg".to_string()],
            session_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        }
    }

    async fn record_for(
        db: &DatabaseConnection,
        session_id: i32,
        student_id: i32,
    ) -> attendance_record::Model {
        attendance_record::Entity::find()
            .filter(attendance_record::Column::SessionId.eq(session_id))
            .filter(attendance_record::Column::StudentId.eq(student_id))
            .one(db)
            .await
            .expect("query failed")
            .expect("record missing")
    }

    #[tokio::test]
    async fn fresh_upload_seeds_absent_and_promotes_present() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 3).await;
        let [s1, s2, s3] = [
            fixture.students[0].id,
            fixture.students[1].id,
            fixture.students[2].id,
        ];

        let mock = MockRecognizer::new();
        mock.set_present(vec![s1, s3]);
        mock.set_confidence(s1, 0.97);

        let summary = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .expect("processing failed");

        assert_eq!(summary.session_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(summary.counts, AttendanceCounts::new(2, 3));

        let r1 = record_for(&db, summary.session_id, s1).await;
        assert_eq!(r1.status, RecordStatus::Present);
        assert_eq!(r1.source, RecordSource::System);
        assert_eq!(r1.confidence, Some(0.97));

        let r2 = record_for(&db, summary.session_id, s2).await;
        assert_eq!(r2.status, RecordStatus::Absent);
        assert!(!r2.edited);

        let r3 = record_for(&db, summary.session_id, s3).await;
        assert_eq!(r3.status, RecordStatus::Present);
        assert_eq!(r3.confidence, None);
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 3).await;
        let s1 = fixture.students[0].id;

        let mock = MockRecognizer::new();
        mock.set_present(vec![s1]);

        let first = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .expect("first run failed");
        let second = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .expect("second run failed");

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.counts, second.counts);

        // Still exactly one record per student.
        let total = attendance_record::Entity::find()
            .filter(attendance_record::Column::SessionId.eq(first.session_id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn edited_records_survive_reprocessing() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 3).await;
        let [s1, s2, s3] = [
            fixture.students[0].id,
            fixture.students[1].id,
            fixture.students[2].id,
        ];

        let mock = MockRecognizer::new();
        mock.set_present(vec![s1, s3]);
        let summary = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .unwrap();

        // Teacher corrects S2 to present; the edited flag locks the record.
        let r2 = record_for(&db, summary.session_id, s2).await;
        let mut edit: attendance_record::ActiveModel = r2.into();
        edit.status = Set(RecordStatus::Present);
        edit.source = Set(RecordSource::Teacher);
        edit.edited = Set(true);
        edit.confidence = Set(None);
        edit.update(&db).await.unwrap();

        // Second pass only sees S1. S2 is protected, and S3 keeps its P
        // because there is no demote pass.
        mock.set_present(vec![s1]);
        let summary = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .unwrap();

        let r1 = record_for(&db, summary.session_id, s1).await;
        let r2 = record_for(&db, summary.session_id, s2).await;
        let r3 = record_for(&db, summary.session_id, s3).await;
        assert_eq!(r1.status, RecordStatus::Present);
        assert_eq!(r2.status, RecordStatus::Present);
        assert_eq!(r2.source, RecordSource::Teacher);
        assert!(r2.edited);
        assert_eq!(r3.status, RecordStatus::Present);
        assert_eq!(summary.counts, AttendanceCounts::new(3, 3));
    }

    #[tokio::test]
    async fn one_session_per_classroom_and_day() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let (a, b) = tokio::join!(
            resolve_session(&db, fixture.classroom.id, date, fixture.teacher.id),
            resolve_session(&db, fixture.classroom.id, date, fixture.teacher.id),
        );
        let a = a.expect("first resolve failed");
        let b = b.expect("second resolve failed");
        assert_eq!(a.id, b.id);

        let sessions = attendance_session::Entity::find()
            .filter(attendance_session::Column::ClassroomId.eq(fixture.classroom.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(sessions, 1);
    }

    #[tokio::test]
    async fn resolve_recovers_from_lost_race() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();

        // Another request already created the session.
        let winner = attendance_session::ActiveModel {
            classroom_id: Set(fixture.classroom.id),
            session_date: Set(date),
            status: Set(SessionStatus::Pending),
            teacher_id: Set(fixture.teacher.id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let resolved = resolve_session(&db, fixture.classroom.id, date, fixture.teacher.id)
            .await
            .unwrap();
        assert_eq!(resolved.id, winner.id);
    }

    #[tokio::test]
    async fn recognizer_failure_applies_nothing() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 2).await;

        let mock = MockRecognizer::new();
        mock.set_fail(true);

        let result =
            process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id)).await;
        assert!(matches!(result, Err(AttendanceError::Recognizer(_))));

        // No records were written for the aborted run.
        let records = attendance_record::Entity::find().count(&db).await.unwrap();
        assert_eq!(records, 0);
    }

    #[tokio::test]
    async fn rejects_empty_image_list() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;

        let mut req = request(fixture.classroom.id, fixture.teacher.id);
        req.image_urls.clear();

        let result = process_attendance(&db, &MockRecognizer::new(), req).await;
        assert!(matches!(result, Err(AttendanceError::NoImages)));
    }

    #[tokio::test]
    async fn unknown_student_ids_from_service_are_ignored() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 2).await;
        let s1 = fixture.students[0].id;

        let mock = MockRecognizer::new();
        mock.set_present(vec![s1, 999_999]);

        let summary = process_attendance(&db, &mock, request(fixture.classroom.id, fixture.teacher.id))
            .await
            .unwrap();
        assert_eq!(summary.counts, AttendanceCounts::new(1, 2));
    }

    #[tokio::test]
    async fn finalized_sessions_reject_processing() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let session = resolve_session(&db, fixture.classroom.id, date, fixture.teacher.id)
            .await
            .unwrap();
        let mut finalize: attendance_session::ActiveModel = session.into();
        finalize.status = Set(SessionStatus::Finalized);
        finalize.update(&db).await.unwrap();

        let result =
            process_attendance(&db, &MockRecognizer::new(), request(fixture.classroom.id, fixture.teacher.id))
                .await;
        assert!(matches!(result, Err(AttendanceError::SessionFinalized(_))));
    }

    #[tokio::test]
    async fn missing_classroom_is_reported() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;

        let result =
            process_attendance(&db, &MockRecognizer::new(), request(424242, fixture.teacher.id))
                .await;
        assert!(matches!(result, Err(AttendanceError::ClassroomNotFound(424242))));
    }

    #[tokio::test]
    async fn explicit_session_must_match_classroom() {
        let db = testing::setup_db().await;
        let fixture = testing::classroom_with_students(&db, 1).await;
        let other = testing::classroom_with_students(&db, 1).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let session = resolve_session(&db, other.classroom.id, date, other.teacher.id)
            .await
            .unwrap();

        let mut req = request(fixture.classroom.id, fixture.teacher.id);
        req.session_id = Some(session.id);

        let result = process_attendance(&db, &MockRecognizer::new(), req).await;
        assert!(matches!(
            result,
            Err(AttendanceError::SessionMismatch { .. })
        ));
    }
}
