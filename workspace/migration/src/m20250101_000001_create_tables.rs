use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create schools table
        manager
            .create_table(
                Table::create()
                    .table(Schools::Table)
                    .if_not_exists()
                    .col(pk_auto(Schools::Id))
                    .col(string(Schools::SchoolIdx).unique_key())
                    .col(string(Schools::Name))
                    .col(string_null(Schools::Address))
                    .to_owned(),
            )
            .await?;

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(integer(Users::SchoolId))
                    .col(string(Users::Email).unique_key())
                    .col(string(Users::PasswordHash))
                    .col(string(Users::FullName))
                    .col(string(Users::Role).string_len(20))
                    .col(boolean(Users::IsActive).default(true))
                    .col(boolean(Users::IsVerified).default(false))
                    .col(timestamp_with_time_zone(Users::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_school")
                            .from(Users::Table, Users::SchoolId)
                            .to(Schools::Table, Schools::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create classrooms table
        manager
            .create_table(
                Table::create()
                    .table(Classrooms::Table)
                    .if_not_exists()
                    .col(pk_auto(Classrooms::Id))
                    .col(integer(Classrooms::SchoolId))
                    .col(string(Classrooms::EducationalYear))
                    .col(string(Classrooms::Std))
                    .col(string(Classrooms::Division))
                    .col(integer(Classrooms::ClassTeacherId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classroom_school")
                            .from(Classrooms::Table, Classrooms::SchoolId)
                            .to(Schools::Table, Schools::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classroom_class_teacher")
                            .from(Classrooms::Table, Classrooms::ClassTeacherId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One classroom per (school, year, std, division)
        manager
            .create_index(
                Index::create()
                    .name("uq_classroom_school_year_std_division")
                    .table(Classrooms::Table)
                    .col(Classrooms::SchoolId)
                    .col(Classrooms::EducationalYear)
                    .col(Classrooms::Std)
                    .col(Classrooms::Division)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create students table
        manager
            .create_table(
                Table::create()
                    .table(Students::Table)
                    .if_not_exists()
                    .col(pk_auto(Students::Id))
                    .col(integer(Students::ClassroomId))
                    .col(string(Students::Name))
                    .col(string(Students::RollNumber))
                    .col(string_null(Students::ProfileImageUrl))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_classroom")
                            .from(Students::Table, Students::ClassroomId)
                            .to(Classrooms::Table, Classrooms::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Roll numbers are unique within a classroom
        manager
            .create_index(
                Index::create()
                    .name("uq_student_classroom_roll_number")
                    .table(Students::Table)
                    .col(Students::ClassroomId)
                    .col(Students::RollNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create attendance_sessions table
        manager
            .create_table(
                Table::create()
                    .table(AttendanceSessions::Table)
                    .if_not_exists()
                    .col(pk_auto(AttendanceSessions::Id))
                    .col(integer(AttendanceSessions::ClassroomId))
                    .col(date(AttendanceSessions::SessionDate))
                    .col(string(AttendanceSessions::Status).string_len(20))
                    .col(integer(AttendanceSessions::TeacherId))
                    .col(timestamp_with_time_zone(AttendanceSessions::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_session_classroom")
                            .from(AttendanceSessions::Table, AttendanceSessions::ClassroomId)
                            .to(Classrooms::Table, Classrooms::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_session_teacher")
                            .from(AttendanceSessions::Table, AttendanceSessions::TeacherId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one session per classroom per calendar day; concurrent
        // creators race on this index and re-fetch on violation
        manager
            .create_index(
                Index::create()
                    .name("uq_attendance_session_classroom_date")
                    .table(AttendanceSessions::Table)
                    .col(AttendanceSessions::ClassroomId)
                    .col(AttendanceSessions::SessionDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create attendance_records table
        manager
            .create_table(
                Table::create()
                    .table(AttendanceRecords::Table)
                    .if_not_exists()
                    .col(pk_auto(AttendanceRecords::Id))
                    .col(integer(AttendanceRecords::SessionId))
                    .col(integer(AttendanceRecords::StudentId))
                    .col(string(AttendanceRecords::Status).string_len(1))
                    .col(string(AttendanceRecords::Source).string_len(10))
                    .col(boolean(AttendanceRecords::Edited).default(false))
                    .col(float_null(AttendanceRecords::Confidence))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_record_session")
                            .from(AttendanceRecords::Table, AttendanceRecords::SessionId)
                            .to(AttendanceSessions::Table, AttendanceSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_record_student")
                            .from(AttendanceRecords::Table, AttendanceRecords::StudentId)
                            .to(Students::Table, Students::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one record per (session, student); the seed phase relies
        // on ON CONFLICT DO NOTHING against this index
        manager
            .create_index(
                Index::create()
                    .name("uq_attendance_record_session_student")
                    .table(AttendanceRecords::Table)
                    .col(AttendanceRecords::SessionId)
                    .col(AttendanceRecords::StudentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create classroom_images table
        manager
            .create_table(
                Table::create()
                    .table(ClassroomImages::Table)
                    .if_not_exists()
                    .col(pk_auto(ClassroomImages::Id))
                    .col(integer(ClassroomImages::SessionId))
                    .col(string(ClassroomImages::ImageUrl))
                    .col(integer(ClassroomImages::UploadedBy))
                    .col(timestamp_with_time_zone(ClassroomImages::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classroom_image_session")
                            .from(ClassroomImages::Table, ClassroomImages::SessionId)
                            .to(AttendanceSessions::Table, AttendanceSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classroom_image_uploader")
                            .from(ClassroomImages::Table, ClassroomImages::UploadedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create refresh_tokens table
        manager
            .create_table(
                Table::create()
                    .table(RefreshTokens::Table)
                    .if_not_exists()
                    .col(pk_auto(RefreshTokens::Id))
                    .col(integer(RefreshTokens::UserId))
                    .col(string(RefreshTokens::TokenHash).unique_key())
                    .col(timestamp_with_time_zone(RefreshTokens::ExpiresAt))
                    .col(timestamp_with_time_zone_null(RefreshTokens::RevokedAt))
                    .col(timestamp_with_time_zone(RefreshTokens::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_refresh_token_user")
                            .from(RefreshTokens::Table, RefreshTokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create pending_admin_registrations table
        manager
            .create_table(
                Table::create()
                    .table(PendingAdminRegistrations::Table)
                    .if_not_exists()
                    .col(pk_auto(PendingAdminRegistrations::Id))
                    .col(string(PendingAdminRegistrations::Email).unique_key())
                    .col(string(PendingAdminRegistrations::PasswordHash))
                    .col(string(PendingAdminRegistrations::OtpHash))
                    .col(string(PendingAdminRegistrations::FullName))
                    .col(string(PendingAdminRegistrations::SchoolName))
                    .col(string_null(PendingAdminRegistrations::SchoolAddress))
                    .col(timestamp_with_time_zone(PendingAdminRegistrations::ExpiresAt))
                    .col(timestamp_with_time_zone(PendingAdminRegistrations::CreatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order to avoid foreign key constraints
        manager
            .drop_table(
                Table::drop()
                    .table(PendingAdminRegistrations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(RefreshTokens::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ClassroomImages::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AttendanceRecords::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AttendanceSessions::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Students::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Classrooms::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Schools::Table).to_owned())
            .await?;

        Ok(())
    }
}

// Define identifiers for all tables

#[derive(DeriveIden)]
enum Schools {
    Table,
    Id,
    SchoolIdx,
    Name,
    Address,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    SchoolId,
    Email,
    PasswordHash,
    FullName,
    Role,
    IsActive,
    IsVerified,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Classrooms {
    Table,
    Id,
    SchoolId,
    EducationalYear,
    Std,
    Division,
    ClassTeacherId,
}

#[derive(DeriveIden)]
enum Students {
    Table,
    Id,
    ClassroomId,
    Name,
    RollNumber,
    ProfileImageUrl,
}

#[derive(DeriveIden)]
enum AttendanceSessions {
    Table,
    Id,
    ClassroomId,
    SessionDate,
    Status,
    TeacherId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AttendanceRecords {
    Table,
    Id,
    SessionId,
    StudentId,
    Status,
    Source,
    Edited,
    Confidence,
}

#[derive(DeriveIden)]
enum ClassroomImages {
    Table,
    Id,
    SessionId,
    ImageUrl,
    UploadedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RefreshTokens {
    Table,
    Id,
    UserId,
    TokenHash,
    ExpiresAt,
    RevokedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PendingAdminRegistrations {
    Table,
    Id,
    Email,
    PasswordHash,
    OtpHash,
    FullName,
    SchoolName,
    SchoolAddress,
    ExpiresAt,
    CreatedAt,
}
