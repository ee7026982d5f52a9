use sea_orm::entity::prelude::*;

/// Lifecycle of an attendance session. FINALIZED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum SessionStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "IN_REVIEW")]
    InReview,
    #[sea_orm(string_value = "FINALIZED")]
    Finalized,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InReview => "IN_REVIEW",
            Self::Finalized => "FINALIZED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "IN_REVIEW" => Some(Self::InReview),
            "FINALIZED" => Some(Self::Finalized),
            _ => None,
        }
    }

    /// Allowed transitions: PENDING -> IN_REVIEW -> FINALIZED.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InReview) | (Self::InReview, Self::Finalized)
        )
    }
}

/// One attendance-taking event, scoped to one classroom and one calendar
/// day. The unique (classroom_id, session_date) index is the correctness
/// mechanism for "at most one session per class per day" under concurrent
/// creation; callers catch the unique violation and re-fetch.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub classroom_id: i32,
    pub session_date: Date,
    pub status: SessionStatus,
    /// The teacher whose upload created the session.
    pub teacher_id: i32,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::classroom::Entity",
        from = "Column::ClassroomId",
        to = "super::classroom::Column::Id"
    )]
    Classroom,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::Id"
    )]
    Teacher,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecord,
    #[sea_orm(has_many = "super::classroom_image::Entity")]
    ClassroomImage,
}

impl Related<super::classroom::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Classroom.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecord.def()
    }
}

impl Related<super::classroom_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassroomImage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
