use sea_orm::entity::prelude::*;

/// Present or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(1))")]
pub enum RecordStatus {
    #[sea_orm(string_value = "P")]
    Present,
    #[sea_orm(string_value = "A")]
    Absent,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "P",
            Self::Absent => "A",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "P" => Some(Self::Present),
            "A" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Provenance of a record's current status: AI-derived or a human override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum RecordSource {
    #[sea_orm(string_value = "SYSTEM")]
    System,
    #[sea_orm(string_value = "TEACHER")]
    Teacher,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Teacher => "TEACHER",
        }
    }
}

/// One student's attendance within a session. The unique
/// (session_id, student_id) index guarantees one record per student per
/// session no matter how many reconciliation passes run; `edited` is the
/// write-protection marker that locks a record against SYSTEM overwrites
/// once a teacher has touched it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub session_id: i32,
    pub student_id: i32,
    pub status: RecordStatus,
    pub source: RecordSource,
    pub edited: bool,
    /// Recognition confidence for SYSTEM-promoted records; cleared on
    /// teacher edit.
    #[sea_orm(column_type = "Float", nullable)]
    pub confidence: Option<f32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    AttendanceSession,
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceSession.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
