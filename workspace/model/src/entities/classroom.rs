use sea_orm::entity::prelude::*;

/// A classroom within a school, identified by standard and division for one
/// educational year. Unique per (school, year, std, division); one teacher
/// is assigned as the class teacher.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "classrooms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub school_id: i32,
    /// Academic year label, e.g. "2025-26".
    pub educational_year: String,
    /// Standard/grade, e.g. "8".
    pub std: String,
    /// Division within the standard, e.g. "A".
    pub division: String,
    pub class_teacher_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::school::Entity",
        from = "Column::SchoolId",
        to = "super::school::Column::Id"
    )]
    School,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ClassTeacherId",
        to = "super::user::Column::Id"
    )]
    ClassTeacher,
    #[sea_orm(has_many = "super::student::Entity")]
    Student,
    #[sea_orm(has_many = "super::attendance_session::Entity")]
    AttendanceSession,
}

impl Related<super::school::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::School.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceSession.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
