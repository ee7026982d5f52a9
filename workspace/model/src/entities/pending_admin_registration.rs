use sea_orm::entity::prelude::*;

/// Staging row for a two-phase admin signup. Holds the hashed password and
/// OTP digest until verification creates the real school and user rows, at
/// which point it is deleted inside the same transaction. Expired rows are
/// treated as absent at verification time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pending_admin_registrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub otp_hash: String,
    pub full_name: String,
    pub school_name: String,
    pub school_address: Option<String>,
    pub expires_at: ChronoDateTimeUtc,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
