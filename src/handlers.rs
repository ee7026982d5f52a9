pub mod auth;
pub mod classrooms;
pub mod health;
pub mod records;
pub mod reports;
pub mod sessions;
pub mod students;
pub mod users;
