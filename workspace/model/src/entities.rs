pub mod attendance_record;
pub mod attendance_session;
pub mod classroom;
pub mod classroom_image;
pub mod pending_admin_registration;
pub mod refresh_token;
pub mod school;
pub mod student;
pub mod user;
