pub mod photos;
pub mod roster;
