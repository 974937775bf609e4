pub mod achievements;
pub mod admission;
pub mod core;
pub mod grades;
pub mod groups;
pub mod observations;
pub mod pages;
pub mod preenrollment;
pub mod session;
pub mod students;
pub mod ui;
pub mod users;
