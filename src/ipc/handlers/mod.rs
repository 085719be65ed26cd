pub mod attendance;
pub mod classes;
pub mod core;
pub mod grades;
pub mod homeroom;
pub mod journals;
pub mod setup;
pub mod students;
pub mod subjects;
pub mod tasks;
pub mod teachers;
pub mod views;
