pub mod lifecycle;
pub mod models;
pub mod schedule;
