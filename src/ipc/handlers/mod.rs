pub mod auth;
pub mod core;
pub mod evaluations;
pub mod logs;
pub mod reports;
pub mod setup;
