pub mod config;
pub mod engine;
pub mod error;
pub mod groceries;
pub mod interfaces;
pub mod logging;
pub mod runtime_paths;
pub mod tasks;
pub mod timeutil;
pub mod workouts;

pub type Result<T> = std::result::Result<T, error::DaybotError>;
