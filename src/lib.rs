pub mod apis;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod logger;
pub mod orchestrator;
pub mod scheduler;
pub mod series;
pub mod synthetic;
