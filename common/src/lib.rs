// Common library for the dynamic report service: core query engine,
// domain models, persistence, and shared infrastructure.

pub mod builder;
pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod export;
pub mod formatter;
pub mod from_parser;
pub mod models;
pub mod telemetry;
pub mod validator;
