// Repository layer for database operations

pub mod execution;
pub mod parameter;
pub mod query;

pub use execution::{ExecutionFilter, ExecutionRepository};
pub use parameter::ParameterRepository;
pub use query::QueryRepository;
