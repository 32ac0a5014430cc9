pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod validation;
pub mod workflows;

pub use error::{AppError, AppResult};
pub use validation::Validator;

#[cfg(test)]
mod tests;
