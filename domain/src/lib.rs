pub mod backend;
pub mod core;
pub mod forms;
pub mod portfolio;
pub mod token;
pub mod user;
pub mod view;

pub use backend::{Backend, BackendError};
pub use crate::core::{ClientError, Forseer};

#[cfg(test)]
mod tests;
