pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod summary;
pub mod tasks;

pub use error::{ErrorKind, PollError, Result};
