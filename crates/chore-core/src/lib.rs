//! chore-core - Core library for Chore
//!
//! This crate contains the shared models, database layer, and the offline
//! sync engine used by all Chore interfaces.

pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Task, TaskId};
