//! Supportly Shared Types and Utilities
//!
//! This crate contains types, errors, the session store and the job queue
//! shared between the API server and the worker.

pub mod db;
pub mod error;
pub mod queue;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use queue::{Job, JobKind, JobQueue, QueueError};
pub use types::*;
