//! Shared pieces of the gradebox pipeline: the JSON wire format exchanged with
//! the execution engine, and the queue boundary both directions travel over.

pub mod config;
pub mod memory;
pub mod queue;
pub mod redis;
pub mod types;

pub use queue::{QueueClient, QueueError};
