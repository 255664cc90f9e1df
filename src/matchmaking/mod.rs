//! Matchmaking - FIFO queue and room creation

pub mod queue;
pub mod service;

pub use service::{EnqueueOutcome, Matchmaker};
