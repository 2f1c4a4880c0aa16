//! Common utilities for integration tests

pub mod client;

// Re-export commonly used items
pub use client::{entry_names, TestClient};
