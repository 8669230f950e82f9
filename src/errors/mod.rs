//! # Error Handling
//!
//! Error types for the Keelson control plane. Every store, service and API
//! operation returns [`Result`], and the HTTP layer maps [`KeelsonError`]
//! onto status codes and stable error codes.

pub mod types;

pub use types::{KeelsonError, Result};

/// Short alias used across the crate.
pub type Error = KeelsonError;
