//! # REST API
//!
//! Axum router, handlers and request bodies for the template store, plus the
//! OpenAPI document served at `/swagger-ui`.

pub mod docs;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
