//! Authentication and authorization module entry point.
//!
//! Bearer tokens resolve to principals held in a [`principal_store::PrincipalStore`];
//! the resulting [`AuthContext`] is checked against template ACLs by the
//! gate in [`authorization`].

pub mod auth_service;
pub mod authorization;
mod hashing;
pub mod middleware;
pub mod models;
pub mod principal_store;

pub use auth_service::AuthService;
pub use authorization::{GateDecision, TemplateAction};
pub use hashing::{generate_token, token_digest, TOKEN_PREFIX};
pub use models::{AuthContext, AuthError};
pub use principal_store::{IssuedPrincipal, MemoryPrincipalStore, NewPrincipal, PrincipalStore};
