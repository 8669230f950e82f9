//! # Keelson
//!
//! A control plane for access-controlled, versioned cluster templates.
//!
//! Templates carry a member ACL and a list of immutable revisions. Each
//! revision holds a cluster configuration plus parameterized questions, and
//! binding a revision with caller answers produces the spec a cluster is
//! reconciled to.
//!
//! ```text
//! REST API → Auth middleware → Services → TemplateStore (memory | PostgreSQL)
//!                                  ↓
//!                        Authorization gate + Binder
//! ```
//!
//! Every template or revision operation passes through
//! [`auth::authorization`], which reports invisible resources as `NotFound`
//! and visible but insufficient access as `PermissionDenied`.

pub mod api;
pub mod auth;
pub mod binder;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod services;
pub mod storage;
pub mod utils;

pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
