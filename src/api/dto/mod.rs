//! Request bodies for the REST API.
//!
//! Bodies keep wire-level leniency (string access types, `"true"` booleans,
//! explicit `null` to clear a field) and convert into domain requests, where
//! the typed validation happens.

pub mod cluster;
pub mod principal;
pub mod template;

pub use cluster::SwitchRevisionBody;
pub use principal::{AddGroupMemberBody, CreateUserBody, GlobalRoleBindingBody};
pub use template::{CreateTemplateBody, SetEnabledBody, SetMembersBody, UpdateTemplateBody};
