//! HTTP handlers.
//!
//! Handlers extract the caller's [`crate::auth::AuthContext`] placed by the
//! authentication middleware, convert request bodies into domain requests and
//! delegate to the services. Authorization happens below them, in the store.

pub mod admin;
pub mod clusters;
pub mod health;
pub mod revisions;
pub mod templates;

pub use admin::{add_group_member_handler, bind_global_role_handler, create_user_handler};
pub use clusters::{
    create_cluster_handler, delete_cluster_handler, get_cluster_handler, list_clusters_handler,
    switch_cluster_revision_handler,
};
pub use health::health_handler;
pub use revisions::{
    create_revision_handler, delete_revision_handler, get_revision_handler,
    list_revisions_handler, set_revision_enabled_handler,
};
pub use templates::{
    create_template_handler, delete_template_handler, get_template_handler,
    list_templates_handler, set_members_handler, update_template_handler,
};
