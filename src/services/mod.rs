//! Business logic services
//!
//! Service layer components over the template store, separated from HTTP
//! concerns.

pub mod cluster_service;
pub mod convergence;
pub mod revision_service;
pub mod template_service;

pub use cluster_service::ClusterService;
pub use convergence::ConvergenceWaiter;
pub use revision_service::RevisionService;
pub use template_service::TemplateService;
