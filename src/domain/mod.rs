//! Domain layer
//!
//! Pure domain entities for the template store: identifiers, principals,
//! templates with their ACLs, revisions with their questions, and clusters
//! bound from revisions. Domain types carry their own validation and have
//! no knowledge of HTTP or storage.
//!
//! ## Module Organization
//!
//! - `id`: Type-safe domain identifiers with NewType pattern
//! - `principal`: Users and their global role bindings
//! - `template`: Templates, members and access types
//! - `revision`: Revisions, questions and value coercion
//! - `cluster`: Clusters, answers and reconciliation state

pub mod cluster;
pub mod id;
pub mod principal;
pub mod revision;
pub mod template;

// Re-export main types from each module
pub use cluster::{Answers, Cluster, ClusterState, NewCluster};
pub use id::{ClusterId, IdParseError, PrincipalId, RevisionId, TemplateId};
pub use principal::{GlobalRole, Principal};
pub use revision::{validate_questions, NewRevision, Question, QuestionType, Revision};
pub use template::{
    parse_members, validate_members, AccessType, Member, MemberInput, NewTemplate, Template,
    TemplateUpdate,
};
