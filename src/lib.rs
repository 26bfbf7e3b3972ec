//! Attribute-based access decisions for filesystem hooks.
//!
//! Given a principal, a resource path and an operation, the [`Engine`]
//! answers [`Allow`](Decision::Allow) or [`Deny`](Decision::Deny) by
//! matching the principal's attributes and the current environment
//! attributes against the policy bound to the resource. Policy can be
//! expressed either as a flat rule table referenced per resource, or as
//! per-resource decision trees; the representation is picked once with
//! [`PolicyModel`].
//!
//! All state is pushed in as bulk text uploads and replaced wholesale;
//! nothing is persisted. Every unmatched case degrades to deny.

mod attr;
mod cache;
mod engine;
mod env;
mod error;
mod hook;
mod operation;
mod policy;
mod principal;
mod resource;
mod tree;

pub use attr::{Attribute, AttributeList, Coded, Token};
pub use cache::CacheStats;
pub use engine::{
    CodedEngine, ControlAction, Engine, EngineConfig, TextEngine, DEFAULT_CACHE_CAPACITY,
};
pub use env::parse_environment;
pub use error::UploadError;
pub use hook::{operation_for_mask, SecuredPrefix, MAY_APPEND, MAY_READ, MAY_WRITE};
pub use operation::{Decision, Operation};
pub use policy::{LoadReport, PolicyTable, Rule, RuleId};
pub use principal::{PrincipalId, PrincipalStore};
pub use resource::{PolicyModel, ResourceIndex, ResourcePolicy, MAX_PATH_LEN};
pub use tree::DecisionTree;
