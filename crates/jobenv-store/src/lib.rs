//! Secret variable stores for jobenv.
//!
//! Provides the environment scope matcher, one store per administrative level
//! and the short-lived cache in front of instance-level reads.

pub mod cache;
pub mod error;
pub mod group;
pub mod instance;
pub mod project;
pub mod scope;
pub mod source;

pub use cache::TtlCache;
pub use error::{StoreError, StoreResult};
pub use group::GroupVariableStore;
pub use instance::{INSTANCE_CACHE_TTL, InstanceVariableStore};
pub use project::ProjectVariableStore;
pub use scope::{Specificity, matches, specificity};
pub use source::{MemoryRecordSource, VariableRecordSource};
