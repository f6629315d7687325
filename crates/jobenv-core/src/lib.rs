//! Core domain types and traits for jobenv.
//!
//! This crate contains:
//! - Variable entries and the ordered, merge-only variable collection
//! - Secret variable records and their owning levels
//! - Read-only job, pipeline and project descriptors
//! - Traits for the deployment and kubeconfig collaborators

pub mod collection;
pub mod deployer;
pub mod error;
pub mod id;
pub mod job;
pub mod secret;
pub mod variable;

pub use collection::VariableCollection;
pub use error::{Error, Result};
pub use id::ResourceId;
pub use variable::VariableEntry;
