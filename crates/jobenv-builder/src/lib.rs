//! Variable resolution for jobenv.
//!
//! Assembles the ordered variable collection of a job from every source in a
//! fixed precedence order, and decides which resolved secrets may be redacted
//! from job logs.

pub mod builder;
pub mod kubernetes;
pub mod masking;
pub mod predefined;

pub use builder::{BuildRequest, PRECEDENCE, Step, VariableBuilder};
pub use kubernetes::AgentKubeconfigGenerator;
pub use masking::{Eligibility, MaskingChecker, MaskingReport};
