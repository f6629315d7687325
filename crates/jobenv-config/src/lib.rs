//! KDL configuration parsing for jobenv.
//!
//! This crate handles parsing of:
//! - Resolver settings (masking policy, cache expiry, limits)
//! - Job context documents describing one job to resolve

pub mod context;
pub mod error;
mod kdl_util;
pub mod settings;

pub use context::{JobContext, parse_job_context};
pub use error::{ConfigError, ConfigResult};
pub use settings::{CacheSettings, LimitSettings, MaskingPolicy, ResolverConfig, parse_resolver_config};
