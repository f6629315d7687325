//! Environment scope matching.
//!
//! A scope is `*` (every environment), a prefix followed by a trailing `*`
//! (`review/*`), or a literal environment name. A `*` anywhere else is taken
//! literally.

use jobenv_core::job::GitRef;
use jobenv_core::secret::{DEFAULT_ENVIRONMENT_SCOPE, SecretVariable};

/// How specific a scope pattern is. Later variants (and longer prefixes) win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Default,
    Wildcard { prefix_len: usize },
    Exact,
}

enum Pattern<'a> {
    Any,
    Prefix(&'a str),
    Literal(&'a str),
}

fn parse(pattern: &str) -> Pattern<'_> {
    if pattern == DEFAULT_ENVIRONMENT_SCOPE {
        return Pattern::Any;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) if !prefix.contains('*') => Pattern::Prefix(prefix),
        _ => Pattern::Literal(pattern),
    }
}

/// Whether `pattern` applies to `environment`.
pub fn matches(pattern: &str, environment: &str) -> bool {
    match parse(pattern) {
        Pattern::Any => true,
        Pattern::Prefix(prefix) => environment.starts_with(prefix),
        Pattern::Literal(name) => name == environment,
    }
}

pub fn specificity(pattern: &str) -> Specificity {
    match parse(pattern) {
        Pattern::Any => Specificity::Default,
        Pattern::Prefix(prefix) => Specificity::Wildcard {
            prefix_len: prefix.len(),
        },
        Pattern::Literal(_) => Specificity::Exact,
    }
}

/// Without an environment only the default scope applies.
pub fn applies(pattern: &str, environment: Option<&str>) -> bool {
    match environment {
        Some(env) => matches(pattern, env),
        None => pattern == DEFAULT_ENVIRONMENT_SCOPE,
    }
}

/// Keep the records visible for `(git_ref, environment)` and order them by
/// ascending specificity, so that a last-wins merge picks the most specific
/// definition of each key. Ties keep the caller's order.
pub fn select_visible(
    records: impl IntoIterator<Item = SecretVariable>,
    git_ref: &GitRef,
    environment: Option<&str>,
) -> Vec<SecretVariable> {
    let mut visible: Vec<_> = records
        .into_iter()
        .filter(|var| !var.protected || git_ref.protected)
        .filter(|var| applies(&var.environment_scope, environment))
        .collect();
    visible.sort_by_key(|var| specificity(&var.environment_scope));
    visible
}
