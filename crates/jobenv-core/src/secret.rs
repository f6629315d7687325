//! Secret variable records and the store abstraction the builder reads them through.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::job::{GitRef, Project};
use crate::{ResourceId, Result, VariableEntry};

/// Environment scope matching every environment.
pub const DEFAULT_ENVIRONMENT_SCOPE: &str = "*";

/// Administrative level owning a secret variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case", tag = "level", content = "id")]
pub enum VariableLevel {
    #[display("instance")]
    Instance,
    #[display("group {_0}")]
    Group(ResourceId),
    #[display("project {_0}")]
    Project(ResourceId),
}

/// An administrator-configured variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVariable {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub masked: bool,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub file: bool,
    #[serde(default = "default_scope")]
    pub environment_scope: String,
    pub owner: VariableLevel,
}

fn default_scope() -> String {
    DEFAULT_ENVIRONMENT_SCOPE.to_string()
}

impl SecretVariable {
    pub fn new(owner: VariableLevel, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            protected: false,
            masked: false,
            raw: false,
            file: false,
            environment_scope: default_scope(),
            owner,
        }
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    pub fn scoped(mut self, environment_scope: impl Into<String>) -> Self {
        self.environment_scope = environment_scope.into();
        self
    }

    /// Convert into a secret entry, carrying over the masked/file/raw flags.
    pub fn to_entry(&self) -> Result<VariableEntry> {
        let mut entry = VariableEntry::new(&self.key, &self.value)?.secret();
        if self.masked {
            entry = entry.masked();
        }
        if self.file {
            entry = entry.file();
        }
        if self.raw {
            entry = entry.raw();
        }
        Ok(entry)
    }
}

/// What a store needs to know to select variables for one job.
#[derive(Debug, Clone, Copy)]
pub struct VariableQuery<'a> {
    pub project: &'a Project,
    pub git_ref: &'a GitRef,
    pub environment: Option<&'a str>,
}

/// One secret variable store per level.
///
/// Implementations return only the candidates visible to the query, ordered so
/// that the last occurrence of a key is the one that should win.
#[async_trait]
pub trait SecretVariableStore: Send + Sync {
    /// Level this store serves, for diagnostics.
    fn level_name(&self) -> &'static str;

    async fn variables_for(&self, query: VariableQuery<'_>) -> Result<Vec<SecretVariable>>;
}
