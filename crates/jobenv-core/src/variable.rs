//! A single key/value contribution to a job's environment.

use serde::Serialize;

use crate::{Error, Result};

/// One variable contributed by one source.
///
/// Entries are immutable once built: the flag setters consume `self` and are
/// only usable while the entry is being constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableEntry {
    key: String,
    value: String,
    public: bool,
    file: bool,
    raw: bool,
    masked: bool,
}

impl VariableEntry {
    /// Create a public, non-file, expandable entry. The key must not be empty.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidInput("variable key must not be empty".to_string()));
        }
        Ok(Self {
            key,
            value: value.into(),
            public: true,
            file: false,
            raw: false,
            masked: false,
        })
    }

    /// Mark the value as secret.
    pub fn secret(mut self) -> Self {
        self.public = false;
        self
    }

    /// The execution layer materializes the value as a file and exposes its path.
    pub fn file(mut self) -> Self {
        self.file = true;
        self
    }

    /// Skip `$VAR` expansion for this entry.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Request log redaction. Implies secret.
    pub fn masked(mut self) -> Self {
        self.masked = true;
        self.public = false;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_file(&self) -> bool {
        self.file
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Same flags, different value. Used by expansion, which produces new entries.
    pub(crate) fn with_value(&self, value: String) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}
