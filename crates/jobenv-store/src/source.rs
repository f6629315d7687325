//! Where secret variable records come from.
//!
//! Persistence lives outside this crate; a store only needs the records of
//! one owner, in the order the owner's administrators defined them.

use async_trait::async_trait;
use jobenv_core::secret::{SecretVariable, VariableLevel};
use tokio::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait VariableRecordSource: Send + Sync {
    /// All records owned by `owner`, in definition order.
    async fn load(&self, owner: VariableLevel) -> StoreResult<Vec<SecretVariable>>;

    /// Insert or replace the record with the same owner, key and scope.
    async fn upsert(&self, variable: SecretVariable) -> StoreResult<()>;

    async fn delete(&self, owner: VariableLevel, key: &str, environment_scope: &str) -> StoreResult<()>;
}

/// In-memory record source, used by the CLI and in tests.
#[derive(Default)]
pub struct MemoryRecordSource {
    records: RwLock<Vec<SecretVariable>>,
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SecretVariable>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl VariableRecordSource for MemoryRecordSource {
    async fn load(&self, owner: VariableLevel) -> StoreResult<Vec<SecretVariable>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.owner == owner).cloned().collect())
    }

    async fn upsert(&self, variable: SecretVariable) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let existing = records.iter_mut().find(|r| {
            r.owner == variable.owner
                && r.key == variable.key
                && r.environment_scope == variable.environment_scope
        });
        match existing {
            Some(record) => *record = variable,
            None => records.push(variable),
        }
        Ok(())
    }

    async fn delete(&self, owner: VariableLevel, key: &str, environment_scope: &str) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !(r.owner == owner && r.key == key && r.environment_scope == environment_scope));
        if records.len() == before {
            return Err(StoreError::NotFound(format!("variable {key} ({owner})")));
        }
        Ok(())
    }
}
