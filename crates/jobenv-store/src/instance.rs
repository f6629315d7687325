//! Instance-level secret variables.
//!
//! Every job reads these, so reads go through a short-lived cache holding
//! both the full list and the unprotected subset. Writes go through this store
//! and invalidate the cache before returning.

use async_trait::async_trait;
use jobenv_core::secret::{SecretVariable, SecretVariableStore, VariableLevel, VariableQuery};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::scope::select_visible;
use crate::source::VariableRecordSource;
use crate::{StoreError, StoreResult};

pub const INSTANCE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Longest value accepted on the write path.
pub const MAX_VALUE_LENGTH: usize = 10_000;

const CACHE_KEY: &str = "ci_instance_variable_data";

#[derive(Debug)]
struct InstanceSnapshot {
    all: Vec<SecretVariable>,
    unprotected: Vec<SecretVariable>,
}

pub struct InstanceVariableStore {
    source: Arc<dyn VariableRecordSource>,
    cache: TtlCache<&'static str, InstanceSnapshot>,
    ttl: Duration,
    max_value_length: usize,
}

impl InstanceVariableStore {
    pub fn new(source: Arc<dyn VariableRecordSource>) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            ttl: INSTANCE_CACHE_TTL,
            max_value_length: MAX_VALUE_LENGTH,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_value_length(mut self, max_value_length: usize) -> Self {
        self.max_value_length = max_value_length;
        self
    }

    /// Every instance variable, protected or not.
    pub async fn all_cached(&self) -> StoreResult<Vec<SecretVariable>> {
        Ok(self.snapshot().await?.all.clone())
    }

    /// Instance variables usable on unprotected refs.
    pub async fn unprotected_cached(&self) -> StoreResult<Vec<SecretVariable>> {
        Ok(self.snapshot().await?.unprotected.clone())
    }

    /// Create or replace an instance variable, then invalidate the cache.
    pub async fn save(&self, variable: SecretVariable) -> StoreResult<()> {
        self.validate(&variable)?;
        let key = variable.key.clone();
        self.source.upsert(variable).await?;
        self.invalidate().await;
        info!(key = %key, "Instance variable saved");
        Ok(())
    }

    /// Delete an instance variable, then invalidate the cache.
    pub async fn remove(&self, key: &str, environment_scope: &str) -> StoreResult<()> {
        self.source
            .delete(VariableLevel::Instance, key, environment_scope)
            .await?;
        self.invalidate().await;
        info!(key = %key, "Instance variable removed");
        Ok(())
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(&CACHE_KEY).await;
    }

    async fn snapshot(&self) -> StoreResult<Arc<InstanceSnapshot>> {
        self.cache
            .get_or_compute(CACHE_KEY, self.ttl, || async {
                let all = self.source.load(VariableLevel::Instance).await?;
                let unprotected = all.iter().filter(|v| !v.protected).cloned().collect();
                debug!(count = all.len(), "Loaded instance variables");
                Ok::<_, StoreError>(InstanceSnapshot { all, unprotected })
            })
            .await
    }

    fn validate(&self, variable: &SecretVariable) -> StoreResult<()> {
        if variable.owner != VariableLevel::Instance {
            return Err(StoreError::Validation(format!(
                "variable {} belongs to {}, not the instance",
                variable.key, variable.owner
            )));
        }
        if variable.key.is_empty() {
            return Err(StoreError::Validation("key must not be empty".to_string()));
        }
        if variable.value.chars().count() > self.max_value_length {
            return Err(StoreError::Validation(format!(
                "the value of {} exceeds the {} character limit",
                variable.key, self.max_value_length
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretVariableStore for InstanceVariableStore {
    fn level_name(&self) -> &'static str {
        "instance"
    }

    async fn variables_for(
        &self,
        query: VariableQuery<'_>,
    ) -> jobenv_core::Result<Vec<SecretVariable>> {
        let candidates = if query.git_ref.protected {
            self.all_cached().await
        } else {
            self.unprotected_cached().await
        }
        .map_err(|e| e.into_core(self.level_name()))?;

        Ok(select_visible(candidates, query.git_ref, query.environment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRecordSource;
    use jobenv_core::job::{GitRef, Project};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts loads and can be switched into failure mode.
    #[derive(Default)]
    struct ProbeSource {
        inner: MemoryRecordSource,
        loads: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl VariableRecordSource for ProbeSource {
        async fn load(&self, owner: VariableLevel) -> StoreResult<Vec<SecretVariable>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            self.inner.load(owner).await
        }

        async fn upsert(&self, variable: SecretVariable) -> StoreResult<()> {
            self.inner.upsert(variable).await
        }

        async fn delete(&self, owner: VariableLevel, key: &str, scope: &str) -> StoreResult<()> {
            self.inner.delete(owner, key, scope).await
        }
    }

    fn instance_var(key: &str, value: &str) -> SecretVariable {
        SecretVariable::new(VariableLevel::Instance, key, value)
    }

    #[tokio::test]
    async fn test_protected_split() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![
            instance_var("OPEN", "1"),
            instance_var("LOCKED", "2").protected(),
        ]));
        let store = InstanceVariableStore::new(source);

        assert_eq!(store.all_cached().await.unwrap().len(), 2);
        let unprotected = store.unprotected_cached().await.unwrap();
        assert_eq!(unprotected.len(), 1);
        assert_eq!(unprotected[0].key, "OPEN");
    }

    #[tokio::test]
    async fn test_reads_share_one_load() {
        let source = Arc::new(ProbeSource::default());
        let store = InstanceVariableStore::new(source.clone());

        store.all_cached().await.unwrap();
        store.unprotected_cached().await.unwrap();
        store.all_cached().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_then_read_never_returns_previous_value() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![instance_var("API_URL", "old")]));
        let store = InstanceVariableStore::new(source);

        assert_eq!(store.all_cached().await.unwrap()[0].value, "old");

        store.save(instance_var("API_URL", "new")).await.unwrap();
        assert_eq!(store.all_cached().await.unwrap()[0].value, "new");

        store.remove("API_URL", "*").await.unwrap();
        assert!(store.all_cached().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires() {
        let source = Arc::new(ProbeSource::default());
        let store = InstanceVariableStore::new(source.clone());

        store.all_cached().await.unwrap();
        tokio::time::advance(INSTANCE_CACHE_TTL + Duration::from_secs(1)).await;
        store.all_cached().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_failure_is_explicit() {
        let source = Arc::new(ProbeSource::default());
        source.failing.store(true, Ordering::SeqCst);
        let store = InstanceVariableStore::new(source);

        let project = Project::default();
        let git_ref = GitRef::branch("main");
        let result = store
            .variables_for(VariableQuery {
                project: &project,
                git_ref: &git_ref,
                environment: None,
            })
            .await;
        assert!(matches!(result, Err(jobenv_core::Error::SecretStore { .. })));
    }

    #[tokio::test]
    async fn test_save_rejects_oversized_value() {
        let store = InstanceVariableStore::new(Arc::new(MemoryRecordSource::new()))
            .with_max_value_length(4);

        let result = store.save(instance_var("BIG", "12345")).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_save_rejects_foreign_owner() {
        let store = InstanceVariableStore::new(Arc::new(MemoryRecordSource::new()));
        let foreign = SecretVariable::new(
            VariableLevel::Project(jobenv_core::ResourceId::new()),
            "K",
            "v",
        );
        assert!(matches!(store.save(foreign).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_variables_for_unprotected_ref() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![
            instance_var("OPEN", "1"),
            instance_var("LOCKED", "2").protected(),
        ]));
        let store = InstanceVariableStore::new(source);
        let project = Project::default();

        let git_ref = GitRef::branch("feature");
        let vars = store
            .variables_for(VariableQuery {
                project: &project,
                git_ref: &git_ref,
                environment: None,
            })
            .await
            .unwrap();
        assert_eq!(vars.len(), 1);

        let protected_ref = GitRef::branch("main").protected();
        let vars = store
            .variables_for(VariableQuery {
                project: &project,
                git_ref: &protected_ref,
                environment: None,
            })
            .await
            .unwrap();
        assert_eq!(vars.len(), 2);
    }
}
