//! Process-local cache with a fixed expiry and explicit invalidation.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Slot<V> {
    value: Arc<V>,
    stored_at: Instant,
}

struct State<K, V> {
    slots: HashMap<K, Slot<V>>,
    // Bumped on every invalidation so a computation that started earlier
    // cannot store its result afterwards.
    generations: HashMap<K, u64>,
}

pub struct TtlCache<K, V> {
    state: RwLock<State<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                slots: HashMap::new(),
                generations: HashMap::new(),
            }),
        }
    }

    /// Return the cached value if it is younger than `ttl`, otherwise run
    /// `compute` and cache its result. Errors are returned and never cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, ttl: Duration, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = {
            let state = self.state.read().await;
            if let Some(slot) = state.slots.get(&key) {
                if slot.stored_at.elapsed() < ttl {
                    return Ok(slot.value.clone());
                }
            }
            state.generations.get(&key).copied().unwrap_or(0)
        };

        let value = Arc::new(compute().await?);

        let mut state = self.state.write().await;
        let current = state.generations.get(&key).copied().unwrap_or(0);
        if current == generation {
            state.slots.insert(
                key,
                Slot {
                    value: value.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        Ok(value)
    }

    /// Drop the cached value for `key`; the next read recomputes.
    pub async fn invalidate(&self, key: &K) {
        let mut state = self.state.write().await;
        state.slots.remove(key);
        *state.generations.entry(key.clone()).or_insert(0) += 1;
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
