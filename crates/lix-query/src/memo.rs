//! Memoized preprocessing results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::debug;

use lix_core::{LixError, Result};

use crate::ast::Statement;
use crate::catalog::EngineState;
use crate::Plan;

/// Stable fingerprint of a statement's shape and literals.
pub fn fingerprint(statement: &Statement) -> String {
    blake3::hash(statement.to_string().as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    fingerprint: String,
    generation: u64,
    active_version_id: String,
}

#[derive(Default)]
struct Inner {
    plans: HashMap<PlanKey, Arc<Plan>>,
    order: VecDeque<PlanKey>,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Cache of preprocessed plans keyed by statement fingerprint, schema
/// generation and active version.
///
/// A new schema generation drops every cached plan.
pub struct PlanCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Return the cached plan for a statement or build and remember it.
    pub fn get_or_prepare(
        &self,
        statement: &Statement,
        state: &EngineState,
        prepare: impl FnOnce() -> Result<Plan>,
    ) -> Result<Arc<Plan>> {
        let key = PlanKey {
            fingerprint: fingerprint(statement),
            generation: state.catalog.generation(),
            active_version_id: state.active_version_id.clone(),
        };

        {
            let mut inner = self.lock()?;
            if inner.generation != key.generation {
                debug!(
                    "Schema generation {} -> {}, dropping {} cached plans",
                    inner.generation,
                    key.generation,
                    inner.plans.len()
                );
                inner.plans.clear();
                inner.order.clear();
                inner.generation = key.generation;
            }
            if let Some(plan) = inner.plans.get(&key).cloned() {
                inner.hits += 1;
                return Ok(plan);
            }
            inner.misses += 1;
        }

        let plan = Arc::new(prepare()?);
        if self.capacity == 0 {
            return Ok(plan);
        }

        let mut inner = self.lock()?;
        if inner.generation == key.generation && !inner.plans.contains_key(&key) {
            while inner.plans.len() >= self.capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.plans.remove(&oldest);
                    }
                    None => break,
                }
            }
            inner.order.push_back(key.clone());
            inner.plans.insert(key, plan.clone());
        }
        Ok(plan)
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.plans.clear();
            inner.order.clear();
        }
    }

    pub fn stats(&self) -> PlanCacheStats {
        match self.inner.lock() {
            Ok(inner) => PlanCacheStats {
                hits: inner.hits,
                misses: inner.misses,
                entries: inner.plans.len(),
            },
            Err(_) => PlanCacheStats::default(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| LixError::internal(format!("plan cache lock poisoned: {e}")))
    }
}
