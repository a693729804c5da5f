//! Rebuild dispatch.
//!
//! Runs the build function for every planned key and writes the result into
//! the store. Each key stands alone: a failing or panicking build is recorded
//! and the rest of the plan still runs.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use super::definition::Beverage;
use super::error::KettleError;
use super::keys::CacheKey;
use super::planner::RebuildPlan;
use super::registry::DefinitionRegistry;
use super::store::CacheStore;

const METRIC_REBUILD_TOTAL: &str = "kettle_rebuild_total";

/// Outcome of dispatching one plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub rebuilt: Vec<CacheKey>,
    /// Keys whose definition was no longer registered.
    pub skipped: Vec<CacheKey>,
    pub failed: Vec<(CacheKey, String)>,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.rebuilt.extend(other.rebuilt);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn is_empty(&self) -> bool {
        self.rebuilt.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct RebuildDispatcher {
    registry: Arc<DefinitionRegistry>,
    store: Arc<dyn CacheStore>,
}

impl RebuildDispatcher {
    pub fn new(registry: Arc<DefinitionRegistry>, store: Arc<dyn CacheStore>) -> Self {
        Self { registry, store }
    }

    pub fn dispatch(&self, plan: &RebuildPlan) -> DispatchReport {
        let mut report = DispatchReport::default();

        for key in plan.iter() {
            let Some(definition) = self.registry.get(&key.name) else {
                debug!(key = %key, "Skipping rebuild: definition not registered");
                counter!(METRIC_REBUILD_TOTAL, "outcome" => "skipped").increment(1);
                report.skipped.push(key.clone());
                continue;
            };

            match brew_into(self.store.as_ref(), &definition, key) {
                Ok(_) => {
                    counter!(METRIC_REBUILD_TOTAL, "outcome" => "rebuilt").increment(1);
                    report.rebuilt.push(key.clone());
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Cache rebuild failed");
                    counter!(METRIC_REBUILD_TOTAL, "outcome" => "failed").increment(1);
                    report.failed.push((key.clone(), err.to_string()));
                }
            }
        }

        report
    }
}

/// Build the value for `key` and store it; the value is returned on success.
///
/// Nothing is written when the build fails.
pub(crate) fn brew_into(
    store: &dyn CacheStore,
    definition: &Beverage,
    key: &CacheKey,
) -> Result<Value, KettleError> {
    let value = brew(definition, key)?;
    store.set(&key.storage_key(), value.clone());
    Ok(value)
}

/// Run the build function, mapping errors and panics to `KettleError::Build`.
pub(crate) fn brew(definition: &Beverage, key: &CacheKey) -> Result<Value, KettleError> {
    match catch_unwind(AssertUnwindSafe(|| definition.brew(&key.identity))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(KettleError::build(key, err.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|text| (*text).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "build function panicked".to_string());
            Err(KettleError::build(key, message))
        }
    }
}
