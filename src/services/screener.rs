//! Caller-facing screening API
//!
//! `Screener` binds a `ListStore`, the configured verdict policy and metrics.
//! Callers that do not want to build one can use `default_screener()`, a
//! shared instance bound to the store path from SANCTIONS_STORE_PATH.

use crate::domain::types::{DateOfBirth, MatchResult};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::list_store::{ListStore, StoreError};
use crate::services::name_matcher::{self, NameQuery, VerdictPolicy};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub struct Screener {
    store: Arc<ListStore>,
    policy: VerdictPolicy,
    metrics: Arc<Metrics>,
}

impl Screener {
    pub fn new(store: Arc<ListStore>, policy: VerdictPolicy, metrics: Arc<Metrics>) -> Self {
        if policy != VerdictPolicy::NameOnly {
            info!(policy = %policy.as_str(), "screener_dob_gating_enabled");
        }
        Self { store, policy, metrics }
    }

    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Self {
        let store = Arc::new(ListStore::new(config.store_path()));
        Self::new(store, config.verdict_policy(), metrics)
    }

    pub fn store(&self) -> &Arc<ListStore> {
        &self.store
    }

    pub fn policy(&self) -> VerdictPolicy {
        self.policy
    }

    /// Screen one query against the current document.
    /// Store errors are returned, never reported as "not matched".
    pub fn check(&self, query: &NameQuery) -> Result<MatchResult, StoreError> {
        let start = Instant::now();
        let doc = match self.store.current_data() {
            Ok(doc) => doc,
            Err(e) => {
                self.metrics.record_store_error();
                error!(error = %e, "screen_store_unavailable");
                return Err(e);
            }
        };

        let result = name_matcher::check(&doc, query, self.policy);
        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_check(latency_us, result.matched);

        if result.matched {
            info!(
                list = %result.list.as_deref().unwrap_or_default(),
                entry = %result.name.as_deref().unwrap_or_default(),
                dob_matched = ?result.dob_matched,
                latency_us = %latency_us,
                "screen_match"
            );
        } else {
            debug!(latency_us = %latency_us, "screen_clear");
        }
        Ok(result)
    }

    /// Convenience form of `check` for separate arguments
    pub fn check_name(
        &self,
        first: &str,
        last: &str,
        dob: Option<DateOfBirth>,
    ) -> Result<MatchResult, StoreError> {
        let query = NameQuery { first: first.to_string(), last: last.to_string(), dob };
        self.check(&query)
    }

    /// Boolean form, equal to `check(..)?.matched`
    pub fn is_sanctioned(&self, query: &NameQuery) -> Result<bool, StoreError> {
        Ok(self.check(query)?.matched)
    }
}

/// Process-wide default, rebuilt when the configured store path changes
static DEFAULT_SCREENER: Mutex<Option<Arc<Screener>>> = parking_lot::const_mutex(None);

/// Shared screener bound to SANCTIONS_STORE_PATH (or the default path).
/// A changed path replaces the cached instance so stale data from the old
/// location is never served.
pub fn default_screener() -> Arc<Screener> {
    let path = Config::store_path_from_env();
    let mut slot = DEFAULT_SCREENER.lock();

    if let Some(existing) = slot.as_ref() {
        if existing.store().path() == path.as_path() {
            return Arc::clone(existing);
        }
        info!(
            old = %existing.store().path().display(),
            new = %path.display(),
            "default_screener_rebound"
        );
    }

    let screener = Arc::new(Screener::new(
        Arc::new(ListStore::new(&path)),
        VerdictPolicy::default(),
        Arc::new(Metrics::new()),
    ));
    *slot = Some(Arc::clone(&screener));
    screener
}

/// Screen with the process-wide default screener
pub fn check(first: &str, last: &str, dob: Option<DateOfBirth>) -> Result<MatchResult, StoreError> {
    default_screener().check_name(first, last, dob)
}

/// Boolean screen with the process-wide default screener
pub fn is_sanctioned(first: &str, last: &str, dob: Option<DateOfBirth>) -> Result<bool, StoreError> {
    Ok(check(first, last, dob)?.matched)
}
