//! In-memory result store.
//!
//! Results are kept in insertion order. A result is written once as pending,
//! updated while it runs and frozen once it reaches a terminal status.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use super::error::AnalysisError;
use super::models::AnalysisResult;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("analysis {0} already exists")]
    Duplicate(String),

    #[error("analysis {0} not found")]
    NotFound(String),

    #[error("analysis {0} is already finished")]
    Finalized(String),
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AnalysisError::NotFound(id),
            other => AnalysisError::ExecutionFailure(other.to_string()),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    order: VecDeque<String>,
    results: HashMap<String, AnalysisResult>,
}

pub struct ResultStore {
    inner: RwLock<StoreInner>,
    /// When set, inserting past this many results evicts the oldest finished one.
    max_entries: Option<usize>,
}

impl ResultStore {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            max_entries,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Stores a new result under its own identifier.
    pub fn put(&self, result: AnalysisResult) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.results.contains_key(&result.analysis_id) {
            return Err(StoreError::Duplicate(result.analysis_id));
        }

        if let Some(max) = self.max_entries {
            while inner.results.len() >= max {
                let Some(pos) = inner
                    .order
                    .iter()
                    .position(|id| inner.results.get(id).is_some_and(AnalysisResult::is_terminal))
                else {
                    warn!(
                        "Result store holds {} unfinished analyses, exceeding its cap of {}",
                        inner.results.len(),
                        max
                    );
                    break;
                };
                if let Some(evicted) = inner.order.remove(pos) {
                    debug!("Evicting analysis {}", evicted);
                    inner.results.remove(&evicted);
                }
            }
        }

        inner.order.push_back(result.analysis_id.clone());
        inner.results.insert(result.analysis_id.clone(), result);
        Ok(())
    }

    /// Applies `change` to a result that has not finished yet and returns the
    /// updated copy.
    pub fn update<F>(&self, analysis_id: &str, change: F) -> Result<AnalysisResult, StoreError>
    where
        F: FnOnce(&mut AnalysisResult),
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let result = inner
            .results
            .get_mut(analysis_id)
            .ok_or_else(|| StoreError::NotFound(analysis_id.to_string()))?;
        if result.is_terminal() {
            warn!(
                "Refusing to modify finished analysis {} ({})",
                analysis_id,
                result.status.as_str()
            );
            return Err(StoreError::Finalized(analysis_id.to_string()));
        }
        change(result);
        Ok(result.clone())
    }

    pub fn get(&self, analysis_id: &str) -> Result<AnalysisResult, AnalysisError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .results
            .get(analysis_id)
            .cloned()
            .ok_or_else(|| AnalysisError::NotFound(analysis_id.to_string()))
    }

    /// All stored results, oldest first.
    pub fn list(&self) -> Vec<AnalysisResult> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.results.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::AnalysisStatus;
    use std::collections::BTreeMap;

    fn pending(id: &str) -> AnalysisResult {
        AnalysisResult::pending(id, "slither-analyze", BTreeMap::new())
    }

    fn finish(store: &ResultStore, id: &str) {
        store
            .update(id, |r| {
                r.status = AnalysisStatus::Completed;
                r.success = true;
            })
            .unwrap();
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = ResultStore::unbounded();
        for id in ["slither_0", "mythril_0", "slither_1"] {
            store.put(pending(id)).unwrap();
        }
        let ids: Vec<String> = store.list().into_iter().map(|r| r.analysis_id).collect();
        assert_eq!(ids, vec!["slither_0", "mythril_0", "slither_1"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = ResultStore::unbounded();
        store.put(pending("slither_0")).unwrap();
        assert_eq!(
            store.put(pending("slither_0")),
            Err(StoreError::Duplicate("slither_0".into()))
        );
    }

    #[test]
    fn finished_results_are_frozen() {
        let store = ResultStore::unbounded();
        store.put(pending("slither_0")).unwrap();
        finish(&store, "slither_0");

        let err = store
            .update("slither_0", |r| r.status = AnalysisStatus::Failed)
            .unwrap_err();
        assert_eq!(err, StoreError::Finalized("slither_0".into()));
        assert_eq!(
            store.get("slither_0").unwrap().status,
            AnalysisStatus::Completed
        );
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = ResultStore::unbounded();
        assert_eq!(
            store.get("nope_0").unwrap_err(),
            AnalysisError::NotFound("nope_0".into())
        );
        assert!(matches!(
            store.update("nope_0", |_| {}),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn cap_evicts_oldest_finished_result() {
        let store = ResultStore::new(Some(2));
        store.put(pending("slither_0")).unwrap();
        store.put(pending("slither_1")).unwrap();
        finish(&store, "slither_1");

        store.put(pending("slither_2")).unwrap();
        let ids: Vec<String> = store.list().into_iter().map(|r| r.analysis_id).collect();
        assert_eq!(ids, vec!["slither_0", "slither_2"]);
    }

    #[test]
    fn cap_never_evicts_unfinished_results() {
        let store = ResultStore::new(Some(1));
        store.put(pending("slither_0")).unwrap();
        store.put(pending("slither_1")).unwrap();
        assert_eq!(store.len(), 2);
    }
}
