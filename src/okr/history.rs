//! Append-only ledger of key result snapshots.
//!
//! Each accepted value mutation records the state the key result held before the
//! write. Rows are never edited; they disappear only together with their key result.

use log::debug;
use serde::Serialize;

use super::error::{OkrError, OkrResult};
use super::model::{HistoryEntry, KeyResultRef, KeyResultSnapshot};
use super::store::{HistoryOrder, HistoryQuery, OkrRepository, PageRequest};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub order: HistoryOrder,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryLedger {
    default_order: HistoryOrder,
}

impl HistoryLedger {
    pub fn new(default_order: HistoryOrder) -> Self {
        Self { default_order }
    }

    pub fn query(&self, page: PageRequest, order: Option<HistoryOrder>) -> HistoryQuery {
        HistoryQuery {
            page,
            order: order.unwrap_or(self.default_order),
        }
    }

    pub fn record(
        &self,
        repo: &mut dyn OkrRepository,
        key_result: KeyResultRef,
        snapshot: &KeyResultSnapshot,
    ) -> OkrResult<HistoryEntry> {
        let entry = repo.append_history(key_result, snapshot)?;
        debug!(
            "Recorded history row {} for {} {}",
            entry.id,
            key_result.kind(),
            key_result.id()
        );
        Ok(entry)
    }

    pub fn list(
        &self,
        repo: &mut dyn OkrRepository,
        key_result: KeyResultRef,
        query: &HistoryQuery,
    ) -> OkrResult<HistoryPage> {
        ensure_key_result(repo, key_result)?;
        let total = repo.count_history(key_result)?;
        let entries = repo.history(key_result, query)?;
        Ok(HistoryPage {
            entries,
            total,
            page: query.page.page,
            size: query.page.size,
            order: query.order,
        })
    }

    pub(crate) fn purge(&self, repo: &mut dyn OkrRepository, key_result: KeyResultRef) -> OkrResult<i64> {
        repo.delete_history(key_result)
    }
}

pub(crate) fn ensure_key_result(repo: &mut dyn OkrRepository, key_result: KeyResultRef) -> OkrResult<()> {
    let exists = match key_result {
        KeyResultRef::Company(id) => repo.company_key_result(id)?.is_some(),
        KeyResultRef::BusinessUnit(id) => repo.business_unit_key_result(id)?.is_some(),
    };
    if exists {
        Ok(())
    } else {
        Err(OkrError::not_found(key_result.kind(), key_result.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::okr::model::{EntityKind, NewCompanyKeyResult, NewCompanyObjective};
    use crate::okr::store::{MemoryStore, OkrStore};
    use chrono::{Duration, NaiveDate, Utc};

    fn company_key_result(store: &MemoryStore) -> i64 {
        store
            .transaction(|repo| {
                let objective = repo.insert_company_objective(NewCompanyObjective {
                    name: "Expand".into(),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                    achievement: 0,
                })?;
                let kr = repo.insert_company_key_result(NewCompanyKeyResult {
                    company_objective_id: objective.id,
                    name: "Markets".into(),
                    current_value: 0.0,
                    goal_value: 4.0,
                    confidence_level: 70.0,
                    achievement: 0,
                    comment: String::new(),
                    timestamp: Utc::now(),
                })?;
                Ok(kr.id)
            })
            .unwrap()
    }

    fn snapshot(current_value: f64, minutes: i64) -> KeyResultSnapshot {
        KeyResultSnapshot {
            current_value,
            goal_value: 4.0,
            confidence_level: 70.0,
            achievement: 0,
            comment: String::new(),
            timestamp: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_record_keeps_prior_rows() {
        let store = MemoryStore::new();
        let ledger = HistoryLedger::default();
        let key = KeyResultRef::Company(company_key_result(&store));

        let first = store
            .transaction(|repo| ledger.record(repo, key, &snapshot(0.0, 0)))
            .unwrap();
        store
            .transaction(|repo| ledger.record(repo, key, &snapshot(1.0, 1)))
            .unwrap();

        let page = store
            .transaction(|repo| ledger.list(repo, key, &ledger.query(PageRequest::default(), None)))
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries[0], first);
        assert_eq!(page.entries[1].snapshot.current_value, 1.0);
    }

    #[test]
    fn test_list_pages_are_stable() {
        let store = MemoryStore::new();
        let ledger = HistoryLedger::new(HistoryOrder::Desc);
        let key = KeyResultRef::Company(company_key_result(&store));
        store
            .transaction(|repo| {
                for i in 0..5 {
                    ledger.record(repo, key, &snapshot(f64::from(i), i64::from(i)))?;
                }
                Ok(())
            })
            .unwrap();

        let query = ledger.query(PageRequest::new(1, 2), None);
        let once = store.transaction(|repo| ledger.list(repo, key, &query)).unwrap();
        let twice = store.transaction(|repo| ledger.list(repo, key, &query)).unwrap();
        assert_eq!(once.entries, twice.entries);
        assert_eq!(once.order, HistoryOrder::Desc);
        let values: Vec<f64> = once.entries.iter().map(|e| e.snapshot.current_value).collect();
        assert_eq!(values, vec![2.0, 1.0]);
    }

    #[test]
    fn test_list_unknown_key_result() {
        let store = MemoryStore::new();
        let ledger = HistoryLedger::default();
        let err = store
            .transaction(|repo| {
                ledger.list(
                    repo,
                    KeyResultRef::BusinessUnit(404),
                    &ledger.query(PageRequest::default(), None),
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            OkrError::NotFound {
                kind: EntityKind::BusinessUnitKeyResult,
                id: 404
            }
        ));
    }
}
