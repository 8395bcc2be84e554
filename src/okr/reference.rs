//! The optional link from a business unit key result up to a company key result.
//!
//! The link lives in one nullable column on the business unit side, so a key result
//! can never point at two targets. Linking moves no values and writes no history.

use log::info;

use super::aggregation::AggregationEngine;
use super::error::{OkrError, OkrResult};
use super::model::{BusinessUnitKeyResult, EntityKind, KeyResultRef};
use super::store::OkrRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceOutcome {
    /// A new target was set, replacing `previous` if there was one.
    Linked { previous: Option<i64> },
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResultReferenceManager {
    engine: AggregationEngine,
}

impl KeyResultReferenceManager {
    pub fn new(engine: AggregationEngine) -> Self {
        Self { engine }
    }

    pub fn reference(
        &self,
        repo: &mut dyn OkrRepository,
        key_result_id: i64,
        company_key_result_id: i64,
    ) -> OkrResult<ReferenceOutcome> {
        let key_result = lock(repo, key_result_id)?;
        if repo.company_key_result(company_key_result_id)?.is_none() {
            return Err(OkrError::not_found(
                EntityKind::CompanyKeyResult,
                company_key_result_id,
            ));
        }
        let previous = key_result.company_key_result_ref;
        if previous == Some(company_key_result_id) {
            return Ok(ReferenceOutcome::Unchanged);
        }

        repo.set_company_key_result_ref(key_result_id, Some(company_key_result_id))?;
        self.engine
            .recompute(repo, KeyResultRef::BusinessUnit(key_result_id))?;
        info!(
            "BusinessUnitKeyResult {} now references CompanyKeyResult {} (previously {:?})",
            key_result_id, company_key_result_id, previous
        );
        Ok(ReferenceOutcome::Linked { previous })
    }

    /// Clears the link. Returns the former target; calling it again is a no-op.
    pub fn dereference(&self, repo: &mut dyn OkrRepository, key_result_id: i64) -> OkrResult<Option<i64>> {
        let key_result = lock(repo, key_result_id)?;
        let Some(previous) = key_result.company_key_result_ref else {
            return Ok(None);
        };
        repo.set_company_key_result_ref(key_result_id, None)?;
        self.engine
            .recompute(repo, KeyResultRef::BusinessUnit(key_result_id))?;
        info!(
            "BusinessUnitKeyResult {} no longer references CompanyKeyResult {}",
            key_result_id, previous
        );
        Ok(Some(previous))
    }

    /// Nulls every reference to `company_key_result_id` and returns the detached key results.
    pub fn detach_all(&self, repo: &mut dyn OkrRepository, company_key_result_id: i64) -> OkrResult<Vec<i64>> {
        let referencing = repo.business_unit_key_results_by_company_key_result(company_key_result_id)?;
        let mut detached = Vec::with_capacity(referencing.len());
        for key_result in referencing {
            if key_result.company_key_result_ref != Some(company_key_result_id) {
                return Err(OkrError::ReferenceConflict {
                    key_result: key_result.id,
                });
            }
            repo.set_company_key_result_ref(key_result.id, None)?;
            detached.push(key_result.id);
        }
        if !detached.is_empty() {
            info!(
                "Detached {} business unit key results from CompanyKeyResult {}",
                detached.len(),
                company_key_result_id
            );
        }
        Ok(detached)
    }

    pub fn referencing(
        &self,
        repo: &mut dyn OkrRepository,
        company_key_result_id: i64,
    ) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        if repo.company_key_result(company_key_result_id)?.is_none() {
            return Err(OkrError::not_found(
                EntityKind::CompanyKeyResult,
                company_key_result_id,
            ));
        }
        repo.business_unit_key_results_by_company_key_result(company_key_result_id)
    }
}

fn lock(repo: &mut dyn OkrRepository, key_result_id: i64) -> OkrResult<BusinessUnitKeyResult> {
    let missing = || OkrError::not_found(EntityKind::BusinessUnitKeyResult, key_result_id);
    let owner = repo
        .business_unit_key_result(key_result_id)?
        .ok_or_else(missing)?
        .business_unit_objective_id;
    repo.lock_business_unit_objective(owner)?;
    repo.lock_business_unit_key_result(key_result_id)?
        .ok_or_else(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::okr::model::{
        NewBusinessUnit, NewBusinessUnitKeyResult, NewBusinessUnitObjective, NewCompanyKeyResult,
        NewCompanyObjective,
    };
    use crate::okr::store::{MemoryStore, OkrStore};
    use chrono::{NaiveDate, Utc};

    struct Fixture {
        store: MemoryStore,
        company: [i64; 2],
        key_result: i64,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let (company, key_result) = store
            .transaction(|repo| {
                let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
                let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
                let objective = repo.insert_company_objective(NewCompanyObjective {
                    name: "Grow".into(),
                    start_date: start,
                    end_date: end,
                    achievement: 0,
                })?;
                let mut company = [0; 2];
                for slot in company.iter_mut() {
                    *slot = repo
                        .insert_company_key_result(NewCompanyKeyResult {
                            company_objective_id: objective.id,
                            name: "Revenue".into(),
                            current_value: 0.0,
                            goal_value: 100.0,
                            confidence_level: 50.0,
                            achievement: 0,
                            comment: String::new(),
                            timestamp: Utc::now(),
                        })?
                        .id;
                }
                let unit = repo.insert_business_unit(NewBusinessUnit { name: "Sales".into() })?;
                let bu_objective = repo.insert_business_unit_objective(NewBusinessUnitObjective {
                    business_unit_id: unit.id,
                    name: "Sell".into(),
                    start_date: start,
                    end_date: end,
                    achievement: 0,
                })?;
                let kr = repo.insert_business_unit_key_result(NewBusinessUnitKeyResult {
                    business_unit_objective_id: bu_objective.id,
                    name: "Deals".into(),
                    current_value: 2.0,
                    goal_value: 4.0,
                    confidence_level: 60.0,
                    achievement: 50,
                    comment: String::new(),
                    timestamp: Utc::now(),
                })?;
                Ok((company, kr.id))
            })
            .unwrap();
        Fixture {
            store,
            company,
            key_result,
        }
    }

    #[test]
    fn test_rereference_keeps_single_target() {
        let f = fixture();
        let manager = KeyResultReferenceManager::default();
        let [first, second] = f.company;

        let linked = f
            .store
            .transaction(|repo| manager.reference(repo, f.key_result, first))
            .unwrap();
        assert_eq!(linked, ReferenceOutcome::Linked { previous: None });
        let relinked = f
            .store
            .transaction(|repo| manager.reference(repo, f.key_result, second))
            .unwrap();
        assert_eq!(relinked, ReferenceOutcome::Linked { previous: Some(first) });

        f.store
            .transaction(|repo| {
                assert!(manager.referencing(repo, first)?.is_empty());
                let on_second = manager.referencing(repo, second)?;
                assert_eq!(on_second.len(), 1);
                assert_eq!(on_second[0].company_key_result_ref, Some(second));
                assert_eq!(repo.count_history(KeyResultRef::BusinessUnit(f.key_result))?, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_same_pair_is_unchanged() {
        let f = fixture();
        let manager = KeyResultReferenceManager::default();
        let target = f.company[0];
        f.store
            .transaction(|repo| manager.reference(repo, f.key_result, target))
            .unwrap();
        let again = f
            .store
            .transaction(|repo| manager.reference(repo, f.key_result, target))
            .unwrap();
        assert_eq!(again, ReferenceOutcome::Unchanged);
    }

    #[test]
    fn test_dereference_is_idempotent() {
        let f = fixture();
        let manager = KeyResultReferenceManager::default();
        let target = f.company[1];
        f.store
            .transaction(|repo| manager.reference(repo, f.key_result, target))
            .unwrap();

        let first = f
            .store
            .transaction(|repo| manager.dereference(repo, f.key_result))
            .unwrap();
        let second = f
            .store
            .transaction(|repo| manager.dereference(repo, f.key_result))
            .unwrap();
        assert_eq!(first, Some(target));
        assert_eq!(second, None);
    }

    #[test]
    fn test_missing_side_is_reported() {
        let f = fixture();
        let manager = KeyResultReferenceManager::default();
        let err = f
            .store
            .transaction(|repo| manager.reference(repo, 9_999, 8_888))
            .unwrap_err();
        assert!(matches!(
            err,
            OkrError::NotFound {
                kind: EntityKind::BusinessUnitKeyResult,
                ..
            }
        ));
        let err = f
            .store
            .transaction(|repo| manager.reference(repo, f.key_result, 8_888))
            .unwrap_err();
        assert!(matches!(
            err,
            OkrError::NotFound {
                kind: EntityKind::CompanyKeyResult,
                id: 8_888
            }
        ));
    }

    #[test]
    fn test_detach_all_clears_references() {
        let f = fixture();
        let manager = KeyResultReferenceManager::default();
        let target = f.company[0];
        f.store
            .transaction(|repo| manager.reference(repo, f.key_result, target))
            .unwrap();
        let detached = f
            .store
            .transaction(|repo| manager.detach_all(repo, target))
            .unwrap();
        assert_eq!(detached, vec![f.key_result]);
        let kr = f
            .store
            .transaction(|repo| repo.business_unit_key_result(f.key_result))
            .unwrap()
            .unwrap();
        assert_eq!(kr.company_key_result_ref, None);
    }
}
