//! Recomputes derived achievement after a key result changes.
//!
//! A key result's percentage comes from its own values; its objective's percentage
//! is the mean over every key result it owns, each derived from current values.
//! Company objectives only ever read company key results.

use log::debug;

use super::achievement::{achievement, objective_achievement};
use super::error::{OkrError, OkrResult};
use super::model::{EntityKind, KeyResultRef, KeyResultValues};
use super::store::OkrRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputation {
    pub key_result: KeyResultRef,
    pub key_result_achievement: i32,
    pub objective_id: i64,
    pub objective_achievement: i32,
    /// Rows actually rewritten; zero when everything was already current.
    pub writes: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

fn derived<K: KeyResultValues>(key_result: &K) -> OkrResult<i32> {
    let (current, goal) = key_result.current_and_goal();
    achievement(current, goal)
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn recompute(&self, repo: &mut dyn OkrRepository, key_result: KeyResultRef) -> OkrResult<Recomputation> {
        let missing = || OkrError::not_found(key_result.kind(), key_result.id());
        let mut writes = 0;
        let (key_result_achievement, objective_id) = match key_result {
            KeyResultRef::Company(id) => {
                let owner = repo.company_key_result(id)?.ok_or_else(missing)?.company_objective_id;
                repo.lock_company_objective(owner)?
                    .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, owner))?;
                let mut kr = repo.lock_company_key_result(id)?.ok_or_else(missing)?;
                let value = derived(&kr)?;
                if value != kr.achievement {
                    kr.achievement = value;
                    repo.update_company_key_result(&kr)?;
                    writes += 1;
                }
                (value, owner)
            }
            KeyResultRef::BusinessUnit(id) => {
                let owner = repo
                    .business_unit_key_result(id)?
                    .ok_or_else(missing)?
                    .business_unit_objective_id;
                repo.lock_business_unit_objective(owner)?
                    .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, owner))?;
                let mut kr = repo.lock_business_unit_key_result(id)?.ok_or_else(missing)?;
                let value = derived(&kr)?;
                if value != kr.achievement {
                    kr.achievement = value;
                    repo.update_business_unit_key_result(&kr)?;
                    writes += 1;
                }
                (value, owner)
            }
        };

        let (objective_achievement, objective_written) = match key_result {
            KeyResultRef::Company(_) => self.refresh_company_objective(repo, objective_id)?,
            KeyResultRef::BusinessUnit(_) => self.refresh_business_unit_objective(repo, objective_id)?,
        };
        if objective_written {
            writes += 1;
        }

        debug!(
            "Recomputed {} {}: {}%, objective {} at {}% ({} writes)",
            key_result.kind(),
            key_result.id(),
            key_result_achievement,
            objective_id,
            objective_achievement,
            writes
        );
        Ok(Recomputation {
            key_result,
            key_result_achievement,
            objective_id,
            objective_achievement,
            writes,
        })
    }

    pub fn recompute_company_objective(&self, repo: &mut dyn OkrRepository, objective_id: i64) -> OkrResult<i32> {
        Ok(self.refresh_company_objective(repo, objective_id)?.0)
    }

    pub fn recompute_business_unit_objective(&self, repo: &mut dyn OkrRepository, objective_id: i64) -> OkrResult<i32> {
        Ok(self.refresh_business_unit_objective(repo, objective_id)?.0)
    }

    fn refresh_company_objective(&self, repo: &mut dyn OkrRepository, objective_id: i64) -> OkrResult<(i32, bool)> {
        let mut objective = repo
            .lock_company_objective(objective_id)?
            .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, objective_id))?;
        let values = repo
            .company_key_results_by_objective(objective_id)?
            .iter()
            .map(derived)
            .collect::<OkrResult<Vec<_>>>()?;
        let value = objective_achievement(values);
        if value == objective.achievement {
            return Ok((value, false));
        }
        objective.achievement = value;
        repo.update_company_objective(&objective)?;
        Ok((value, true))
    }

    fn refresh_business_unit_objective(&self, repo: &mut dyn OkrRepository, objective_id: i64) -> OkrResult<(i32, bool)> {
        let mut objective = repo
            .lock_business_unit_objective(objective_id)?
            .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, objective_id))?;
        let values = repo
            .business_unit_key_results_by_objective(objective_id)?
            .iter()
            .map(derived)
            .collect::<OkrResult<Vec<_>>>()?;
        let value = objective_achievement(values);
        if value == objective.achievement {
            return Ok((value, false));
        }
        objective.achievement = value;
        repo.update_business_unit_objective(&objective)?;
        Ok((value, true))
    }
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

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    fn company_kr(objective_id: i64, current_value: f64, goal_value: f64) -> NewCompanyKeyResult {
        NewCompanyKeyResult {
            company_objective_id: objective_id,
            name: "kr".into(),
            current_value,
            goal_value,
            confidence_level: 50.0,
            achievement: 0,
            comment: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_objective_is_mean_of_key_results() {
        let store = MemoryStore::new();
        let engine = AggregationEngine::new();
        let result = store
            .transaction(|repo| {
                let objective = repo.insert_company_objective(NewCompanyObjective {
                    name: "Grow".into(),
                    start_date: date(1),
                    end_date: date(12),
                    achievement: 0,
                })?;
                let half = repo.insert_company_key_result(company_kr(objective.id, 5.0, 10.0))?;
                repo.insert_company_key_result(company_kr(objective.id, 20.0, 20.0))?;
                engine.recompute(repo, KeyResultRef::Company(half.id))
            })
            .unwrap();
        assert_eq!(result.key_result_achievement, 50);
        assert_eq!(result.objective_achievement, 75);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let store = MemoryStore::new();
        let engine = AggregationEngine::new();
        let key = store
            .transaction(|repo| {
                let objective = repo.insert_company_objective(NewCompanyObjective {
                    name: "Grow".into(),
                    start_date: date(1),
                    end_date: date(12),
                    achievement: 0,
                })?;
                let kr = repo.insert_company_key_result(company_kr(objective.id, 3.0, 4.0))?;
                Ok(KeyResultRef::Company(kr.id))
            })
            .unwrap();

        let first = store.transaction(|repo| engine.recompute(repo, key)).unwrap();
        let second = store.transaction(|repo| engine.recompute(repo, key)).unwrap();
        assert_eq!(first.writes, 2);
        assert_eq!(second.writes, 0);
        assert_eq!(first.objective_achievement, second.objective_achievement);
        assert_eq!(second.key_result_achievement, 75);
    }

    #[test]
    fn test_company_objective_ignores_business_unit_key_results() {
        let store = MemoryStore::new();
        let engine = AggregationEngine::new();
        let company_objective = store
            .transaction(|repo| {
                let objective = repo.insert_company_objective(NewCompanyObjective {
                    name: "Grow".into(),
                    start_date: date(1),
                    end_date: date(12),
                    achievement: 0,
                })?;
                let company = repo.insert_company_key_result(company_kr(objective.id, 0.0, 10.0))?;
                let unit = repo.insert_business_unit(NewBusinessUnit { name: "Ops".into() })?;
                let bu_objective = repo.insert_business_unit_objective(NewBusinessUnitObjective {
                    business_unit_id: unit.id,
                    name: "Ship".into(),
                    start_date: date(1),
                    end_date: date(6),
                    achievement: 0,
                })?;
                let bu_kr = repo.insert_business_unit_key_result(NewBusinessUnitKeyResult {
                    business_unit_objective_id: bu_objective.id,
                    name: "Releases".into(),
                    current_value: 10.0,
                    goal_value: 10.0,
                    confidence_level: 90.0,
                    achievement: 0,
                    comment: String::new(),
                    timestamp: Utc::now(),
                })?;
                repo.set_company_key_result_ref(bu_kr.id, Some(company.id))?;
                let bu = engine.recompute(repo, KeyResultRef::BusinessUnit(bu_kr.id))?;
                assert_eq!(bu.objective_achievement, 100);
                engine.recompute_company_objective(repo, objective.id)
            })
            .unwrap();
        assert_eq!(company_objective, 0);
    }

    #[test]
    fn test_missing_key_result() {
        let store = MemoryStore::new();
        let err = store
            .transaction(|repo| AggregationEngine::new().recompute(repo, KeyResultRef::BusinessUnit(7)))
            .unwrap_err();
        assert!(matches!(err, OkrError::NotFound { id: 7, .. }));
    }
}
