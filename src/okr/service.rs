//! Transactional entry points used by the HTTP layer.
//!
//! Every mutation runs in a single store transaction: lock the objective, lock the
//! key result, record history, write, recompute. A failure anywhere rolls it all back.

use chrono::Utc;
use log::info;

use super::achievement::achievement;
use super::aggregation::AggregationEngine;
use super::error::{OkrError, OkrResult};
use super::history::{ensure_key_result, HistoryLedger, HistoryPage};
use super::model::{
    BusinessUnit, BusinessUnitInput, BusinessUnitKeyResult, BusinessUnitObjective,
    CompanyKeyResult, CompanyObjective, EntityKind, KeyResultInput, KeyResultRef,
    KeyResultUpdate, KeyResultValues, NewBusinessUnit, NewBusinessUnitKeyResult,
    NewBusinessUnitObjective, NewCompanyKeyResult, NewCompanyObjective, NewOkrUser,
    ObjectiveInput, ObjectiveUpdate, OkrUser, OkrUserInput, Privilege, Role,
};
use super::reference::{KeyResultReferenceManager, ReferenceOutcome};
use super::store::{HistoryOrder, HistoryQuery, OkrRepository, OkrStore, PageRequest};

/// What a cascading delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub objectives: usize,
    pub key_results: usize,
    pub history_rows: i64,
    pub detached_references: usize,
    pub unassigned_users: i64,
}

impl CascadeSummary {
    fn absorb(&mut self, other: CascadeSummary) {
        self.objectives += other.objectives;
        self.key_results += other.key_results;
        self.history_rows += other.history_rows;
        self.detached_references += other.detached_references;
        self.unassigned_users += other.unassigned_users;
    }
}

#[derive(Debug, Clone)]
pub struct RoleDetail {
    pub role: Role,
    pub users: Vec<OkrUser>,
    pub privileges: Vec<Privilege>,
}

pub struct OkrService<S: OkrStore> {
    store: S,
    ledger: HistoryLedger,
    engine: AggregationEngine,
    references: KeyResultReferenceManager,
}

fn reject_client_achievement(achievement: Option<f64>) -> OkrResult<()> {
    match achievement {
        Some(value) if value != 0.0 => Err(OkrError::validation(
            "achievement is derived from key results and cannot be set",
        )),
        _ => Ok(()),
    }
}

fn check_assignments(repo: &mut dyn OkrRepository, input: &OkrUserInput) -> OkrResult<()> {
    if let Some(role_id) = input.role_id {
        if repo.role(role_id)?.is_none() {
            return Err(OkrError::not_found(EntityKind::Role, role_id));
        }
    }
    if let Some(unit_id) = input.business_unit_id {
        if repo.business_unit(unit_id)?.is_none() {
            return Err(OkrError::not_found(EntityKind::BusinessUnit, unit_id));
        }
    }
    Ok(())
}

fn check_dates(start: chrono::NaiveDate, end: chrono::NaiveDate) -> OkrResult<()> {
    if start > end {
        return Err(OkrError::validation(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(())
}

impl<S: OkrStore> OkrService<S> {
    pub fn new(store: S, default_history_order: HistoryOrder) -> Self {
        let engine = AggregationEngine::new();
        Self {
            store,
            ledger: HistoryLedger::new(default_history_order),
            engine,
            references: KeyResultReferenceManager::new(engine),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history_query(&self, page: PageRequest, order: Option<HistoryOrder>) -> HistoryQuery {
        self.ledger.query(page, order)
    }

    // Company objectives

    pub fn create_company_objective(&self, input: ObjectiveInput) -> OkrResult<CompanyObjective> {
        reject_client_achievement(input.achievement)?;
        check_dates(input.start_date, input.end_date)?;
        let objective = self.store.transaction(|repo| {
            repo.insert_company_objective(NewCompanyObjective {
                name: input.name,
                start_date: input.start_date,
                end_date: input.end_date,
                achievement: 0,
            })
        })?;
        info!("Created CompanyObjective {} '{}'", objective.id, objective.name);
        Ok(objective)
    }

    pub fn company_objective(&self, id: i64) -> OkrResult<CompanyObjective> {
        self.store.transaction(|repo| {
            repo.company_objective(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, id))
        })
    }

    pub fn company_objectives(&self, page: PageRequest) -> OkrResult<Vec<CompanyObjective>> {
        self.store.transaction(|repo| repo.company_objectives(&page))
    }

    pub fn update_company_objective(&self, id: i64, update: ObjectiveUpdate) -> OkrResult<CompanyObjective> {
        self.store.transaction(|repo| {
            let mut objective = repo
                .lock_company_objective(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, id))?;
            if let Some(name) = update.name {
                objective.name = name;
            }
            objective.start_date = update.start_date.unwrap_or(objective.start_date);
            objective.end_date = update.end_date.unwrap_or(objective.end_date);
            check_dates(objective.start_date, objective.end_date)?;
            repo.update_company_objective(&objective)?;
            info!("Updated CompanyObjective {}", id);
            Ok(objective)
        })
    }

    pub fn delete_company_objective(&self, id: i64) -> OkrResult<CascadeSummary> {
        let summary = self.store.transaction(|repo| {
            repo.lock_company_objective(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, id))?;
            let mut summary = CascadeSummary {
                objectives: 1,
                ..CascadeSummary::default()
            };
            for key_result in repo.company_key_results_by_objective(id)? {
                summary.absorb(self.remove_company_key_result(repo, key_result.id)?);
            }
            repo.delete_company_objective(id)?;
            Ok(summary)
        })?;
        info!("Deleted CompanyObjective {}: {:?}", id, summary);
        Ok(summary)
    }

    // Company key results

    pub fn create_company_key_result(&self, objective_id: i64, input: KeyResultInput) -> OkrResult<CompanyKeyResult> {
        reject_client_achievement(input.achievement)?;
        let derived = achievement(input.current_value, input.goal_value)?;
        let key_result = self.store.transaction(|repo| {
            repo.lock_company_objective(objective_id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, objective_id))?;
            let key_result = repo.insert_company_key_result(NewCompanyKeyResult {
                company_objective_id: objective_id,
                name: input.name,
                current_value: input.current_value,
                goal_value: input.goal_value,
                confidence_level: input.confidence_level,
                achievement: derived,
                comment: input.comment,
                timestamp: Utc::now(),
            })?;
            self.engine.recompute_company_objective(repo, objective_id)?;
            Ok(key_result)
        })?;
        info!(
            "Created CompanyKeyResult {} under CompanyObjective {} at {}%",
            key_result.id, objective_id, key_result.achievement
        );
        Ok(key_result)
    }

    pub fn company_key_result(&self, id: i64) -> OkrResult<CompanyKeyResult> {
        self.store.transaction(|repo| {
            repo.company_key_result(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyKeyResult, id))
        })
    }

    pub fn company_key_results(&self, objective_id: i64) -> OkrResult<Vec<CompanyKeyResult>> {
        self.store.transaction(|repo| {
            if repo.company_objective(objective_id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::CompanyObjective, objective_id));
            }
            repo.company_key_results_by_objective(objective_id)
        })
    }

    pub fn update_company_key_result(&self, id: i64, update: KeyResultUpdate) -> OkrResult<CompanyKeyResult> {
        self.store.transaction(|repo| {
            let missing = || OkrError::not_found(EntityKind::CompanyKeyResult, id);
            let owner = repo.company_key_result(id)?.ok_or_else(missing)?.company_objective_id;
            repo.lock_company_objective(owner)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyObjective, owner))?;
            let mut key_result = repo.lock_company_key_result(id)?.ok_or_else(missing)?;

            let prior = key_result.snapshot();
            key_result.apply(&update, Utc::now());
            key_result.achievement = achievement(key_result.current_value, key_result.goal_value)?;

            self.ledger.record(repo, KeyResultRef::Company(id), &prior)?;
            repo.update_company_key_result(&key_result)?;
            let recomputed = self.engine.recompute(repo, KeyResultRef::Company(id))?;
            info!(
                "Updated CompanyKeyResult {}: {}% (objective {} at {}%)",
                id, key_result.achievement, owner, recomputed.objective_achievement
            );
            Ok(key_result)
        })
    }

    pub fn delete_company_key_result(&self, id: i64) -> OkrResult<CascadeSummary> {
        let summary = self.store.transaction(|repo| {
            let owner = repo
                .company_key_result(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::CompanyKeyResult, id))?
                .company_objective_id;
            repo.lock_company_objective(owner)?;
            let summary = self.remove_company_key_result(repo, id)?;
            self.engine.recompute_company_objective(repo, owner)?;
            Ok(summary)
        })?;
        info!("Deleted CompanyKeyResult {}: {:?}", id, summary);
        Ok(summary)
    }

    pub fn company_key_result_history(&self, id: i64, query: HistoryQuery) -> OkrResult<HistoryPage> {
        self.store
            .transaction(|repo| self.ledger.list(repo, KeyResultRef::Company(id), &query))
    }

    pub fn referencing_key_results(&self, company_key_result_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        self.store
            .transaction(|repo| self.references.referencing(repo, company_key_result_id))
    }

    fn remove_company_key_result(&self, repo: &mut dyn OkrRepository, id: i64) -> OkrResult<CascadeSummary> {
        repo.lock_company_key_result(id)?
            .ok_or_else(|| OkrError::not_found(EntityKind::CompanyKeyResult, id))?;
        let detached = self.references.detach_all(repo, id)?;
        let history_rows = self.ledger.purge(repo, KeyResultRef::Company(id))?;
        repo.delete_company_key_result(id)?;
        Ok(CascadeSummary {
            key_results: 1,
            history_rows,
            detached_references: detached.len(),
            ..CascadeSummary::default()
        })
    }

    // Business units

    pub fn create_business_unit(&self, input: BusinessUnitInput) -> OkrResult<BusinessUnit> {
        let unit = self
            .store
            .transaction(|repo| repo.insert_business_unit(NewBusinessUnit { name: input.name }))?;
        info!("Created BusinessUnit {} '{}'", unit.id, unit.name);
        Ok(unit)
    }

    pub fn business_unit(&self, id: i64) -> OkrResult<BusinessUnit> {
        self.store.transaction(|repo| {
            repo.business_unit(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnit, id))
        })
    }

    pub fn business_units(&self, page: PageRequest) -> OkrResult<Vec<BusinessUnit>> {
        self.store.transaction(|repo| repo.business_units(&page))
    }

    pub fn update_business_unit(&self, id: i64, input: BusinessUnitInput) -> OkrResult<BusinessUnit> {
        self.store.transaction(|repo| {
            let mut unit = repo
                .business_unit(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnit, id))?;
            unit.name = input.name;
            repo.update_business_unit(&unit)?;
            Ok(unit)
        })
    }

    pub fn delete_business_unit(&self, id: i64) -> OkrResult<CascadeSummary> {
        let summary = self.store.transaction(|repo| {
            if repo.business_unit(id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnit, id));
            }
            let mut summary = CascadeSummary::default();
            for objective in repo.business_unit_objectives_by_unit(id)? {
                summary.absorb(self.remove_business_unit_objective(repo, objective.id)?);
            }
            summary.unassigned_users = repo.unassign_business_unit(id)?;
            repo.delete_business_unit(id)?;
            Ok(summary)
        })?;
        info!("Deleted BusinessUnit {}: {:?}", id, summary);
        Ok(summary)
    }

    pub fn users_of_business_unit(&self, id: i64) -> OkrResult<Vec<OkrUser>> {
        self.store.transaction(|repo| {
            if repo.business_unit(id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnit, id));
            }
            repo.users_of_business_unit(id)
        })
    }

    // Business unit objectives

    pub fn create_business_unit_objective(&self, business_unit_id: i64, input: ObjectiveInput) -> OkrResult<BusinessUnitObjective> {
        reject_client_achievement(input.achievement)?;
        check_dates(input.start_date, input.end_date)?;
        let objective = self.store.transaction(|repo| {
            if repo.business_unit(business_unit_id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnit, business_unit_id));
            }
            repo.insert_business_unit_objective(NewBusinessUnitObjective {
                business_unit_id,
                name: input.name,
                start_date: input.start_date,
                end_date: input.end_date,
                achievement: 0,
            })
        })?;
        info!(
            "Created BusinessUnitObjective {} under BusinessUnit {}",
            objective.id, business_unit_id
        );
        Ok(objective)
    }

    pub fn business_unit_objective(&self, id: i64) -> OkrResult<BusinessUnitObjective> {
        self.store.transaction(|repo| {
            repo.business_unit_objective(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, id))
        })
    }

    pub fn business_unit_objectives(&self, business_unit_id: i64) -> OkrResult<Vec<BusinessUnitObjective>> {
        self.store.transaction(|repo| {
            if repo.business_unit(business_unit_id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnit, business_unit_id));
            }
            repo.business_unit_objectives_by_unit(business_unit_id)
        })
    }

    pub fn update_business_unit_objective(&self, id: i64, update: ObjectiveUpdate) -> OkrResult<BusinessUnitObjective> {
        self.store.transaction(|repo| {
            let mut objective = repo
                .lock_business_unit_objective(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, id))?;
            if let Some(name) = update.name {
                objective.name = name;
            }
            objective.start_date = update.start_date.unwrap_or(objective.start_date);
            objective.end_date = update.end_date.unwrap_or(objective.end_date);
            check_dates(objective.start_date, objective.end_date)?;
            repo.update_business_unit_objective(&objective)?;
            info!("Updated BusinessUnitObjective {}", id);
            Ok(objective)
        })
    }

    pub fn delete_business_unit_objective(&self, id: i64) -> OkrResult<CascadeSummary> {
        let summary = self.store.transaction(|repo| {
            if repo.business_unit_objective(id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnitObjective, id));
            }
            self.remove_business_unit_objective(repo, id)
        })?;
        info!("Deleted BusinessUnitObjective {}: {:?}", id, summary);
        Ok(summary)
    }

    fn remove_business_unit_objective(&self, repo: &mut dyn OkrRepository, id: i64) -> OkrResult<CascadeSummary> {
        repo.lock_business_unit_objective(id)?;
        let mut summary = CascadeSummary {
            objectives: 1,
            ..CascadeSummary::default()
        };
        for key_result in repo.business_unit_key_results_by_objective(id)? {
            summary.absorb(self.remove_business_unit_key_result(repo, key_result.id)?);
        }
        repo.delete_business_unit_objective(id)?;
        Ok(summary)
    }

    // Business unit key results

    pub fn create_business_unit_key_result(&self, objective_id: i64, input: KeyResultInput) -> OkrResult<BusinessUnitKeyResult> {
        reject_client_achievement(input.achievement)?;
        let derived = achievement(input.current_value, input.goal_value)?;
        let key_result = self.store.transaction(|repo| {
            repo.lock_business_unit_objective(objective_id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, objective_id))?;
            let key_result = repo.insert_business_unit_key_result(NewBusinessUnitKeyResult {
                business_unit_objective_id: objective_id,
                name: input.name,
                current_value: input.current_value,
                goal_value: input.goal_value,
                confidence_level: input.confidence_level,
                achievement: derived,
                comment: input.comment,
                timestamp: Utc::now(),
            })?;
            self.engine.recompute_business_unit_objective(repo, objective_id)?;
            Ok(key_result)
        })?;
        info!(
            "Created BusinessUnitKeyResult {} under BusinessUnitObjective {} at {}%",
            key_result.id, objective_id, key_result.achievement
        );
        Ok(key_result)
    }

    pub fn business_unit_key_result(&self, id: i64) -> OkrResult<BusinessUnitKeyResult> {
        self.store.transaction(|repo| {
            repo.business_unit_key_result(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitKeyResult, id))
        })
    }

    pub fn all_business_unit_key_results(&self, page: PageRequest) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        self.store.transaction(|repo| repo.business_unit_key_results(&page))
    }

    pub fn business_unit_key_results(&self, objective_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        self.store.transaction(|repo| {
            if repo.business_unit_objective(objective_id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::BusinessUnitObjective, objective_id));
            }
            repo.business_unit_key_results_by_objective(objective_id)
        })
    }

    pub fn update_business_unit_key_result(&self, id: i64, update: KeyResultUpdate) -> OkrResult<BusinessUnitKeyResult> {
        self.store.transaction(|repo| {
            let missing = || OkrError::not_found(EntityKind::BusinessUnitKeyResult, id);
            let owner = repo
                .business_unit_key_result(id)?
                .ok_or_else(missing)?
                .business_unit_objective_id;
            repo.lock_business_unit_objective(owner)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitObjective, owner))?;
            let mut key_result = repo.lock_business_unit_key_result(id)?.ok_or_else(missing)?;

            let prior = key_result.snapshot();
            key_result.apply(&update, Utc::now());
            key_result.achievement = achievement(key_result.current_value, key_result.goal_value)?;

            self.ledger.record(repo, KeyResultRef::BusinessUnit(id), &prior)?;
            repo.update_business_unit_key_result(&key_result)?;
            let recomputed = self.engine.recompute(repo, KeyResultRef::BusinessUnit(id))?;
            info!(
                "Updated BusinessUnitKeyResult {}: {}% (objective {} at {}%)",
                id, key_result.achievement, owner, recomputed.objective_achievement
            );
            Ok(key_result)
        })
    }

    pub fn delete_business_unit_key_result(&self, id: i64) -> OkrResult<CascadeSummary> {
        let summary = self.store.transaction(|repo| {
            let owner = repo
                .business_unit_key_result(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::BusinessUnitKeyResult, id))?
                .business_unit_objective_id;
            repo.lock_business_unit_objective(owner)?;
            let summary = self.remove_business_unit_key_result(repo, id)?;
            self.engine.recompute_business_unit_objective(repo, owner)?;
            Ok(summary)
        })?;
        info!("Deleted BusinessUnitKeyResult {}: {:?}", id, summary);
        Ok(summary)
    }

    pub fn business_unit_key_result_history(&self, id: i64, query: HistoryQuery) -> OkrResult<HistoryPage> {
        self.store
            .transaction(|repo| self.ledger.list(repo, KeyResultRef::BusinessUnit(id), &query))
    }

    pub fn reference(&self, key_result_id: i64, company_key_result_id: i64) -> OkrResult<ReferenceOutcome> {
        self.store.transaction(|repo| {
            self.references
                .reference(repo, key_result_id, company_key_result_id)
        })
    }

    pub fn dereference(&self, key_result_id: i64) -> OkrResult<Option<i64>> {
        self.store
            .transaction(|repo| self.references.dereference(repo, key_result_id))
    }

    fn remove_business_unit_key_result(&self, repo: &mut dyn OkrRepository, id: i64) -> OkrResult<CascadeSummary> {
        let key = KeyResultRef::BusinessUnit(id);
        ensure_key_result(repo, key)?;
        repo.lock_business_unit_key_result(id)?;
        let history_rows = self.ledger.purge(repo, key)?;
        repo.delete_business_unit_key_result(id)?;
        Ok(CascadeSummary {
            key_results: 1,
            history_rows,
            ..CascadeSummary::default()
        })
    }

    // Access

    pub fn roles(&self) -> OkrResult<Vec<Role>> {
        self.store.transaction(|repo| repo.roles())
    }

    pub fn role_details(&self) -> OkrResult<Vec<RoleDetail>> {
        self.store.transaction(|repo| {
            let mut details = Vec::new();
            for role in repo.roles()? {
                details.push(RoleDetail {
                    users: repo.users_of_role(role.id)?,
                    privileges: repo.privileges_of_role(role.id)?,
                    role,
                });
            }
            Ok(details)
        })
    }

    pub fn role(&self, id: i64) -> OkrResult<RoleDetail> {
        self.store.transaction(|repo| {
            let role = repo
                .role(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::Role, id))?;
            Ok(RoleDetail {
                users: repo.users_of_role(id)?,
                privileges: repo.privileges_of_role(id)?,
                role,
            })
        })
    }

    pub fn privileges(&self) -> OkrResult<Vec<Privilege>> {
        self.store.transaction(|repo| repo.privileges())
    }

    pub fn privilege(&self, id: i64) -> OkrResult<Privilege> {
        self.store.transaction(|repo| {
            repo.privilege(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::Privilege, id))
        })
    }

    pub fn okr_users(&self, page: PageRequest) -> OkrResult<Vec<OkrUser>> {
        self.store.transaction(|repo| repo.okr_users(&page))
    }

    pub fn okr_user(&self, id: i64) -> OkrResult<OkrUser> {
        self.store.transaction(|repo| {
            repo.okr_user(id)?
                .ok_or_else(|| OkrError::not_found(EntityKind::OkrUser, id))
        })
    }

    pub fn create_okr_user(&self, input: OkrUserInput) -> OkrResult<OkrUser> {
        let user = self.store.transaction(|repo| {
            check_assignments(repo, &input)?;
            repo.insert_okr_user(NewOkrUser {
                username: input.username,
                name: input.name,
                surname: input.surname,
                role_id: input.role_id,
                business_unit_id: input.business_unit_id,
            })
        })?;
        info!("Created OkrUser {} '{}'", user.id, user.username);
        Ok(user)
    }

    /// Full replacement: an absent role or business unit clears the assignment.
    pub fn update_okr_user(&self, id: i64, input: OkrUserInput) -> OkrResult<OkrUser> {
        let user = self.store.transaction(|repo| {
            if repo.okr_user(id)?.is_none() {
                return Err(OkrError::not_found(EntityKind::OkrUser, id));
            }
            check_assignments(repo, &input)?;
            let user = OkrUser {
                id,
                username: input.username,
                name: input.name,
                surname: input.surname,
                role_id: input.role_id,
                business_unit_id: input.business_unit_id,
            };
            repo.update_okr_user(&user)?;
            Ok(user)
        })?;
        info!("Updated OkrUser {} '{}'", user.id, user.username);
        Ok(user)
    }

    pub fn delete_okr_user(&self, id: i64) -> OkrResult<()> {
        self.store.transaction(|repo| {
            if !repo.delete_okr_user(id)? {
                return Err(OkrError::not_found(EntityKind::OkrUser, id));
            }
            Ok(())
        })?;
        info!("Deleted OkrUser {}", id);
        Ok(())
    }
}
