//! In-process store used when no database is configured and by the test suite.
//!
//! A transaction reads the committed tables in place until its first write, which
//! copies them. The copy is swapped in on success, so a failed closure leaves
//! nothing behind. The mutex serializes transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{HistoryOrder, HistoryQuery, OkrRepository, OkrStore, PageRequest};
use crate::okr::error::{OkrError, OkrResult};
use crate::okr::model::{
    BusinessUnit, BusinessUnitKeyResult, BusinessUnitObjective, CompanyKeyResult,
    CompanyObjective, HistoryEntry, KeyResultRef, KeyResultSnapshot, NewBusinessUnit,
    NewBusinessUnitKeyResult, NewBusinessUnitObjective, NewCompanyKeyResult,
    NewCompanyObjective, NewOkrUser, OkrUser, Privilege, Role,
};
use crate::okr::visibility::{ACCESS_PRIVILEGES, VIEW_USERS};

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    next_id: i64,
    company_objectives: BTreeMap<i64, CompanyObjective>,
    company_key_results: BTreeMap<i64, CompanyKeyResult>,
    company_history: BTreeMap<i64, Vec<HistoryEntry>>,
    business_units: BTreeMap<i64, BusinessUnit>,
    business_unit_objectives: BTreeMap<i64, BusinessUnitObjective>,
    business_unit_key_results: BTreeMap<i64, BusinessUnitKeyResult>,
    business_unit_history: BTreeMap<i64, Vec<HistoryEntry>>,
    // company key result id -> business unit key results referencing it
    references: BTreeMap<i64, BTreeSet<i64>>,
    roles: BTreeMap<i64, Role>,
    privileges: BTreeMap<i64, Privilege>,
    role_privileges: BTreeMap<i64, BTreeSet<i64>>,
    okr_users: BTreeMap<i64, OkrUser>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    /// A store holding the same roles and privileges the schema migration seeds.
    pub fn new() -> Self {
        let mut tables = MemoryTables::default();
        let view_users = tables.add_privilege(VIEW_USERS);
        let access_privileges = tables.add_privilege(ACCESS_PRIVILEGES);
        let admin = tables.add_role("admin");
        tables.add_role("user");
        tables.grant(admin, view_users);
        tables.grant(admin, access_privileges);
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl OkrStore for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> OkrResult<T>
    where
        F: FnOnce(&mut dyn OkrRepository) -> OkrResult<T>,
    {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| OkrError::Storage("memory store lock poisoned".to_string()))?;
        let mut tx = CopyOnWrite {
            committed: &mut *guard,
            working: None,
        };
        let value = f(&mut tx)?;
        let CopyOnWrite { working, .. } = tx;
        if let Some(working) = working {
            *guard = working;
        }
        Ok(value)
    }
}

/// Transaction view over the committed tables. Reads never go through `write`.
struct CopyOnWrite<'a> {
    committed: &'a mut MemoryTables,
    working: Option<MemoryTables>,
}

impl CopyOnWrite<'_> {
    fn read(&mut self) -> &mut MemoryTables {
        match &mut self.working {
            Some(working) => working,
            None => &mut *self.committed,
        }
    }

    fn write(&mut self) -> &mut MemoryTables {
        let committed = &*self.committed;
        self.working.get_or_insert_with(|| committed.clone())
    }
}

macro_rules! route {
    ($via:ident: $(fn $name:ident(&mut self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*) => {
        $(
            fn $name(&mut self $(, $arg: $ty)*) -> $ret {
                self.$via().$name($($arg),*)
            }
        )*
    };
}

impl OkrRepository for CopyOnWrite<'_> {
    route! { read:
        fn company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>>;
        fn lock_company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>>;
        fn company_objectives(&mut self, page: &PageRequest) -> OkrResult<Vec<CompanyObjective>>;
        fn company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>>;
        fn lock_company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>>;
        fn company_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<CompanyKeyResult>>;
        fn business_unit(&mut self, id: i64) -> OkrResult<Option<BusinessUnit>>;
        fn business_units(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnit>>;
        fn business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>>;
        fn lock_business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>>;
        fn business_unit_objectives_by_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<BusinessUnitObjective>>;
        fn business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>>;
        fn lock_business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>>;
        fn business_unit_key_results(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnitKeyResult>>;
        fn business_unit_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>>;
        fn business_unit_key_results_by_company_key_result(&mut self, company_key_result_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>>;
        fn history(&mut self, key_result: KeyResultRef, query: &HistoryQuery) -> OkrResult<Vec<HistoryEntry>>;
        fn count_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64>;
        fn roles(&mut self) -> OkrResult<Vec<Role>>;
        fn role(&mut self, id: i64) -> OkrResult<Option<Role>>;
        fn privileges(&mut self) -> OkrResult<Vec<Privilege>>;
        fn privilege(&mut self, id: i64) -> OkrResult<Option<Privilege>>;
        fn privileges_of_role(&mut self, role_id: i64) -> OkrResult<Vec<Privilege>>;
        fn okr_user(&mut self, id: i64) -> OkrResult<Option<OkrUser>>;
        fn okr_users(&mut self, page: &PageRequest) -> OkrResult<Vec<OkrUser>>;
        fn users_of_role(&mut self, role_id: i64) -> OkrResult<Vec<OkrUser>>;
        fn users_of_business_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<OkrUser>>;
    }

    route! { write:
        fn insert_company_objective(&mut self, new: NewCompanyObjective) -> OkrResult<CompanyObjective>;
        fn update_company_objective(&mut self, objective: &CompanyObjective) -> OkrResult<()>;
        fn delete_company_objective(&mut self, id: i64) -> OkrResult<bool>;
        fn insert_company_key_result(&mut self, new: NewCompanyKeyResult) -> OkrResult<CompanyKeyResult>;
        fn update_company_key_result(&mut self, key_result: &CompanyKeyResult) -> OkrResult<()>;
        fn delete_company_key_result(&mut self, id: i64) -> OkrResult<bool>;
        fn insert_business_unit(&mut self, new: NewBusinessUnit) -> OkrResult<BusinessUnit>;
        fn update_business_unit(&mut self, unit: &BusinessUnit) -> OkrResult<()>;
        fn delete_business_unit(&mut self, id: i64) -> OkrResult<bool>;
        fn insert_business_unit_objective(&mut self, new: NewBusinessUnitObjective) -> OkrResult<BusinessUnitObjective>;
        fn update_business_unit_objective(&mut self, objective: &BusinessUnitObjective) -> OkrResult<()>;
        fn delete_business_unit_objective(&mut self, id: i64) -> OkrResult<bool>;
        fn insert_business_unit_key_result(&mut self, new: NewBusinessUnitKeyResult) -> OkrResult<BusinessUnitKeyResult>;
        fn update_business_unit_key_result(&mut self, key_result: &BusinessUnitKeyResult) -> OkrResult<()>;
        fn set_company_key_result_ref(&mut self, id: i64, company_key_result_id: Option<i64>) -> OkrResult<()>;
        fn delete_business_unit_key_result(&mut self, id: i64) -> OkrResult<bool>;
        fn append_history(&mut self, key_result: KeyResultRef, snapshot: &KeyResultSnapshot) -> OkrResult<HistoryEntry>;
        fn delete_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64>;
        fn insert_okr_user(&mut self, new: NewOkrUser) -> OkrResult<OkrUser>;
        fn update_okr_user(&mut self, user: &OkrUser) -> OkrResult<()>;
        fn unassign_business_unit(&mut self, business_unit_id: i64) -> OkrResult<i64>;
        fn delete_okr_user(&mut self, id: i64) -> OkrResult<bool>;
    }
}

fn page_of<T: Clone>(items: impl Iterator<Item = T>, page: &PageRequest) -> Vec<T> {
    items
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.size).unwrap_or(0))
        .collect()
}

fn missing_row(kind: &str, id: i64) -> OkrError {
    OkrError::Consistency(format!("{kind} {id} vanished during the transaction"))
}

impl MemoryTables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_role(&mut self, name: &str) -> i64 {
        let id = self.next_id();
        self.roles.insert(
            id,
            Role {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    fn add_privilege(&mut self, name: &str) -> i64 {
        let id = self.next_id();
        self.privileges.insert(
            id,
            Privilege {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    fn grant(&mut self, role_id: i64, privilege_id: i64) {
        self.role_privileges
            .entry(role_id)
            .or_default()
            .insert(privilege_id);
    }

    fn ensure_username_free(&self, username: &str, owner: Option<i64>) -> OkrResult<()> {
        let taken = self
            .okr_users
            .values()
            .any(|u| u.username == username && Some(u.id) != owner);
        if taken {
            return Err(OkrError::validation(format!(
                "username '{username}' is already taken"
            )));
        }
        Ok(())
    }

    fn history_table(&mut self, key_result: KeyResultRef) -> &mut BTreeMap<i64, Vec<HistoryEntry>> {
        match key_result {
            KeyResultRef::Company(_) => &mut self.company_history,
            KeyResultRef::BusinessUnit(_) => &mut self.business_unit_history,
        }
    }

    fn unindex_reference(&mut self, key_result_id: i64, company_key_result_id: i64) -> OkrResult<()> {
        let removed = self
            .references
            .get_mut(&company_key_result_id)
            .map(|set| set.remove(&key_result_id))
            .unwrap_or(false);
        if !removed {
            return Err(OkrError::ReferenceConflict {
                key_result: key_result_id,
            });
        }
        if self
            .references
            .get(&company_key_result_id)
            .is_some_and(BTreeSet::is_empty)
        {
            self.references.remove(&company_key_result_id);
        }
        Ok(())
    }

    fn remove_business_unit_key_result(&mut self, id: i64) -> OkrResult<bool> {
        let Some(removed) = self.business_unit_key_results.remove(&id) else {
            return Ok(false);
        };
        if let Some(target) = removed.company_key_result_ref {
            self.unindex_reference(id, target)?;
        }
        self.business_unit_history.remove(&id);
        Ok(true)
    }

    fn remove_business_unit_objective(&mut self, id: i64) -> OkrResult<bool> {
        if self.business_unit_objectives.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = self
            .business_unit_key_results
            .values()
            .filter(|kr| kr.business_unit_objective_id == id)
            .map(|kr| kr.id)
            .collect();
        for key_result_id in owned {
            self.remove_business_unit_key_result(key_result_id)?;
        }
        Ok(true)
    }

    fn remove_company_key_result(&mut self, id: i64) -> OkrResult<bool> {
        if self.company_key_results.remove(&id).is_none() {
            return Ok(false);
        }
        self.company_history.remove(&id);
        for key_result_id in self.references.remove(&id).unwrap_or_default() {
            if let Some(kr) = self.business_unit_key_results.get_mut(&key_result_id) {
                kr.company_key_result_ref = None;
            }
        }
        Ok(true)
    }
}

impl OkrRepository for MemoryTables {
    fn insert_company_objective(&mut self, new: NewCompanyObjective) -> OkrResult<CompanyObjective> {
        let objective = CompanyObjective {
            id: self.next_id(),
            name: new.name,
            start_date: new.start_date,
            end_date: new.end_date,
            achievement: new.achievement,
        };
        self.company_objectives.insert(objective.id, objective.clone());
        Ok(objective)
    }

    fn company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>> {
        Ok(self.company_objectives.get(&id).cloned())
    }

    fn lock_company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>> {
        self.company_objective(id)
    }

    fn company_objectives(&mut self, page: &PageRequest) -> OkrResult<Vec<CompanyObjective>> {
        Ok(page_of(self.company_objectives.values().cloned(), page))
    }

    fn update_company_objective(&mut self, objective: &CompanyObjective) -> OkrResult<()> {
        let slot = self
            .company_objectives
            .get_mut(&objective.id)
            .ok_or_else(|| missing_row("CompanyObjective", objective.id))?;
        *slot = objective.clone();
        Ok(())
    }

    fn delete_company_objective(&mut self, id: i64) -> OkrResult<bool> {
        if self.company_objectives.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = self
            .company_key_results
            .values()
            .filter(|kr| kr.company_objective_id == id)
            .map(|kr| kr.id)
            .collect();
        for key_result_id in owned {
            self.remove_company_key_result(key_result_id)?;
        }
        Ok(true)
    }

    fn insert_company_key_result(&mut self, new: NewCompanyKeyResult) -> OkrResult<CompanyKeyResult> {
        if !self.company_objectives.contains_key(&new.company_objective_id) {
            return Err(missing_row("CompanyObjective", new.company_objective_id));
        }
        let key_result = CompanyKeyResult {
            id: self.next_id(),
            company_objective_id: new.company_objective_id,
            name: new.name,
            current_value: new.current_value,
            goal_value: new.goal_value,
            confidence_level: new.confidence_level,
            achievement: new.achievement,
            comment: new.comment,
            timestamp: new.timestamp,
        };
        self.company_key_results.insert(key_result.id, key_result.clone());
        Ok(key_result)
    }

    fn company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>> {
        Ok(self.company_key_results.get(&id).cloned())
    }

    fn lock_company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>> {
        self.company_key_result(id)
    }

    fn company_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<CompanyKeyResult>> {
        Ok(self
            .company_key_results
            .values()
            .filter(|kr| kr.company_objective_id == objective_id)
            .cloned()
            .collect())
    }

    fn update_company_key_result(&mut self, key_result: &CompanyKeyResult) -> OkrResult<()> {
        let slot = self
            .company_key_results
            .get_mut(&key_result.id)
            .ok_or_else(|| missing_row("CompanyKeyResult", key_result.id))?;
        *slot = key_result.clone();
        Ok(())
    }

    fn delete_company_key_result(&mut self, id: i64) -> OkrResult<bool> {
        self.remove_company_key_result(id)
    }

    fn insert_business_unit(&mut self, new: NewBusinessUnit) -> OkrResult<BusinessUnit> {
        let unit = BusinessUnit {
            id: self.next_id(),
            name: new.name,
        };
        self.business_units.insert(unit.id, unit.clone());
        Ok(unit)
    }

    fn business_unit(&mut self, id: i64) -> OkrResult<Option<BusinessUnit>> {
        Ok(self.business_units.get(&id).cloned())
    }

    fn business_units(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnit>> {
        Ok(page_of(self.business_units.values().cloned(), page))
    }

    fn update_business_unit(&mut self, unit: &BusinessUnit) -> OkrResult<()> {
        let slot = self
            .business_units
            .get_mut(&unit.id)
            .ok_or_else(|| missing_row("BusinessUnit", unit.id))?;
        *slot = unit.clone();
        Ok(())
    }

    fn delete_business_unit(&mut self, id: i64) -> OkrResult<bool> {
        if self.business_units.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = self
            .business_unit_objectives
            .values()
            .filter(|objective| objective.business_unit_id == id)
            .map(|objective| objective.id)
            .collect();
        for objective_id in owned {
            self.remove_business_unit_objective(objective_id)?;
        }
        self.unassign_business_unit(id)?;
        Ok(true)
    }

    fn insert_business_unit_objective(&mut self, new: NewBusinessUnitObjective) -> OkrResult<BusinessUnitObjective> {
        if !self.business_units.contains_key(&new.business_unit_id) {
            return Err(missing_row("BusinessUnit", new.business_unit_id));
        }
        let objective = BusinessUnitObjective {
            id: self.next_id(),
            business_unit_id: new.business_unit_id,
            name: new.name,
            start_date: new.start_date,
            end_date: new.end_date,
            achievement: new.achievement,
        };
        self.business_unit_objectives.insert(objective.id, objective.clone());
        Ok(objective)
    }

    fn business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>> {
        Ok(self.business_unit_objectives.get(&id).cloned())
    }

    fn lock_business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>> {
        self.business_unit_objective(id)
    }

    fn business_unit_objectives_by_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<BusinessUnitObjective>> {
        Ok(self
            .business_unit_objectives
            .values()
            .filter(|objective| objective.business_unit_id == business_unit_id)
            .cloned()
            .collect())
    }

    fn update_business_unit_objective(&mut self, objective: &BusinessUnitObjective) -> OkrResult<()> {
        let slot = self
            .business_unit_objectives
            .get_mut(&objective.id)
            .ok_or_else(|| missing_row("BusinessUnitObjective", objective.id))?;
        *slot = objective.clone();
        Ok(())
    }

    fn delete_business_unit_objective(&mut self, id: i64) -> OkrResult<bool> {
        self.remove_business_unit_objective(id)
    }

    fn insert_business_unit_key_result(&mut self, new: NewBusinessUnitKeyResult) -> OkrResult<BusinessUnitKeyResult> {
        if !self
            .business_unit_objectives
            .contains_key(&new.business_unit_objective_id)
        {
            return Err(missing_row("BusinessUnitObjective", new.business_unit_objective_id));
        }
        let key_result = BusinessUnitKeyResult {
            id: self.next_id(),
            business_unit_objective_id: new.business_unit_objective_id,
            company_key_result_ref: None,
            name: new.name,
            current_value: new.current_value,
            goal_value: new.goal_value,
            confidence_level: new.confidence_level,
            achievement: new.achievement,
            comment: new.comment,
            timestamp: new.timestamp,
        };
        self.business_unit_key_results.insert(key_result.id, key_result.clone());
        Ok(key_result)
    }

    fn business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>> {
        Ok(self.business_unit_key_results.get(&id).cloned())
    }

    fn lock_business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>> {
        self.business_unit_key_result(id)
    }

    fn business_unit_key_results(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        Ok(page_of(self.business_unit_key_results.values().cloned(), page))
    }

    fn business_unit_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        Ok(self
            .business_unit_key_results
            .values()
            .filter(|kr| kr.business_unit_objective_id == objective_id)
            .cloned()
            .collect())
    }

    fn business_unit_key_results_by_company_key_result(&mut self, company_key_result_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        let ids = self
            .references
            .get(&company_key_result_id)
            .cloned()
            .unwrap_or_default();
        ids.into_iter()
            .map(|id| {
                self.business_unit_key_results
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| missing_row("BusinessUnitKeyResult", id))
            })
            .collect()
    }

    fn update_business_unit_key_result(&mut self, key_result: &BusinessUnitKeyResult) -> OkrResult<()> {
        let slot = self
            .business_unit_key_results
            .get_mut(&key_result.id)
            .ok_or_else(|| missing_row("BusinessUnitKeyResult", key_result.id))?;
        let reference = slot.company_key_result_ref;
        *slot = key_result.clone();
        slot.company_key_result_ref = reference;
        Ok(())
    }

    fn set_company_key_result_ref(&mut self, id: i64, company_key_result_id: Option<i64>) -> OkrResult<()> {
        let current = self
            .business_unit_key_results
            .get(&id)
            .ok_or_else(|| missing_row("BusinessUnitKeyResult", id))?
            .company_key_result_ref;
        if current == company_key_result_id {
            return Ok(());
        }
        if let Some(previous) = current {
            self.unindex_reference(id, previous)?;
        }
        if let Some(target) = company_key_result_id {
            if !self.company_key_results.contains_key(&target) {
                return Err(missing_row("CompanyKeyResult", target));
            }
            if self.references.values().any(|set| set.contains(&id)) {
                return Err(OkrError::ReferenceConflict { key_result: id });
            }
            self.references.entry(target).or_default().insert(id);
        }
        if let Some(kr) = self.business_unit_key_results.get_mut(&id) {
            kr.company_key_result_ref = company_key_result_id;
        }
        Ok(())
    }

    fn delete_business_unit_key_result(&mut self, id: i64) -> OkrResult<bool> {
        self.remove_business_unit_key_result(id)
    }

    fn append_history(&mut self, key_result: KeyResultRef, snapshot: &KeyResultSnapshot) -> OkrResult<HistoryEntry> {
        let entry = HistoryEntry {
            id: self.next_id(),
            key_result_id: key_result.id(),
            snapshot: snapshot.clone(),
        };
        self.history_table(key_result)
            .entry(key_result.id())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    fn history(&mut self, key_result: KeyResultRef, query: &HistoryQuery) -> OkrResult<Vec<HistoryEntry>> {
        let mut rows = self
            .history_table(key_result)
            .get(&key_result.id())
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            a.snapshot
                .timestamp
                .cmp(&b.snapshot.timestamp)
                .then(a.id.cmp(&b.id))
        });
        if query.order == HistoryOrder::Desc {
            rows.reverse();
        }
        Ok(page_of(rows.into_iter(), &query.page))
    }

    fn count_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64> {
        let count = self
            .history_table(key_result)
            .get(&key_result.id())
            .map_or(0, Vec::len);
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    fn delete_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64> {
        let removed = self
            .history_table(key_result)
            .remove(&key_result.id())
            .map_or(0, |rows| rows.len());
        Ok(i64::try_from(removed).unwrap_or(i64::MAX))
    }

    fn roles(&mut self) -> OkrResult<Vec<Role>> {
        Ok(self.roles.values().cloned().collect())
    }

    fn role(&mut self, id: i64) -> OkrResult<Option<Role>> {
        Ok(self.roles.get(&id).cloned())
    }

    fn privileges(&mut self) -> OkrResult<Vec<Privilege>> {
        Ok(self.privileges.values().cloned().collect())
    }

    fn privilege(&mut self, id: i64) -> OkrResult<Option<Privilege>> {
        Ok(self.privileges.get(&id).cloned())
    }

    fn privileges_of_role(&mut self, role_id: i64) -> OkrResult<Vec<Privilege>> {
        Ok(self
            .role_privileges
            .get(&role_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.privileges.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_okr_user(&mut self, new: NewOkrUser) -> OkrResult<OkrUser> {
        self.ensure_username_free(&new.username, None)?;
        let user = OkrUser {
            id: self.next_id(),
            username: new.username,
            name: new.name,
            surname: new.surname,
            role_id: new.role_id,
            business_unit_id: new.business_unit_id,
        };
        self.okr_users.insert(user.id, user.clone());
        Ok(user)
    }

    fn okr_user(&mut self, id: i64) -> OkrResult<Option<OkrUser>> {
        Ok(self.okr_users.get(&id).cloned())
    }

    fn okr_users(&mut self, page: &PageRequest) -> OkrResult<Vec<OkrUser>> {
        Ok(page_of(self.okr_users.values().cloned(), page))
    }

    fn update_okr_user(&mut self, user: &OkrUser) -> OkrResult<()> {
        self.ensure_username_free(&user.username, Some(user.id))?;
        let slot = self
            .okr_users
            .get_mut(&user.id)
            .ok_or_else(|| missing_row("OkrUser", user.id))?;
        *slot = user.clone();
        Ok(())
    }

    fn users_of_role(&mut self, role_id: i64) -> OkrResult<Vec<OkrUser>> {
        Ok(self
            .okr_users
            .values()
            .filter(|u| u.role_id == Some(role_id))
            .cloned()
            .collect())
    }

    fn users_of_business_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<OkrUser>> {
        Ok(self
            .okr_users
            .values()
            .filter(|u| u.business_unit_id == Some(business_unit_id))
            .cloned()
            .collect())
    }

    fn unassign_business_unit(&mut self, business_unit_id: i64) -> OkrResult<i64> {
        let mut count = 0;
        for user in self.okr_users.values_mut() {
            if user.business_unit_id == Some(business_unit_id) {
                user.business_unit_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    fn delete_okr_user(&mut self, id: i64) -> OkrResult<bool> {
        Ok(self.okr_users.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_company_key_result(repo: &mut dyn OkrRepository) -> CompanyKeyResult {
        let objective = repo
            .insert_company_objective(NewCompanyObjective {
                name: "Grow".into(),
                start_date: date(2024, 1, 1),
                end_date: date(2024, 12, 31),
                achievement: 0,
            })
            .unwrap();
        repo.insert_company_key_result(NewCompanyKeyResult {
            company_objective_id: objective.id,
            name: "Revenue".into(),
            current_value: 0.0,
            goal_value: 100.0,
            confidence_level: 50.0,
            achievement: 0,
            comment: String::new(),
            timestamp: Utc::now(),
        })
        .unwrap()
    }

    fn seed_business_unit_key_result(repo: &mut dyn OkrRepository) -> BusinessUnitKeyResult {
        let unit = repo
            .insert_business_unit(NewBusinessUnit { name: "Sales".into() })
            .unwrap();
        let objective = repo
            .insert_business_unit_objective(NewBusinessUnitObjective {
                business_unit_id: unit.id,
                name: "Close deals".into(),
                start_date: date(2024, 1, 1),
                end_date: date(2024, 6, 30),
                achievement: 0,
            })
            .unwrap();
        repo.insert_business_unit_key_result(NewBusinessUnitKeyResult {
            business_unit_objective_id: objective.id,
            name: "Deals".into(),
            current_value: 0.0,
            goal_value: 10.0,
            confidence_level: 80.0,
            achievement: 0,
            comment: String::new(),
            timestamp: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = MemoryStore::new();
        let result: OkrResult<()> = store.transaction(|repo| {
            seed_company_key_result(repo);
            Err(OkrError::validation("abort"))
        });
        assert!(result.is_err());
        let objectives = store
            .transaction(|repo| repo.company_objectives(&PageRequest::default()))
            .unwrap();
        assert!(objectives.is_empty());
    }

    #[test]
    fn test_seeded_roles_and_privileges() {
        let store = MemoryStore::new();
        let (roles, admin_privileges) = store
            .transaction(|repo| {
                let roles = repo.roles()?;
                let admin = roles.iter().find(|r| r.name == "admin").unwrap().id;
                Ok((roles, repo.privileges_of_role(admin)?))
            })
            .unwrap();
        assert_eq!(roles.len(), 2);
        let names: Vec<_> = admin_privileges.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![VIEW_USERS, ACCESS_PRIVILEGES]);
    }

    #[test]
    fn test_reference_index_follows_column() {
        let store = MemoryStore::new();
        store
            .transaction(|repo| {
                let first = seed_company_key_result(repo);
                let second = seed_company_key_result(repo);
                let bu_kr = seed_business_unit_key_result(repo);

                repo.set_company_key_result_ref(bu_kr.id, Some(first.id))?;
                repo.set_company_key_result_ref(bu_kr.id, Some(second.id))?;

                assert!(repo
                    .business_unit_key_results_by_company_key_result(first.id)?
                    .is_empty());
                let referencing = repo.business_unit_key_results_by_company_key_result(second.id)?;
                assert_eq!(referencing.len(), 1);
                assert_eq!(referencing[0].company_key_result_ref, Some(second.id));

                repo.delete_company_key_result(second.id)?;
                let detached = repo.business_unit_key_result(bu_kr.id)?.unwrap();
                assert_eq!(detached.company_key_result_ref, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_update_keeps_reference_column() {
        let store = MemoryStore::new();
        store
            .transaction(|repo| {
                let company = seed_company_key_result(repo);
                let bu_kr = seed_business_unit_key_result(repo);
                repo.set_company_key_result_ref(bu_kr.id, Some(company.id))?;

                let mut stale = bu_kr.clone();
                stale.current_value = 5.0;
                repo.update_business_unit_key_result(&stale)?;

                let stored = repo.business_unit_key_result(bu_kr.id)?.unwrap();
                assert_eq!(stored.current_value, 5.0);
                assert_eq!(stored.company_key_result_ref, Some(company.id));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_history_orders_by_timestamp_then_id() {
        let store = MemoryStore::new();
        store
            .transaction(|repo| {
                let kr = seed_business_unit_key_result(repo);
                let key = KeyResultRef::BusinessUnit(kr.id);
                let later = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
                let earlier = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
                let mut snapshot = kr_snapshot(later);
                repo.append_history(key, &snapshot)?;
                snapshot.timestamp = earlier;
                repo.append_history(key, &snapshot)?;

                let asc = repo.history(key, &HistoryQuery::default())?;
                assert_eq!(asc[0].snapshot.timestamp, earlier);
                let desc = repo.history(
                    key,
                    &HistoryQuery {
                        page: PageRequest::default(),
                        order: HistoryOrder::Desc,
                    },
                )?;
                assert_eq!(desc[0].snapshot.timestamp, later);
                assert_eq!(repo.count_history(key)?, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reads_do_not_copy_tables() {
        let mut tables = MemoryStore::new().tables.into_inner().unwrap();
        let mut tx = CopyOnWrite {
            committed: &mut tables,
            working: None,
        };
        assert_eq!(tx.roles().unwrap().len(), 2);
        assert!(tx.company_objectives(&PageRequest::default()).unwrap().is_empty());
        assert!(tx.working.is_none());

        let kr = seed_company_key_result(&mut tx);
        assert!(tx.working.is_some());
        assert_eq!(tx.company_key_result(kr.id).unwrap(), Some(kr));
        assert!(tx.committed.company_key_results.is_empty());
    }

    #[test]
    fn test_update_user_keeps_usernames_unique() {
        let store = MemoryStore::new();
        let (alice, bob) = store
            .transaction(|repo| {
                let mut new_user = |username: &str| {
                    repo.insert_okr_user(NewOkrUser {
                        username: username.into(),
                        name: "N".into(),
                        surname: "S".into(),
                        role_id: None,
                        business_unit_id: None,
                    })
                };
                Ok((new_user("alice")?, new_user("bob")?))
            })
            .unwrap();

        let renamed = OkrUser {
            username: "alice".into(),
            ..bob.clone()
        };
        let clash = store.transaction(|repo| repo.update_okr_user(&renamed));
        assert!(matches!(clash, Err(OkrError::Validation(_))));

        let same_name = OkrUser {
            surname: "Changed".into(),
            ..alice.clone()
        };
        store.transaction(|repo| repo.update_okr_user(&same_name)).unwrap();
        let stored = store.transaction(|repo| repo.okr_user(alice.id)).unwrap();
        assert_eq!(stored.map(|u| u.surname), Some("Changed".to_string()));

        let ghost = OkrUser { id: 9_999, ..alice };
        assert!(store.transaction(|repo| repo.update_okr_user(&ghost)).is_err());
    }

    fn kr_snapshot(timestamp: chrono::DateTime<Utc>) -> KeyResultSnapshot {
        KeyResultSnapshot {
            current_value: 1.0,
            goal_value: 10.0,
            confidence_level: 50.0,
            achievement: 10,
            comment: "snapshot".into(),
            timestamp,
        }
    }
}
