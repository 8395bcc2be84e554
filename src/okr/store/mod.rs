//! Persistence seam of the OKR core.
//!
//! Everything the core writes goes through [`OkrStore::transaction`], which hands
//! the closure an [`OkrRepository`] and commits only when the closure returns `Ok`.
//! A history row and the value write it precedes therefore land together or not
//! at all.

pub mod memory;
pub mod postgres;

use serde::{Deserialize, Serialize};

use super::error::OkrResult;
use super::model::{
    BusinessUnit, BusinessUnitKeyResult, BusinessUnitObjective, CompanyKeyResult,
    CompanyObjective, HistoryEntry, KeyResultRef, KeyResultSnapshot, NewBusinessUnit,
    NewBusinessUnitKeyResult, NewBusinessUnitObjective, NewCompanyKeyResult,
    NewCompanyObjective, NewOkrUser, OkrUser, Privilege, Role,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Self {
        Self {
            page: page.max(0),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryQuery {
    pub page: PageRequest,
    pub order: HistoryOrder,
}

/// Row-level access used inside a transaction.
///
/// `lock_*` reads take a write lock on the row for the rest of the transaction.
/// Writers lock the objective before any of its key results.
pub trait OkrRepository {
    fn insert_company_objective(&mut self, new: NewCompanyObjective) -> OkrResult<CompanyObjective>;
    fn company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>>;
    fn lock_company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>>;
    fn company_objectives(&mut self, page: &PageRequest) -> OkrResult<Vec<CompanyObjective>>;
    fn update_company_objective(&mut self, objective: &CompanyObjective) -> OkrResult<()>;
    fn delete_company_objective(&mut self, id: i64) -> OkrResult<bool>;

    fn insert_company_key_result(&mut self, new: NewCompanyKeyResult) -> OkrResult<CompanyKeyResult>;
    fn company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>>;
    fn lock_company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>>;
    fn company_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<CompanyKeyResult>>;
    fn update_company_key_result(&mut self, key_result: &CompanyKeyResult) -> OkrResult<()>;
    fn delete_company_key_result(&mut self, id: i64) -> OkrResult<bool>;

    fn insert_business_unit(&mut self, new: NewBusinessUnit) -> OkrResult<BusinessUnit>;
    fn business_unit(&mut self, id: i64) -> OkrResult<Option<BusinessUnit>>;
    fn business_units(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnit>>;
    fn update_business_unit(&mut self, unit: &BusinessUnit) -> OkrResult<()>;
    fn delete_business_unit(&mut self, id: i64) -> OkrResult<bool>;

    fn insert_business_unit_objective(&mut self, new: NewBusinessUnitObjective) -> OkrResult<BusinessUnitObjective>;
    fn business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>>;
    fn lock_business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>>;
    fn business_unit_objectives_by_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<BusinessUnitObjective>>;
    fn update_business_unit_objective(&mut self, objective: &BusinessUnitObjective) -> OkrResult<()>;
    fn delete_business_unit_objective(&mut self, id: i64) -> OkrResult<bool>;

    fn insert_business_unit_key_result(&mut self, new: NewBusinessUnitKeyResult) -> OkrResult<BusinessUnitKeyResult>;
    fn business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>>;
    fn lock_business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>>;
    fn business_unit_key_results(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnitKeyResult>>;
    fn business_unit_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>>;
    /// Reverse lookup of the cross-level reference, served by an index keyed on the company key result.
    fn business_unit_key_results_by_company_key_result(&mut self, company_key_result_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>>;
    /// Writes the measurable fields only; the company reference is untouched.
    fn update_business_unit_key_result(&mut self, key_result: &BusinessUnitKeyResult) -> OkrResult<()>;
    /// Replaces the single reference column in one write.
    fn set_company_key_result_ref(&mut self, id: i64, company_key_result_id: Option<i64>) -> OkrResult<()>;
    fn delete_business_unit_key_result(&mut self, id: i64) -> OkrResult<bool>;

    fn append_history(&mut self, key_result: KeyResultRef, snapshot: &KeyResultSnapshot) -> OkrResult<HistoryEntry>;
    fn history(&mut self, key_result: KeyResultRef, query: &HistoryQuery) -> OkrResult<Vec<HistoryEntry>>;
    fn count_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64>;
    fn delete_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64>;

    fn roles(&mut self) -> OkrResult<Vec<Role>>;
    fn role(&mut self, id: i64) -> OkrResult<Option<Role>>;
    fn privileges(&mut self) -> OkrResult<Vec<Privilege>>;
    fn privilege(&mut self, id: i64) -> OkrResult<Option<Privilege>>;
    fn privileges_of_role(&mut self, role_id: i64) -> OkrResult<Vec<Privilege>>;

    fn insert_okr_user(&mut self, new: NewOkrUser) -> OkrResult<OkrUser>;
    fn okr_user(&mut self, id: i64) -> OkrResult<Option<OkrUser>>;
    fn okr_users(&mut self, page: &PageRequest) -> OkrResult<Vec<OkrUser>>;
    fn update_okr_user(&mut self, user: &OkrUser) -> OkrResult<()>;
    fn users_of_role(&mut self, role_id: i64) -> OkrResult<Vec<OkrUser>>;
    fn users_of_business_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<OkrUser>>;
    fn unassign_business_unit(&mut self, business_unit_id: i64) -> OkrResult<i64>;
    fn delete_okr_user(&mut self, id: i64) -> OkrResult<bool>;
}

pub trait OkrStore: Send + Sync {
    /// Runs `f` atomically. Any `Err` rolls back every write `f` made.
    fn transaction<T, F>(&self, f: F) -> OkrResult<T>
    where
        F: FnOnce(&mut dyn OkrRepository) -> OkrResult<T>;
}

/// The store selected at startup.
pub enum Store {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl Store {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

impl OkrStore for Store {
    fn transaction<T, F>(&self, f: F) -> OkrResult<T>
    where
        F: FnOnce(&mut dyn OkrRepository) -> OkrResult<T>,
    {
        match self {
            Self::Memory(store) => store.transaction(f),
            Self::Postgres(store) => store.transaction(f),
        }
    }
}
