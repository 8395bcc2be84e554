use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::shared::schema::{
    business_unit_key_results, business_unit_objectives, business_units,
    company_key_results, company_objectives, okr_users, privileges, roles,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    CompanyObjective,
    CompanyKeyResult,
    BusinessUnit,
    BusinessUnitObjective,
    BusinessUnitKeyResult,
    Role,
    Privilege,
    OkrUser,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanyObjective => "CompanyObjective",
            Self::CompanyKeyResult => "CompanyKeyResult",
            Self::BusinessUnit => "BusinessUnit",
            Self::BusinessUnitObjective => "BusinessUnitObjective",
            Self::BusinessUnitKeyResult => "BusinessUnitKeyResult",
            Self::Role => "Role",
            Self::Privilege => "Privilege",
            Self::OkrUser => "OkrUser",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses a key result of either level. History and recomputation are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyResultRef {
    Company(i64),
    BusinessUnit(i64),
}

impl KeyResultRef {
    pub fn id(&self) -> i64 {
        match self {
            Self::Company(id) | Self::BusinessUnit(id) => *id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Company(_) => EntityKind::CompanyKeyResult,
            Self::BusinessUnit(_) => EntityKind::BusinessUnitKeyResult,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = company_objectives)]
#[serde(rename_all = "camelCase")]
pub struct CompanyObjective {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub achievement: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = company_objectives)]
pub struct NewCompanyObjective {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub achievement: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = company_key_results)]
#[serde(rename_all = "camelCase")]
pub struct CompanyKeyResult {
    pub id: i64,
    pub company_objective_id: i64,
    pub name: String,
    pub current_value: f64,
    pub goal_value: f64,
    pub confidence_level: f64,
    pub achievement: i32,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = company_key_results)]
pub struct NewCompanyKeyResult {
    pub company_objective_id: i64,
    pub name: String,
    pub current_value: f64,
    pub goal_value: f64,
    pub confidence_level: f64,
    pub achievement: i32,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = business_units)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnit {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = business_units)]
pub struct NewBusinessUnit {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = business_unit_objectives)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnitObjective {
    pub id: i64,
    pub business_unit_id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub achievement: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = business_unit_objectives)]
pub struct NewBusinessUnitObjective {
    pub business_unit_id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub achievement: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = business_unit_key_results)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnitKeyResult {
    pub id: i64,
    pub business_unit_objective_id: i64,
    pub company_key_result_ref: Option<i64>,
    pub name: String,
    pub current_value: f64,
    pub goal_value: f64,
    pub confidence_level: f64,
    pub achievement: i32,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = business_unit_key_results)]
pub struct NewBusinessUnitKeyResult {
    pub business_unit_objective_id: i64,
    pub name: String,
    pub current_value: f64,
    pub goal_value: f64,
    pub confidence_level: f64,
    pub achievement: i32,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

/// Key result state captured by a history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultSnapshot {
    pub current_value: f64,
    pub goal_value: f64,
    pub confidence_level: f64,
    pub achievement: i32,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub key_result_id: i64,
    #[serde(flatten)]
    pub snapshot: KeyResultSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = privileges)]
pub struct Privilege {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = okr_users)]
#[serde(rename_all = "camelCase")]
pub struct OkrUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub role_id: Option<i64>,
    pub business_unit_id: Option<i64>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = okr_users)]
pub struct NewOkrUser {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub role_id: Option<i64>,
    pub business_unit_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Only accepted when absent or zero; the value is always derived.
    #[serde(default)]
    pub achievement: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveUpdate {
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultInput {
    pub name: String,
    #[serde(default)]
    pub current_value: f64,
    pub goal_value: f64,
    #[serde(default)]
    pub confidence_level: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub achievement: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResultUpdate {
    pub name: Option<String>,
    pub current_value: Option<f64>,
    pub goal_value: Option<f64>,
    pub confidence_level: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnitInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkrUserInput {
    pub username: String,
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub role_id: Option<i64>,
    #[serde(default)]
    pub business_unit_id: Option<i64>,
}

/// Shared view over the measurable fields of both key result kinds.
pub trait KeyResultValues {
    fn snapshot(&self) -> KeyResultSnapshot;

    fn current_and_goal(&self) -> (f64, f64);

    fn apply(&mut self, update: &KeyResultUpdate, now: DateTime<Utc>);
}

macro_rules! impl_key_result_values {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl KeyResultValues for $ty {
                fn snapshot(&self) -> KeyResultSnapshot {
                    KeyResultSnapshot {
                        current_value: self.current_value,
                        goal_value: self.goal_value,
                        confidence_level: self.confidence_level,
                        achievement: self.achievement,
                        comment: self.comment.clone(),
                        timestamp: self.timestamp,
                    }
                }

                fn current_and_goal(&self) -> (f64, f64) {
                    (self.current_value, self.goal_value)
                }

                fn apply(&mut self, update: &KeyResultUpdate, now: DateTime<Utc>) {
                    if let Some(name) = &update.name {
                        self.name = name.clone();
                    }
                    if let Some(current_value) = update.current_value {
                        self.current_value = current_value;
                    }
                    if let Some(goal_value) = update.goal_value {
                        self.goal_value = goal_value;
                    }
                    if let Some(confidence_level) = update.confidence_level {
                        self.confidence_level = confidence_level;
                    }
                    if let Some(comment) = &update.comment {
                        self.comment = comment.clone();
                    }
                    self.timestamp = now;
                }
            }
        )+
    };
}

impl_key_result_values!(CompanyKeyResult, BusinessUnitKeyResult);
