use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::pg::Pg;
use diesel::PgConnection;

use super::{HistoryOrder, HistoryQuery, OkrRepository, OkrStore, PageRequest};
use crate::core::shared::schema::{
    business_unit_key_result_histories as bu_history, business_unit_key_results,
    business_unit_objectives, business_units, company_key_result_histories as company_history,
    company_key_results, company_objectives, okr_users, privileges, role_privileges, roles,
};
use crate::core::shared::utils::DbPool;
use crate::okr::error::{OkrError, OkrResult};
use crate::okr::model::{
    BusinessUnit, BusinessUnitKeyResult, BusinessUnitObjective, CompanyKeyResult,
    CompanyObjective, HistoryEntry, KeyResultRef, KeyResultSnapshot, NewBusinessUnit,
    NewBusinessUnitKeyResult, NewBusinessUnitObjective, NewCompanyKeyResult,
    NewCompanyObjective, NewOkrUser, OkrUser, Privilege, Role,
};

type HistoryRow = (i64, i64, f64, f64, f64, i32, String, DateTime<Utc>);

fn into_entry(row: HistoryRow) -> HistoryEntry {
    let (id, key_result_id, current_value, goal_value, confidence_level, achievement, comment, timestamp) = row;
    HistoryEntry {
        id,
        key_result_id,
        snapshot: KeyResultSnapshot {
            current_value,
            goal_value,
            confidence_level,
            achievement,
            comment,
            timestamp,
        },
    }
}

fn expect_one_row(affected: usize, table: &str, id: i64) -> OkrResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(OkrError::Consistency(format!(
            "update of {table} {id} touched {affected} rows"
        )))
    }
}

fn username_conflict(error: DieselError, username: &str) -> OkrError {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            OkrError::validation(format!("username '{username}' is already taken"))
        }
        other => other.into(),
    }
}

fn count(affected: usize) -> i64 {
    i64::try_from(affected).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl OkrStore for PgStore {
    fn transaction<T, F>(&self, f: F) -> OkrResult<T>
    where
        F: FnOnce(&mut dyn OkrRepository) -> OkrResult<T>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, OkrError, _>(|conn| {
            let mut repo = PgRepository { conn };
            f(&mut repo)
        })
    }
}

pub struct PgRepository<'a> {
    conn: &'a mut PgConnection,
}

impl OkrRepository for PgRepository<'_> {
    fn insert_company_objective(&mut self, new: NewCompanyObjective) -> OkrResult<CompanyObjective> {
        Ok(diesel::insert_into(company_objectives::table)
            .values(&new)
            .returning(CompanyObjective::as_returning())
            .get_result(self.conn)?)
    }

    fn company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>> {
        Ok(company_objectives::table
            .find(id)
            .select(CompanyObjective::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn lock_company_objective(&mut self, id: i64) -> OkrResult<Option<CompanyObjective>> {
        Ok(company_objectives::table
            .find(id)
            .select(CompanyObjective::as_select())
            .for_update()
            .first(self.conn)
            .optional()?)
    }

    fn company_objectives(&mut self, page: &PageRequest) -> OkrResult<Vec<CompanyObjective>> {
        Ok(company_objectives::table
            .select(CompanyObjective::as_select())
            .order(company_objectives::id.asc())
            .limit(page.size)
            .offset(page.offset())
            .load(self.conn)?)
    }

    fn update_company_objective(&mut self, objective: &CompanyObjective) -> OkrResult<()> {
        let affected = diesel::update(company_objectives::table.find(objective.id))
            .set((
                company_objectives::name.eq(&objective.name),
                company_objectives::start_date.eq(objective.start_date),
                company_objectives::end_date.eq(objective.end_date),
                company_objectives::achievement.eq(objective.achievement),
            ))
            .execute(self.conn)?;
        expect_one_row(affected, "company_objectives", objective.id)
    }

    fn delete_company_objective(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(company_objectives::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }

    fn insert_company_key_result(&mut self, new: NewCompanyKeyResult) -> OkrResult<CompanyKeyResult> {
        Ok(diesel::insert_into(company_key_results::table)
            .values(&new)
            .returning(CompanyKeyResult::as_returning())
            .get_result(self.conn)?)
    }

    fn company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>> {
        Ok(company_key_results::table
            .find(id)
            .select(CompanyKeyResult::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn lock_company_key_result(&mut self, id: i64) -> OkrResult<Option<CompanyKeyResult>> {
        Ok(company_key_results::table
            .find(id)
            .select(CompanyKeyResult::as_select())
            .for_update()
            .first(self.conn)
            .optional()?)
    }

    fn company_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<CompanyKeyResult>> {
        Ok(company_key_results::table
            .filter(company_key_results::company_objective_id.eq(objective_id))
            .select(CompanyKeyResult::as_select())
            .order(company_key_results::id.asc())
            .load(self.conn)?)
    }

    fn update_company_key_result(&mut self, key_result: &CompanyKeyResult) -> OkrResult<()> {
        let affected = diesel::update(company_key_results::table.find(key_result.id))
            .set((
                company_key_results::name.eq(&key_result.name),
                company_key_results::current_value.eq(key_result.current_value),
                company_key_results::goal_value.eq(key_result.goal_value),
                company_key_results::confidence_level.eq(key_result.confidence_level),
                company_key_results::achievement.eq(key_result.achievement),
                company_key_results::comment.eq(&key_result.comment),
                company_key_results::timestamp.eq(key_result.timestamp),
            ))
            .execute(self.conn)?;
        expect_one_row(affected, "company_key_results", key_result.id)
    }

    fn delete_company_key_result(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(company_key_results::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }

    fn insert_business_unit(&mut self, new: NewBusinessUnit) -> OkrResult<BusinessUnit> {
        Ok(diesel::insert_into(business_units::table)
            .values(&new)
            .returning(BusinessUnit::as_returning())
            .get_result(self.conn)?)
    }

    fn business_unit(&mut self, id: i64) -> OkrResult<Option<BusinessUnit>> {
        Ok(business_units::table
            .find(id)
            .select(BusinessUnit::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn business_units(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnit>> {
        Ok(business_units::table
            .select(BusinessUnit::as_select())
            .order(business_units::id.asc())
            .limit(page.size)
            .offset(page.offset())
            .load(self.conn)?)
    }

    fn update_business_unit(&mut self, unit: &BusinessUnit) -> OkrResult<()> {
        let affected = diesel::update(business_units::table.find(unit.id))
            .set(business_units::name.eq(&unit.name))
            .execute(self.conn)?;
        expect_one_row(affected, "business_units", unit.id)
    }

    fn delete_business_unit(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(business_units::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }

    fn insert_business_unit_objective(&mut self, new: NewBusinessUnitObjective) -> OkrResult<BusinessUnitObjective> {
        Ok(diesel::insert_into(business_unit_objectives::table)
            .values(&new)
            .returning(BusinessUnitObjective::as_returning())
            .get_result(self.conn)?)
    }

    fn business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>> {
        Ok(business_unit_objectives::table
            .find(id)
            .select(BusinessUnitObjective::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn lock_business_unit_objective(&mut self, id: i64) -> OkrResult<Option<BusinessUnitObjective>> {
        Ok(business_unit_objectives::table
            .find(id)
            .select(BusinessUnitObjective::as_select())
            .for_update()
            .first(self.conn)
            .optional()?)
    }

    fn business_unit_objectives_by_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<BusinessUnitObjective>> {
        Ok(business_unit_objectives::table
            .filter(business_unit_objectives::business_unit_id.eq(business_unit_id))
            .select(BusinessUnitObjective::as_select())
            .order(business_unit_objectives::id.asc())
            .load(self.conn)?)
    }

    fn update_business_unit_objective(&mut self, objective: &BusinessUnitObjective) -> OkrResult<()> {
        let affected = diesel::update(business_unit_objectives::table.find(objective.id))
            .set((
                business_unit_objectives::name.eq(&objective.name),
                business_unit_objectives::start_date.eq(objective.start_date),
                business_unit_objectives::end_date.eq(objective.end_date),
                business_unit_objectives::achievement.eq(objective.achievement),
            ))
            .execute(self.conn)?;
        expect_one_row(affected, "business_unit_objectives", objective.id)
    }

    fn delete_business_unit_objective(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(business_unit_objectives::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }

    fn insert_business_unit_key_result(&mut self, new: NewBusinessUnitKeyResult) -> OkrResult<BusinessUnitKeyResult> {
        Ok(diesel::insert_into(business_unit_key_results::table)
            .values(&new)
            .returning(BusinessUnitKeyResult::as_returning())
            .get_result(self.conn)?)
    }

    fn business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>> {
        Ok(business_unit_key_results::table
            .find(id)
            .select(BusinessUnitKeyResult::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn lock_business_unit_key_result(&mut self, id: i64) -> OkrResult<Option<BusinessUnitKeyResult>> {
        Ok(business_unit_key_results::table
            .find(id)
            .select(BusinessUnitKeyResult::as_select())
            .for_update()
            .first(self.conn)
            .optional()?)
    }

    fn business_unit_key_results(&mut self, page: &PageRequest) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        Ok(business_unit_key_results::table
            .select(BusinessUnitKeyResult::as_select())
            .order(business_unit_key_results::id.asc())
            .limit(page.size)
            .offset(page.offset())
            .load(self.conn)?)
    }

    fn business_unit_key_results_by_objective(&mut self, objective_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        Ok(business_unit_key_results::table
            .filter(business_unit_key_results::business_unit_objective_id.eq(objective_id))
            .select(BusinessUnitKeyResult::as_select())
            .order(business_unit_key_results::id.asc())
            .load(self.conn)?)
    }

    fn business_unit_key_results_by_company_key_result(&mut self, company_key_result_id: i64) -> OkrResult<Vec<BusinessUnitKeyResult>> {
        Ok(business_unit_key_results::table
            .filter(business_unit_key_results::company_key_result_ref.eq(company_key_result_id))
            .select(BusinessUnitKeyResult::as_select())
            .order(business_unit_key_results::id.asc())
            .load(self.conn)?)
    }

    fn update_business_unit_key_result(&mut self, key_result: &BusinessUnitKeyResult) -> OkrResult<()> {
        let affected = diesel::update(business_unit_key_results::table.find(key_result.id))
            .set((
                business_unit_key_results::name.eq(&key_result.name),
                business_unit_key_results::current_value.eq(key_result.current_value),
                business_unit_key_results::goal_value.eq(key_result.goal_value),
                business_unit_key_results::confidence_level.eq(key_result.confidence_level),
                business_unit_key_results::achievement.eq(key_result.achievement),
                business_unit_key_results::comment.eq(&key_result.comment),
                business_unit_key_results::timestamp.eq(key_result.timestamp),
            ))
            .execute(self.conn)?;
        expect_one_row(affected, "business_unit_key_results", key_result.id)
    }

    fn set_company_key_result_ref(&mut self, id: i64, company_key_result_id: Option<i64>) -> OkrResult<()> {
        let affected = diesel::update(business_unit_key_results::table.find(id))
            .set(business_unit_key_results::company_key_result_ref.eq(company_key_result_id))
            .execute(self.conn)?;
        expect_one_row(affected, "business_unit_key_results", id)
    }

    fn delete_business_unit_key_result(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(business_unit_key_results::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }

    fn append_history(&mut self, key_result: KeyResultRef, snapshot: &KeyResultSnapshot) -> OkrResult<HistoryEntry> {
        let row: HistoryRow = match key_result {
            KeyResultRef::Company(id) => diesel::insert_into(company_history::table)
                .values((
                    company_history::company_key_result_id.eq(id),
                    company_history::current_value.eq(snapshot.current_value),
                    company_history::goal_value.eq(snapshot.goal_value),
                    company_history::confidence_level.eq(snapshot.confidence_level),
                    company_history::achievement.eq(snapshot.achievement),
                    company_history::comment.eq(&snapshot.comment),
                    company_history::timestamp.eq(snapshot.timestamp),
                ))
                .returning((
                    company_history::id,
                    company_history::company_key_result_id,
                    company_history::current_value,
                    company_history::goal_value,
                    company_history::confidence_level,
                    company_history::achievement,
                    company_history::comment,
                    company_history::timestamp,
                ))
                .get_result(self.conn)?,
            KeyResultRef::BusinessUnit(id) => diesel::insert_into(bu_history::table)
                .values((
                    bu_history::business_unit_key_result_id.eq(id),
                    bu_history::current_value.eq(snapshot.current_value),
                    bu_history::goal_value.eq(snapshot.goal_value),
                    bu_history::confidence_level.eq(snapshot.confidence_level),
                    bu_history::achievement.eq(snapshot.achievement),
                    bu_history::comment.eq(&snapshot.comment),
                    bu_history::timestamp.eq(snapshot.timestamp),
                ))
                .returning((
                    bu_history::id,
                    bu_history::business_unit_key_result_id,
                    bu_history::current_value,
                    bu_history::goal_value,
                    bu_history::confidence_level,
                    bu_history::achievement,
                    bu_history::comment,
                    bu_history::timestamp,
                ))
                .get_result(self.conn)?,
        };
        Ok(into_entry(row))
    }

    fn history(&mut self, key_result: KeyResultRef, query: &HistoryQuery) -> OkrResult<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = match key_result {
            KeyResultRef::Company(id) => {
                let base = company_history::table
                    .filter(company_history::company_key_result_id.eq(id))
                    .select((
                        company_history::id,
                        company_history::company_key_result_id,
                        company_history::current_value,
                        company_history::goal_value,
                        company_history::confidence_level,
                        company_history::achievement,
                        company_history::comment,
                        company_history::timestamp,
                    ))
                    .into_boxed::<Pg>();
                let ordered = match query.order {
                    HistoryOrder::Asc => base.order((company_history::timestamp.asc(), company_history::id.asc())),
                    HistoryOrder::Desc => base.order((company_history::timestamp.desc(), company_history::id.desc())),
                };
                ordered
                    .limit(query.page.size)
                    .offset(query.page.offset())
                    .load(self.conn)?
            }
            KeyResultRef::BusinessUnit(id) => {
                let base = bu_history::table
                    .filter(bu_history::business_unit_key_result_id.eq(id))
                    .select((
                        bu_history::id,
                        bu_history::business_unit_key_result_id,
                        bu_history::current_value,
                        bu_history::goal_value,
                        bu_history::confidence_level,
                        bu_history::achievement,
                        bu_history::comment,
                        bu_history::timestamp,
                    ))
                    .into_boxed::<Pg>();
                let ordered = match query.order {
                    HistoryOrder::Asc => base.order((bu_history::timestamp.asc(), bu_history::id.asc())),
                    HistoryOrder::Desc => base.order((bu_history::timestamp.desc(), bu_history::id.desc())),
                };
                ordered
                    .limit(query.page.size)
                    .offset(query.page.offset())
                    .load(self.conn)?
            }
        };
        Ok(rows.into_iter().map(into_entry).collect())
    }

    fn count_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64> {
        let total = match key_result {
            KeyResultRef::Company(id) => company_history::table
                .filter(company_history::company_key_result_id.eq(id))
                .count()
                .get_result::<i64>(self.conn)?,
            KeyResultRef::BusinessUnit(id) => bu_history::table
                .filter(bu_history::business_unit_key_result_id.eq(id))
                .count()
                .get_result::<i64>(self.conn)?,
        };
        Ok(total)
    }

    fn delete_history(&mut self, key_result: KeyResultRef) -> OkrResult<i64> {
        let affected = match key_result {
            KeyResultRef::Company(id) => diesel::delete(
                company_history::table.filter(company_history::company_key_result_id.eq(id)),
            )
            .execute(self.conn)?,
            KeyResultRef::BusinessUnit(id) => diesel::delete(
                bu_history::table.filter(bu_history::business_unit_key_result_id.eq(id)),
            )
            .execute(self.conn)?,
        };
        Ok(count(affected))
    }

    fn roles(&mut self) -> OkrResult<Vec<Role>> {
        Ok(roles::table
            .select(Role::as_select())
            .order(roles::id.asc())
            .load(self.conn)?)
    }

    fn role(&mut self, id: i64) -> OkrResult<Option<Role>> {
        Ok(roles::table
            .find(id)
            .select(Role::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn privileges(&mut self) -> OkrResult<Vec<Privilege>> {
        Ok(privileges::table
            .select(Privilege::as_select())
            .order(privileges::id.asc())
            .load(self.conn)?)
    }

    fn privilege(&mut self, id: i64) -> OkrResult<Option<Privilege>> {
        Ok(privileges::table
            .find(id)
            .select(Privilege::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn privileges_of_role(&mut self, role_id: i64) -> OkrResult<Vec<Privilege>> {
        Ok(privileges::table
            .inner_join(role_privileges::table)
            .filter(role_privileges::role_id.eq(role_id))
            .select(Privilege::as_select())
            .order(privileges::id.asc())
            .load(self.conn)?)
    }

    fn insert_okr_user(&mut self, new: NewOkrUser) -> OkrResult<OkrUser> {
        diesel::insert_into(okr_users::table)
            .values(&new)
            .returning(OkrUser::as_returning())
            .get_result(self.conn)
            .map_err(|e| username_conflict(e, &new.username))
    }

    fn okr_user(&mut self, id: i64) -> OkrResult<Option<OkrUser>> {
        Ok(okr_users::table
            .find(id)
            .select(OkrUser::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn okr_users(&mut self, page: &PageRequest) -> OkrResult<Vec<OkrUser>> {
        Ok(okr_users::table
            .select(OkrUser::as_select())
            .order(okr_users::id.asc())
            .limit(page.size)
            .offset(page.offset())
            .load(self.conn)?)
    }

    fn update_okr_user(&mut self, user: &OkrUser) -> OkrResult<()> {
        let affected = diesel::update(okr_users::table.find(user.id))
            .set((
                okr_users::username.eq(&user.username),
                okr_users::name.eq(&user.name),
                okr_users::surname.eq(&user.surname),
                okr_users::role_id.eq(user.role_id),
                okr_users::business_unit_id.eq(user.business_unit_id),
            ))
            .execute(self.conn)
            .map_err(|e| username_conflict(e, &user.username))?;
        expect_one_row(affected, "okr_users", user.id)
    }

    fn users_of_role(&mut self, role_id: i64) -> OkrResult<Vec<OkrUser>> {
        Ok(okr_users::table
            .filter(okr_users::role_id.eq(role_id))
            .select(OkrUser::as_select())
            .order(okr_users::id.asc())
            .load(self.conn)?)
    }

    fn users_of_business_unit(&mut self, business_unit_id: i64) -> OkrResult<Vec<OkrUser>> {
        Ok(okr_users::table
            .filter(okr_users::business_unit_id.eq(business_unit_id))
            .select(OkrUser::as_select())
            .order(okr_users::id.asc())
            .load(self.conn)?)
    }

    fn unassign_business_unit(&mut self, business_unit_id: i64) -> OkrResult<i64> {
        let affected = diesel::update(
            okr_users::table.filter(okr_users::business_unit_id.eq(business_unit_id)),
        )
        .set(okr_users::business_unit_id.eq(None::<i64>))
        .execute(self.conn)?;
        Ok(count(affected))
    }

    fn delete_okr_user(&mut self, id: i64) -> OkrResult<bool> {
        let affected = diesel::delete(okr_users::table.find(id)).execute(self.conn)?;
        Ok(affected > 0)
    }
}
