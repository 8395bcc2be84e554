#[cfg(test)]
mod pg_store_integration_tests {
    use chrono::{NaiveDate, Utc};
    use okrserver::core::shared::{create_pool, run_migrations};
    use okrserver::okr::model::{
        KeyResultRef, KeyResultSnapshot, NewBusinessUnit, NewBusinessUnitKeyResult,
        NewBusinessUnitObjective, NewCompanyKeyResult, NewCompanyObjective, NewOkrUser, OkrUser,
    };
    use okrserver::okr::store::{HistoryQuery, PageRequest};
    use okrserver::okr::{OkrError, OkrStore, PgStore};

    const ROLLBACK: &str = "rollback test data";

    fn store() -> Option<PgStore> {
        let url = match std::env::var("OKR_TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping test - OKR_TEST_DATABASE_URL not set");
                return None;
            }
        };
        let pool = match create_pool(&url, 2) {
            Ok(pool) => pool,
            Err(e) => {
                println!("Skipping test - cannot connect to Postgres: {}", e);
                return None;
            }
        };
        if let Err(e) = run_migrations(&pool) {
            println!("Skipping test - migrations failed: {}", e);
            return None;
        }
        Some(PgStore::new(pool))
    }

    fn rolled_back<T: std::fmt::Debug>(result: Result<T, OkrError>) {
        match result {
            Err(OkrError::Validation(message)) if message == ROLLBACK => {}
            other => panic!("expected the test transaction to roll back, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_column_and_history_round_trip() {
        let Some(store) = store() else { return };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        rolled_back(store.transaction(|repo| -> Result<(), OkrError> {
            let objective = repo.insert_company_objective(NewCompanyObjective {
                name: "pg objective".into(),
                start_date: date,
                end_date: date,
                achievement: 0,
            })?;
            let company = repo.insert_company_key_result(NewCompanyKeyResult {
                company_objective_id: objective.id,
                name: "pg company kr".into(),
                current_value: 0.0,
                goal_value: 10.0,
                confidence_level: 50.0,
                achievement: 0,
                comment: String::new(),
                timestamp: Utc::now(),
            })?;
            let unit = repo.insert_business_unit(NewBusinessUnit {
                name: "pg unit".into(),
            })?;
            let bu_objective = repo.insert_business_unit_objective(NewBusinessUnitObjective {
                business_unit_id: unit.id,
                name: "pg bu objective".into(),
                start_date: date,
                end_date: date,
                achievement: 0,
            })?;
            let kr = repo.insert_business_unit_key_result(NewBusinessUnitKeyResult {
                business_unit_objective_id: bu_objective.id,
                name: "pg bu kr".into(),
                current_value: 1.0,
                goal_value: 2.0,
                confidence_level: 50.0,
                achievement: 50,
                comment: String::new(),
                timestamp: Utc::now(),
            })?;

            let listed = repo.business_unit_key_results(&PageRequest::new(0, i64::MAX))?;
            assert!(listed.iter().any(|k| k.id == kr.id));
            assert!(listed.windows(2).all(|w| w[0].id < w[1].id));

            repo.set_company_key_result_ref(kr.id, Some(company.id))?;
            let referencing = repo.business_unit_key_results_by_company_key_result(company.id)?;
            assert_eq!(referencing.len(), 1);
            assert_eq!(referencing[0].company_key_result_ref, Some(company.id));

            let key = KeyResultRef::BusinessUnit(kr.id);
            let snapshot = KeyResultSnapshot {
                current_value: 1.0,
                goal_value: 2.0,
                confidence_level: 50.0,
                achievement: 50,
                comment: "before".into(),
                timestamp: kr.timestamp,
            };
            let entry = repo.append_history(key, &snapshot)?;
            assert_eq!(entry.snapshot, snapshot);
            assert_eq!(repo.count_history(key)?, 1);
            assert_eq!(repo.history(key, &HistoryQuery::default())?, vec![entry]);

            assert!(repo.delete_company_key_result(company.id)?);
            let detached = repo.business_unit_key_result(kr.id)?.unwrap();
            assert_eq!(detached.company_key_result_ref, None);

            Err(OkrError::validation(ROLLBACK))
        }));
    }

    #[test]
    fn test_update_of_missing_row_is_a_consistency_error() {
        let Some(store) = store() else { return };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        rolled_back(store.transaction(|repo| -> Result<(), OkrError> {
            let mut objective = repo.insert_company_objective(NewCompanyObjective {
                name: "pg vanishing".into(),
                start_date: date,
                end_date: date,
                achievement: 0,
            })?;
            assert!(repo.delete_company_objective(objective.id)?);
            objective.name = "renamed".into();
            assert!(matches!(
                repo.update_company_objective(&objective),
                Err(OkrError::Consistency(_))
            ));
            Err(OkrError::validation(ROLLBACK))
        }));
    }

    #[test]
    fn test_user_update_replaces_fields_and_keeps_usernames_unique() {
        let Some(store) = store() else { return };

        rolled_back(store.transaction(|repo| -> Result<(), OkrError> {
            let mut new_user = |username: &str| {
                repo.insert_okr_user(NewOkrUser {
                    username: username.into(),
                    name: "Pg".into(),
                    surname: "User".into(),
                    role_id: None,
                    business_unit_id: None,
                })
            };
            let first = new_user("pg-first-user")?;
            let second = new_user("pg-second-user")?;

            let renamed = OkrUser {
                surname: "Renamed".into(),
                ..first.clone()
            };
            repo.update_okr_user(&renamed)?;
            assert_eq!(repo.okr_user(first.id)?, Some(renamed));

            // The unique violation aborts the transaction, so it goes last.
            let clash = OkrUser {
                username: first.username.clone(),
                ..second
            };
            assert!(matches!(
                repo.update_okr_user(&clash),
                Err(OkrError::Validation(_))
            ));
            Err(OkrError::validation(ROLLBACK))
        }));
    }
}
