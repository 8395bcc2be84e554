//! Request checks that run before a handler touches the store.
//!
//! `goal_value` is not checked here; a non-positive goal surfaces as
//! `InvalidGoal` from the achievement calculation.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::okr::error::{OkrError, OkrResult};
use crate::okr::model::{
    BusinessUnitInput, KeyResultInput, KeyResultUpdate, ObjectiveInput, ObjectiveUpdate,
    OkrUserInput,
};

/// Names are stored in `VARCHAR(255)` columns.
pub const MAX_NAME_LEN: usize = 255;

pub trait Validate {
    fn validate(&self) -> OkrResult<()>;
}

/// A JSON body that has been parsed and validated.
///
/// Unparseable bodies and missing fields are reported like any other
/// validation failure instead of as axum's plain-text rejection.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = OkrError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| OkrError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

pub fn positive_id(id: i64) -> OkrResult<i64> {
    if id > 0 {
        Ok(id)
    } else {
        Err(OkrError::validation(format!("id must be a positive integer, got {id}")))
    }
}

fn non_blank(field: &str, value: &str) -> OkrResult<()> {
    if value.trim().is_empty() {
        return Err(OkrError::validation(format!("{field} must not be blank")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(OkrError::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn confidence(value: f64) -> OkrResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(OkrError::validation(format!(
            "confidenceLevel must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

fn finite(field: &str, value: f64) -> OkrResult<()> {
    if !value.is_finite() {
        return Err(OkrError::validation(format!("{field} must be a finite number")));
    }
    Ok(())
}

impl Validate for ObjectiveInput {
    fn validate(&self) -> OkrResult<()> {
        non_blank("name", &self.name)?;
        if self.start_date > self.end_date {
            return Err(OkrError::validation("startDate must not be after endDate"));
        }
        Ok(())
    }
}

impl Validate for ObjectiveUpdate {
    fn validate(&self) -> OkrResult<()> {
        if let Some(name) = &self.name {
            non_blank("name", name)?;
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(OkrError::validation("startDate must not be after endDate"));
            }
        }
        Ok(())
    }
}

impl Validate for KeyResultInput {
    fn validate(&self) -> OkrResult<()> {
        non_blank("name", &self.name)?;
        finite("currentValue", self.current_value)?;
        confidence(self.confidence_level)
    }
}

impl Validate for KeyResultUpdate {
    fn validate(&self) -> OkrResult<()> {
        if let Some(name) = &self.name {
            non_blank("name", name)?;
        }
        if let Some(current) = self.current_value {
            finite("currentValue", current)?;
        }
        if let Some(level) = self.confidence_level {
            confidence(level)?;
        }
        Ok(())
    }
}

impl Validate for BusinessUnitInput {
    fn validate(&self) -> OkrResult<()> {
        non_blank("name", &self.name)
    }
}

impl Validate for OkrUserInput {
    fn validate(&self) -> OkrResult<()> {
        non_blank("username", &self.username)?;
        non_blank("name", &self.name)?;
        non_blank("surname", &self.surname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_positive_id() {
        assert_eq!(positive_id(3).unwrap(), 3);
        assert!(positive_id(0).is_err());
        assert!(positive_id(-7).is_err());
    }

    #[test]
    fn test_key_result_input() {
        let mut input = KeyResultInput {
            name: "Revenue".into(),
            current_value: 0.0,
            goal_value: 0.0,
            confidence_level: 100.0,
            comment: String::new(),
            achievement: None,
        };
        assert!(input.validate().is_ok(), "goal is left to the calculator");
        input.confidence_level = 101.0;
        assert!(input.validate().is_err());
        input.confidence_level = 10.0;
        input.name = "   ".into();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_objective_dates() {
        let input = ObjectiveInput {
            name: "Ship".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            achievement: None,
        };
        assert!(matches!(input.validate(), Err(OkrError::Validation(_))));
        assert!(ObjectiveUpdate::default().validate().is_ok());
    }

    #[test]
    fn test_names_fit_their_columns() {
        let mut user = OkrUserInput {
            username: "u".repeat(MAX_NAME_LEN),
            name: "Ana".into(),
            surname: "é".repeat(MAX_NAME_LEN),
            role_id: None,
            business_unit_id: None,
        };
        assert!(user.validate().is_ok(), "the limit counts characters, not bytes");
        user.username.push('u');
        assert!(matches!(user.validate(), Err(OkrError::Validation(_))));

        let unit = BusinessUnitInput {
            name: "x".repeat(300),
        };
        assert!(unit.validate().is_err());
        let update = KeyResultUpdate {
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
            ..KeyResultUpdate::default()
        };
        assert!(update.validate().is_err());
    }
}
