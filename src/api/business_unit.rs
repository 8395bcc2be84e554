use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use log::debug;

use super::access::okr_user_resource;
use super::links::{Collection, LinkBuilder, Resource};
use super::validation::{positive_id, ValidJson};
use super::{base_path, blocking, HistoryParams, PageParams};
use crate::auth::CallerPrivileges;
use crate::core::shared::state::AppState;
use crate::okr::error::OkrResult;
use crate::okr::history::HistoryPage;
use crate::okr::model::{
    BusinessUnit, BusinessUnitInput, BusinessUnitKeyResult, BusinessUnitObjective, EntityKind,
    KeyResultInput, KeyResultUpdate, ObjectiveInput, ObjectiveUpdate, OkrUser,
};
use crate::okr::ReferenceOutcome;

pub(crate) fn business_unit_resource(
    state: &AppState,
    caller: &CallerPrivileges,
    unit: BusinessUnit,
) -> Resource<BusinessUnit> {
    let id = unit.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::BusinessUnit,
        &caller.privileges,
        format!("/businessUnits/{id}"),
    )
    .relation(
        "businessUnitObjectives",
        Some(format!("/businessUnits/{id}/businessUnitObjectives")),
    )
    .relation("okrUsers", Some(format!("/businessUnits/{id}/okrUsers")))
    .finish(unit)
}

pub(crate) fn business_unit_objective_resource(
    state: &AppState,
    caller: &CallerPrivileges,
    objective: BusinessUnitObjective,
) -> Resource<BusinessUnitObjective> {
    let id = objective.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::BusinessUnitObjective,
        &caller.privileges,
        format!("/businessUnitObjectives/{id}"),
    )
    .relation(
        "businessUnit",
        Some(format!("/businessUnits/{}", objective.business_unit_id)),
    )
    .relation(
        "businessUnitKeyResults",
        Some(format!("/businessUnitObjectives/{id}/businessUnitKeyResults")),
    )
    .finish(objective)
}

pub(crate) fn business_unit_key_result_resource(
    state: &AppState,
    caller: &CallerPrivileges,
    key_result: BusinessUnitKeyResult,
) -> Resource<BusinessUnitKeyResult> {
    let id = key_result.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::BusinessUnitKeyResult,
        &caller.privileges,
        format!("/businessUnitKeyResults/{id}"),
    )
    .relation(
        "businessUnitObjective",
        Some(format!(
            "/businessUnitObjectives/{}",
            key_result.business_unit_objective_id
        )),
    )
    .relation(
        "companyKeyResult",
        key_result
            .company_key_result_ref
            .map(|target| format!("/companyKeyResults/{target}")),
    )
    .relation("history", Some(format!("/businessUnitKeyResults/{id}/history")))
    .finish(key_result)
}

pub async fn list_business_units(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Query(params): Query<PageParams>,
) -> OkrResult<Json<Collection<BusinessUnit>>> {
    let page = params.resolve(&state);
    let okr = state.okr.clone();
    let units = blocking(move || okr.business_units(page)).await?;
    let items = units
        .into_iter()
        .map(|unit| business_unit_resource(&state, &caller, unit))
        .collect();
    Ok(Json(Collection::new(
        "businessUnits",
        format!("{}/businessUnits", base_path(&state)),
        items,
    )))
}

pub async fn create_business_unit(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    ValidJson(input): ValidJson<BusinessUnitInput>,
) -> OkrResult<(StatusCode, Json<Resource<BusinessUnit>>)> {
    let okr = state.okr.clone();
    let unit = blocking(move || okr.create_business_unit(input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(business_unit_resource(&state, &caller, unit)),
    ))
}

pub async fn get_business_unit(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<BusinessUnit>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let unit = blocking(move || okr.business_unit(id)).await?;
    Ok(Json(business_unit_resource(&state, &caller, unit)))
}

pub async fn update_business_unit(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<BusinessUnitInput>,
) -> OkrResult<Json<Resource<BusinessUnit>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let unit = blocking(move || okr.update_business_unit(id, input)).await?;
    Ok(Json(business_unit_resource(&state, &caller, unit)))
}

pub async fn delete_business_unit(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_business_unit(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_business_unit_users(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Collection<OkrUser>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let users = blocking(move || okr.users_of_business_unit(id)).await?;
    let items = users
        .into_iter()
        .map(|user| okr_user_resource(&state, &caller, user))
        .collect();
    Ok(Json(Collection::new(
        "okrUsers",
        format!("{}/businessUnits/{id}/okrUsers", base_path(&state)),
        items,
    )))
}

pub async fn list_business_unit_objectives(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Collection<BusinessUnitObjective>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objectives = blocking(move || okr.business_unit_objectives(id)).await?;
    let items = objectives
        .into_iter()
        .map(|objective| business_unit_objective_resource(&state, &caller, objective))
        .collect();
    Ok(Json(Collection::new(
        "businessUnitObjectives",
        format!("{}/businessUnits/{id}/businessUnitObjectives", base_path(&state)),
        items,
    )))
}

pub async fn create_business_unit_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<ObjectiveInput>,
) -> OkrResult<(StatusCode, Json<Resource<BusinessUnitObjective>>)> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objective = blocking(move || okr.create_business_unit_objective(id, input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(business_unit_objective_resource(&state, &caller, objective)),
    ))
}

pub async fn get_business_unit_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<BusinessUnitObjective>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objective = blocking(move || okr.business_unit_objective(id)).await?;
    Ok(Json(business_unit_objective_resource(&state, &caller, objective)))
}

pub async fn update_business_unit_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(update): ValidJson<ObjectiveUpdate>,
) -> OkrResult<Json<Resource<BusinessUnitObjective>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objective = blocking(move || okr.update_business_unit_objective(id, update)).await?;
    Ok(Json(business_unit_objective_resource(&state, &caller, objective)))
}

pub async fn delete_business_unit_objective(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_business_unit_objective(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_all_business_unit_key_results(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Query(params): Query<PageParams>,
) -> OkrResult<Json<Collection<BusinessUnitKeyResult>>> {
    let page = params.resolve(&state);
    let okr = state.okr.clone();
    let key_results = blocking(move || okr.all_business_unit_key_results(page)).await?;
    let items = key_results
        .into_iter()
        .map(|key_result| business_unit_key_result_resource(&state, &caller, key_result))
        .collect();
    Ok(Json(Collection::new(
        "businessUnitKeyResults",
        format!("{}/businessUnitKeyResults", base_path(&state)),
        items,
    )))
}

pub async fn list_business_unit_key_results(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Collection<BusinessUnitKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_results = blocking(move || okr.business_unit_key_results(id)).await?;
    let items = key_results
        .into_iter()
        .map(|key_result| business_unit_key_result_resource(&state, &caller, key_result))
        .collect();
    Ok(Json(Collection::new(
        "businessUnitKeyResults",
        format!(
            "{}/businessUnitObjectives/{id}/businessUnitKeyResults",
            base_path(&state)
        ),
        items,
    )))
}

pub async fn create_business_unit_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<KeyResultInput>,
) -> OkrResult<(StatusCode, Json<Resource<BusinessUnitKeyResult>>)> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.create_business_unit_key_result(id, input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(business_unit_key_result_resource(&state, &caller, key_result)),
    ))
}

pub async fn get_business_unit_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<BusinessUnitKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.business_unit_key_result(id)).await?;
    Ok(Json(business_unit_key_result_resource(&state, &caller, key_result)))
}

pub async fn update_business_unit_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(update): ValidJson<KeyResultUpdate>,
) -> OkrResult<Json<Resource<BusinessUnitKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.update_business_unit_key_result(id, update)).await?;
    Ok(Json(business_unit_key_result_resource(&state, &caller, key_result)))
}

pub async fn delete_business_unit_key_result(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_business_unit_key_result(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn business_unit_key_result_history(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> OkrResult<Json<HistoryPage>> {
    let id = positive_id(id)?;
    let query = params.resolve(&state);
    let okr = state.okr.clone();
    let page = blocking(move || okr.business_unit_key_result_history(id, query)).await?;
    Ok(Json(page))
}

pub async fn reference_company_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path((id, company_key_result_id)): Path<(i64, i64)>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let company_key_result_id = positive_id(company_key_result_id)?;
    let okr = state.okr.clone();
    let outcome = blocking(move || okr.reference(id, company_key_result_id)).await?;
    if outcome == ReferenceOutcome::Unchanged {
        debug!(
            "{} re-sent reference {} -> {}",
            caller.subject, id, company_key_result_id
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dereference_company_key_result(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.dereference(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
