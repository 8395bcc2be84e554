use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::business_unit::business_unit_key_result_resource;
use super::links::{Collection, LinkBuilder, Resource};
use super::validation::{positive_id, ValidJson};
use super::{base_path, blocking, HistoryParams, PageParams};
use crate::auth::CallerPrivileges;
use crate::core::shared::state::AppState;
use crate::okr::error::OkrResult;
use crate::okr::history::HistoryPage;
use crate::okr::model::{
    BusinessUnitKeyResult, CompanyKeyResult, CompanyObjective, EntityKind, KeyResultInput,
    KeyResultUpdate, ObjectiveInput, ObjectiveUpdate,
};

pub(crate) fn company_objective_resource(
    state: &AppState,
    caller: &CallerPrivileges,
    objective: CompanyObjective,
) -> Resource<CompanyObjective> {
    let id = objective.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::CompanyObjective,
        &caller.privileges,
        format!("/companyObjectives/{id}"),
    )
    .relation(
        "companyKeyResults",
        Some(format!("/companyObjectives/{id}/companyKeyResults")),
    )
    .finish(objective)
}

pub(crate) fn company_key_result_resource(
    state: &AppState,
    caller: &CallerPrivileges,
    key_result: CompanyKeyResult,
) -> Resource<CompanyKeyResult> {
    let id = key_result.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::CompanyKeyResult,
        &caller.privileges,
        format!("/companyKeyResults/{id}"),
    )
    .relation(
        "companyObjective",
        Some(format!("/companyObjectives/{}", key_result.company_objective_id)),
    )
    .relation(
        "businessUnitKeyResults",
        Some(format!("/companyKeyResults/{id}/businessUnitKeyResults")),
    )
    .relation("history", Some(format!("/companyKeyResults/{id}/history")))
    .finish(key_result)
}

pub async fn list_company_objectives(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Query(params): Query<PageParams>,
) -> OkrResult<Json<Collection<CompanyObjective>>> {
    let page = params.resolve(&state);
    let okr = state.okr.clone();
    let objectives = blocking(move || okr.company_objectives(page)).await?;
    let items = objectives
        .into_iter()
        .map(|objective| company_objective_resource(&state, &caller, objective))
        .collect();
    Ok(Json(Collection::new(
        "companyObjectives",
        format!("{}/companyObjectives", base_path(&state)),
        items,
    )))
}

pub async fn create_company_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    ValidJson(input): ValidJson<ObjectiveInput>,
) -> OkrResult<(StatusCode, Json<Resource<CompanyObjective>>)> {
    let okr = state.okr.clone();
    let objective = blocking(move || okr.create_company_objective(input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(company_objective_resource(&state, &caller, objective)),
    ))
}

pub async fn get_company_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<CompanyObjective>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objective = blocking(move || okr.company_objective(id)).await?;
    Ok(Json(company_objective_resource(&state, &caller, objective)))
}

pub async fn update_company_objective(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(update): ValidJson<ObjectiveUpdate>,
) -> OkrResult<Json<Resource<CompanyObjective>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let objective = blocking(move || okr.update_company_objective(id, update)).await?;
    Ok(Json(company_objective_resource(&state, &caller, objective)))
}

pub async fn delete_company_objective(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_company_objective(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_company_key_results(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Collection<CompanyKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_results = blocking(move || okr.company_key_results(id)).await?;
    let items = key_results
        .into_iter()
        .map(|key_result| company_key_result_resource(&state, &caller, key_result))
        .collect();
    Ok(Json(Collection::new(
        "companyKeyResults",
        format!("{}/companyObjectives/{id}/companyKeyResults", base_path(&state)),
        items,
    )))
}

pub async fn create_company_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<KeyResultInput>,
) -> OkrResult<(StatusCode, Json<Resource<CompanyKeyResult>>)> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.create_company_key_result(id, input)).await?;
    Ok((
        StatusCode::CREATED,
        Json(company_key_result_resource(&state, &caller, key_result)),
    ))
}

pub async fn get_company_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<CompanyKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.company_key_result(id)).await?;
    Ok(Json(company_key_result_resource(&state, &caller, key_result)))
}

pub async fn update_company_key_result(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(update): ValidJson<KeyResultUpdate>,
) -> OkrResult<Json<Resource<CompanyKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_result = blocking(move || okr.update_company_key_result(id, update)).await?;
    Ok(Json(company_key_result_resource(&state, &caller, key_result)))
}

pub async fn delete_company_key_result(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_company_key_result(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn company_key_result_history(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> OkrResult<Json<HistoryPage>> {
    let id = positive_id(id)?;
    let query = params.resolve(&state);
    let okr = state.okr.clone();
    let page = blocking(move || okr.company_key_result_history(id, query)).await?;
    Ok(Json(page))
}

pub async fn referencing_key_results(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Collection<BusinessUnitKeyResult>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let key_results = blocking(move || okr.referencing_key_results(id)).await?;
    let items = key_results
        .into_iter()
        .map(|key_result| business_unit_key_result_resource(&state, &caller, key_result))
        .collect();
    Ok(Json(Collection::new(
        "businessUnitKeyResults",
        format!("{}/companyKeyResults/{id}/businessUnitKeyResults", base_path(&state)),
        items,
    )))
}
