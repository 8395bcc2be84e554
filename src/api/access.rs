use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use super::links::{Collection, LinkBuilder, Resource};
use super::validation::{positive_id, ValidJson};
use super::{base_path, blocking, PageParams};
use crate::auth::CallerPrivileges;
use crate::core::shared::state::AppState;
use crate::okr::error::OkrResult;
use crate::okr::model::{EntityKind, OkrUser, OkrUserInput, Privilege, Role};
use crate::okr::RoleDetail;

/// Links each member and privilege of the role individually, when the caller may see them.
pub(crate) fn role_resource(state: &AppState, caller: &CallerPrivileges, detail: RoleDetail) -> Resource<Role> {
    let id = detail.role.id;
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::Role,
        &caller.privileges,
        format!("/roles/{id}"),
    )
    .relations(
        "okrUsers",
        detail
            .users
            .iter()
            .map(|user| format!("/okrUsers/{}", user.id))
            .collect(),
    )
    .relations(
        "privileges",
        detail
            .privileges
            .iter()
            .map(|privilege| format!("/privileges/{}", privilege.id))
            .collect(),
    )
    .finish(detail.role)
}

pub(crate) fn privilege_resource(state: &AppState, caller: &CallerPrivileges, privilege: Privilege) -> Resource<Privilege> {
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::Privilege,
        &caller.privileges,
        format!("/privileges/{}", privilege.id),
    )
    .finish(privilege)
}

pub(crate) fn okr_user_resource(state: &AppState, caller: &CallerPrivileges, user: OkrUser) -> Resource<OkrUser> {
    LinkBuilder::new(
        base_path(state),
        &state.visibility,
        EntityKind::OkrUser,
        &caller.privileges,
        format!("/okrUsers/{}", user.id),
    )
    .relation("role", user.role_id.map(|id| format!("/roles/{id}")))
    .relation(
        "businessUnit",
        user.business_unit_id.map(|id| format!("/businessUnits/{id}")),
    )
    .finish(user)
}

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
) -> OkrResult<Json<Collection<Role>>> {
    let okr = state.okr.clone();
    let details = blocking(move || okr.role_details()).await?;
    let items = details
        .into_iter()
        .map(|detail| role_resource(&state, &caller, detail))
        .collect();
    Ok(Json(Collection::new(
        "roles",
        format!("{}/roles", base_path(&state)),
        items,
    )))
}

pub async fn get_role(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<Role>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let detail = blocking(move || okr.role(id)).await?;
    Ok(Json(role_resource(&state, &caller, detail)))
}

pub async fn list_privileges(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
) -> OkrResult<Json<Collection<Privilege>>> {
    let okr = state.okr.clone();
    let privileges = blocking(move || okr.privileges()).await?;
    let items = privileges
        .into_iter()
        .map(|privilege| privilege_resource(&state, &caller, privilege))
        .collect();
    Ok(Json(Collection::new(
        "privileges",
        format!("{}/privileges", base_path(&state)),
        items,
    )))
}

pub async fn get_privilege(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<Privilege>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let privilege = blocking(move || okr.privilege(id)).await?;
    Ok(Json(privilege_resource(&state, &caller, privilege)))
}

pub async fn list_okr_users(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Query(params): Query<PageParams>,
) -> OkrResult<Json<Collection<OkrUser>>> {
    let page = params.resolve(&state);
    let okr = state.okr.clone();
    let users = blocking(move || okr.okr_users(page)).await?;
    let items = users
        .into_iter()
        .map(|user| okr_user_resource(&state, &caller, user))
        .collect();
    Ok(Json(Collection::new(
        "okrUsers",
        format!("{}/okrUsers", base_path(&state)),
        items,
    )))
}

pub async fn get_okr_user(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<Json<Resource<OkrUser>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let user = blocking(move || okr.okr_user(id)).await?;
    Ok(Json(okr_user_resource(&state, &caller, user)))
}

pub async fn create_okr_user(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    ValidJson(input): ValidJson<OkrUserInput>,
) -> OkrResult<(StatusCode, Json<Resource<OkrUser>>)> {
    let okr = state.okr.clone();
    let user = blocking(move || okr.create_okr_user(input)).await?;
    Ok((StatusCode::CREATED, Json(okr_user_resource(&state, &caller, user))))
}

pub async fn update_okr_user(
    State(state): State<Arc<AppState>>,
    caller: CallerPrivileges,
    Path(id): Path<i64>,
    ValidJson(input): ValidJson<OkrUserInput>,
) -> OkrResult<Json<Resource<OkrUser>>> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    let user = blocking(move || okr.update_okr_user(id, input)).await?;
    Ok(Json(okr_user_resource(&state, &caller, user)))
}

pub async fn delete_okr_user(
    State(state): State<Arc<AppState>>,
    _caller: CallerPrivileges,
    Path(id): Path<i64>,
) -> OkrResult<StatusCode> {
    let id = positive_id(id)?;
    let okr = state.okr.clone();
    blocking(move || okr.delete_okr_user(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
