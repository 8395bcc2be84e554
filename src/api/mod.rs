//! REST API Module
//!
//! JSON endpoints over the OKR service, mounted under the configured base path.
//! Every route requires a bearer token; the token's privileges decide which
//! relation links a response carries.

pub mod access;
pub mod business_unit;
pub mod company;
pub mod links;
pub mod validation;

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::okr::error::OkrResult;
use crate::okr::store::{HistoryOrder, HistoryQuery, PageRequest};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageParams {
    pub fn resolve(&self, state: &AppState) -> PageRequest {
        state.config.page_request(self.page, self.size)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub order: Option<HistoryOrder>,
}

impl HistoryParams {
    pub fn resolve(&self, state: &AppState) -> HistoryQuery {
        let page = state.config.page_request(self.page, self.size);
        state.okr.history_query(page, self.order)
    }
}

/// Runs a store call off the async runtime.
pub async fn blocking<T, F>(f: F) -> OkrResult<T>
where
    F: FnOnce() -> OkrResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

pub fn base_path(state: &AppState) -> &str {
    state.config.server.base_path.trim_end_matches('/')
}

pub fn configure_okr_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/companyObjectives",
            get(company::list_company_objectives).post(company::create_company_objective),
        )
        .route(
            "/companyObjectives/:id",
            get(company::get_company_objective)
                .put(company::update_company_objective)
                .delete(company::delete_company_objective),
        )
        .route(
            "/companyObjectives/:id/companyKeyResults",
            get(company::list_company_key_results).post(company::create_company_key_result),
        )
        .route(
            "/companyKeyResults/:id",
            get(company::get_company_key_result)
                .put(company::update_company_key_result)
                .delete(company::delete_company_key_result),
        )
        .route(
            "/companyKeyResults/:id/history",
            get(company::company_key_result_history),
        )
        .route(
            "/companyKeyResults/:id/businessUnitKeyResults",
            get(company::referencing_key_results),
        )
        .route(
            "/businessUnits",
            get(business_unit::list_business_units).post(business_unit::create_business_unit),
        )
        .route(
            "/businessUnits/:id",
            get(business_unit::get_business_unit)
                .put(business_unit::update_business_unit)
                .delete(business_unit::delete_business_unit),
        )
        .route(
            "/businessUnits/:id/businessUnitObjectives",
            get(business_unit::list_business_unit_objectives)
                .post(business_unit::create_business_unit_objective),
        )
        .route(
            "/businessUnits/:id/okrUsers",
            get(business_unit::list_business_unit_users),
        )
        .route(
            "/businessUnitObjectives/:id",
            get(business_unit::get_business_unit_objective)
                .put(business_unit::update_business_unit_objective)
                .delete(business_unit::delete_business_unit_objective),
        )
        .route(
            "/businessUnitObjectives/:id/businessUnitKeyResults",
            get(business_unit::list_business_unit_key_results)
                .post(business_unit::create_business_unit_key_result),
        )
        .route(
            "/businessUnitKeyResults",
            get(business_unit::list_all_business_unit_key_results),
        )
        .route(
            "/businessUnitKeyResults/:id",
            get(business_unit::get_business_unit_key_result)
                .put(business_unit::update_business_unit_key_result)
                .delete(business_unit::delete_business_unit_key_result),
        )
        .route(
            "/businessUnitKeyResults/:id/history",
            get(business_unit::business_unit_key_result_history),
        )
        .route(
            "/businessUnitKeyResults/:id/companyKeyResultReference/:company_key_result_id",
            put(business_unit::reference_company_key_result)
                .post(business_unit::reference_company_key_result),
        )
        .route(
            "/businessUnitKeyResults/:id/companyKeyResultReference",
            axum::routing::delete(business_unit::dereference_company_key_result),
        )
        .route("/roles", get(access::list_roles))
        .route("/roles/:id", get(access::get_role))
        .route("/privileges", get(access::list_privileges))
        .route("/privileges/:id", get(access::get_privilege))
        .route(
            "/okrUsers",
            get(access::list_okr_users).post(access::create_okr_user),
        )
        .route(
            "/okrUsers/:id",
            get(access::get_okr_user)
                .put(access::update_okr_user)
                .delete(access::delete_okr_user),
        )
}

/// The full application router with tracing, nested under the configured base path.
pub fn build_router(state: Arc<AppState>) -> Router {
    let base = base_path(&state).to_string();
    let routes = configure_okr_routes();
    let router = if base.is_empty() {
        routes
    } else {
        Router::new().nest(&base, routes)
    };
    router.layer(TraceLayer::new_for_http()).with_state(state)
}
