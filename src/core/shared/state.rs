use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::okr::{OkrService, Store, VisibilityFilter};

pub struct AppState {
    pub okr: Arc<OkrService<Store>>,
    pub tokens: TokenService,
    pub visibility: VisibilityFilter,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(store: Store, tokens: TokenService, config: AppConfig) -> Self {
        Self {
            okr: Arc::new(OkrService::new(store, config.history.default_order)),
            tokens,
            visibility: VisibilityFilter,
            config,
        }
    }
}
