pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod okr;

pub use crate::core::shared::state::AppState;
