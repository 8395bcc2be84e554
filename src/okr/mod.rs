pub mod achievement;
pub mod aggregation;
pub mod error;
pub mod history;
pub mod model;
pub mod reference;
pub mod service;
pub mod store;
pub mod visibility;

pub use aggregation::{AggregationEngine, Recomputation};
pub use error::{OkrError, OkrResult};
pub use history::{HistoryLedger, HistoryPage};
pub use reference::{KeyResultReferenceManager, ReferenceOutcome};
pub use service::{CascadeSummary, OkrService, RoleDetail};
pub use store::{MemoryStore, OkrRepository, OkrStore, PgStore, Store};
pub use visibility::VisibilityFilter;
