pub mod schema;
pub mod state;
pub mod utils;

pub use state::AppState;
pub use utils::{create_pool, run_migrations, DbPool};
