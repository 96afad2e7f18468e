use std::sync::Arc;

use sqlx::SqlitePool;

use crate::todoist::TodoistClient;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub todoist: Arc<dyn TodoistClient>,
}
