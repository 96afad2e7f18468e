use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Semester {
    pub semester: String,
    pub start_date: String,
    pub end_date: String,
    pub is_current: bool,
}
