use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub assignment_id: String,
    pub course_id: String,
    pub course_name_and_code: String,
    pub title: String,
    pub due_date: String,
    pub description: String,
    pub annex_link: String,
    pub is_submitted: bool,
    pub is_ignored: bool,
}

impl Assignment {
    /// An assignment should have exactly one open remote task iff it is
    /// neither submitted nor ignored.
    pub fn is_active(&self) -> bool {
        !self.is_submitted && !self.is_ignored
    }
}

/// Assignment record as produced by the scraper, before it gets an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedAssignment {
    pub title: String,
    pub due_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_link: String,
    #[serde(default)]
    pub is_submitted: bool,
}
