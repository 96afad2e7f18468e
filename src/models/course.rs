use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub course_id: String,
    pub course_name: String,
    pub en_course_name: String,
    pub unique_name: String,
    pub teacher_name: String,
    pub teacher_id: String,
    pub course_code: String,
    pub semester: String,
}

impl Course {
    /// Denormalized label used both for the Todoist label and as the prefix
    /// of the task content join key.
    pub fn name_and_code(&self) -> String {
        format!("{} ({})", self.course_name, self.course_code)
    }
}

/// Course record as produced by the browser-side scraper.
/// `name` is `[course_name, en_course_name]`, `teacher` is
/// `[teacher_name, teacher_id]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedCourse {
    pub id: String,
    pub name: (String, String),
    pub teacher: (String, String),
    pub course_code: String,
    pub unique_name: String,
}
