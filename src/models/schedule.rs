use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseSchedule {
    pub semester: String,
    pub course_code: String,
    pub week: String,
    pub weekday: String,
    pub time: String,
}

/// Schedule record as submitted from the registration form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub course_code: String,
    pub week: String,
    pub weekday: String,
    pub time: String,
}
