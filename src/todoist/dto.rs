use serde::{Deserialize, Serialize};

/// Paginated list envelope used by the Todoist v1 API.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletedTasksResponse {
    pub items: Vec<CompletedTask>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Due {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub priority: u8,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub due: Option<Due>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletedTask {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub content: String,
    pub description: String,
    pub due_string: String,
    pub duration: u32,
    pub duration_unit: String,
    pub labels: Vec<String>,
    pub priority: u8,
    pub section_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdate {
    pub description: String,
    pub due_string: String,
    pub duration: u32,
    pub duration_unit: String,
    pub labels: Vec<String>,
    pub priority: u8,
}
