pub mod dto;

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::AppError;
use dto::{
    CompletedTask, CompletedTasksResponse, Label, ListResponse, NewTask, Project, Section, Task,
    TaskUpdate,
};

const DEFAULT_BASE_URL: &str = "https://api.todoist.com/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct TodoistConfig {
    pub api_token: String,
    pub base_url: String,
}

impl TodoistConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let api_token = env::var("TODOIST_TOKEN")
            .map_err(|_| AppError::BadRequest("TODOIST_TOKEN is not set".to_string()))?;
        Ok(Self::with_token(api_token))
    }

    pub fn with_token(api_token: String) -> Self {
        Self {
            api_token,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// The subset of the Todoist API the sync pipeline depends on. Kept behind a
/// trait so tests can drive the engine against an in-memory double.
#[async_trait]
pub trait TodoistClient: Send + Sync {
    async fn projects(&self) -> Result<Vec<Project>, AppError>;
    async fn add_project(&self, name: &str) -> Result<Project, AppError>;
    async fn sections(&self, project_id: &str) -> Result<Vec<Section>, AppError>;
    async fn add_section(&self, project_id: &str, name: &str) -> Result<Section, AppError>;
    async fn labels(&self) -> Result<Vec<Label>, AppError>;
    async fn add_label(&self, name: &str, color: &str) -> Result<Label, AppError>;
    async fn tasks_in_section(&self, section_id: &str) -> Result<Vec<Task>, AppError>;
    async fn add_task(&self, task: &NewTask) -> Result<Task, AppError>;
    async fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<(), AppError>;
    /// Close must be idempotent: closing an already-closed or missing task is
    /// not an error.
    async fn close_task(&self, id: &str) -> Result<(), AppError>;
    async fn completed_tasks_by_due_date(
        &self,
        since: &str,
        until: &str,
    ) -> Result<Vec<CompletedTask>, AppError>;
}

pub struct TodoistHttpClient {
    client: Client,
    config: TodoistConfig,
}

impl TodoistHttpClient {
    pub fn new(config: TodoistConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Sends a request, retrying on 429/5xx and transport errors with bounded
    /// exponential backoff. The remote service is treated as rate-limited and
    /// flaky, not as broken.
    async fn send_with_retry<F>(&self, make: F) -> Result<reqwest::Response, AppError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay = RETRY_BASE_DELAY;
        for attempt in 1..=MAX_ATTEMPTS {
            match make()
                .header("Authorization", format!("Bearer {}", self.config.api_token))
                .send()
                .await
            {
                Ok(resp)
                    if resp.status() == StatusCode::TOO_MANY_REQUESTS
                        || resp.status().is_server_error() =>
                {
                    if attempt == MAX_ATTEMPTS {
                        return Err(AppError::Todoist(format!(
                            "Todoist API error {} after {} attempts",
                            resp.status(),
                            attempt
                        )));
                    }
                    warn!("todoist returned {}, retrying", resp.status());
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(AppError::Todoist(format!("request failed: {}", e)));
                    }
                    warn!("todoist request failed ({}), retrying", e);
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        unreachable!("retry loop returns before exhausting attempts")
    }

    async fn expect_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AppError> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Todoist(format!(
                "Todoist API error {}: {}",
                status, body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| AppError::Todoist(format!("Failed to parse Todoist response: {}", e)))
    }

    /// Drains a paginated list endpoint to exhaustion.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, AppError> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let url = self.url(path);
            let resp = self
                .send_with_retry(|| {
                    let mut req = self.client.get(&url).query(query);
                    if let Some(c) = &cursor {
                        req = req.query(&[("cursor", c.as_str())]);
                    }
                    req
                })
                .await?;
            let page: ListResponse<T> = Self::expect_json(resp).await?;
            results.extend(page.results);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(results),
            }
        }
    }
}

#[async_trait]
impl TodoistClient for TodoistHttpClient {
    async fn projects(&self) -> Result<Vec<Project>, AppError> {
        self.list_all("/projects", &[]).await
    }

    async fn add_project(&self, name: &str) -> Result<Project, AppError> {
        let url = self.url("/projects");
        let body = serde_json::json!({ "name": name });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::expect_json(resp).await
    }

    async fn sections(&self, project_id: &str) -> Result<Vec<Section>, AppError> {
        self.list_all("/sections", &[("project_id", project_id)])
            .await
    }

    async fn add_section(&self, project_id: &str, name: &str) -> Result<Section, AppError> {
        let url = self.url("/sections");
        let body = serde_json::json!({ "project_id": project_id, "name": name });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::expect_json(resp).await
    }

    async fn labels(&self) -> Result<Vec<Label>, AppError> {
        self.list_all("/labels", &[]).await
    }

    async fn add_label(&self, name: &str, color: &str) -> Result<Label, AppError> {
        let url = self.url("/labels");
        let body = serde_json::json!({ "name": name, "color": color });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Self::expect_json(resp).await
    }

    async fn tasks_in_section(&self, section_id: &str) -> Result<Vec<Task>, AppError> {
        self.list_all("/tasks", &[("section_id", section_id)]).await
    }

    async fn add_task(&self, task: &NewTask) -> Result<Task, AppError> {
        let url = self.url("/tasks");
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(task))
            .await?;
        Self::expect_json(resp).await
    }

    async fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<(), AppError> {
        let url = self.url(&format!("/tasks/{}", id));
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(update))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Todoist(format!(
                "Failed to update task {}: {} {}",
                id, status, body
            )));
        }
        Ok(())
    }

    async fn close_task(&self, id: &str) -> Result<(), AppError> {
        let url = self.url(&format!("/tasks/{}/close", id));
        let resp = self.send_with_retry(|| self.client.post(&url)).await?;
        let status = resp.status();
        // A task closed out of band disappears from the open set; 404 here
        // means the close already happened.
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Todoist(format!(
                "Failed to close task {}: {} {}",
                id, status, body
            )));
        }
        Ok(())
    }

    async fn completed_tasks_by_due_date(
        &self,
        since: &str,
        until: &str,
    ) -> Result<Vec<CompletedTask>, AppError> {
        let url = self.url("/tasks/completed/by_due_date");
        let resp = self
            .send_with_retry(|| {
                self.client
                    .get(&url)
                    .query(&[("since", since), ("until", until)])
            })
            .await?;
        let parsed: CompletedTasksResponse = Self::expect_json(resp).await?;
        Ok(parsed.items)
    }
}
