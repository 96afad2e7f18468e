use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::Query;
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::db::repository;
use crate::error::AppError;
use crate::models::*;
use crate::services::{IngestService, IngestStats, ScheduleStats, TaskSyncService, TaskSyncStats};
use crate::state::AppState;
use crate::todoist::{TodoistConfig, TodoistHttpClient};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/submit/learn", post(submit_learn))
        .route("/submit/schedule", post(submit_schedule))
        .route("/sync", post(sync_now))
        .route("/semesters/current", get(get_current_semester))
        .route("/courses", get(list_courses))
        .route("/assignments", get(list_assignments))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

/// Scraped payload from the browser extension: courses plus a mapping from
/// course id to its assignments.
#[derive(Debug, Deserialize)]
pub struct LearnSubmission {
    pub semester: String,
    pub courses: Vec<ScrapedCourse>,
    pub assignments: HashMap<String, Vec<ScrapedAssignment>>,
}

#[derive(Debug, Serialize)]
pub struct LearnSubmissionResult {
    pub ingest: IngestStats,
    pub sync: TaskSyncStats,
}

async fn submit_learn(
    State(state): State<AppState>,
    Json(req): Json<LearnSubmission>,
) -> Result<Json<LearnSubmissionResult>, AppError> {
    let ingest = IngestService::new(state.db.clone())
        .ingest_learn_data(&req.semester, req.courses, req.assignments)
        .await?;
    let sync = TaskSyncService::new(state.db.clone(), state.todoist.clone())
        .sync_semester(&req.semester)
        .await?;
    Ok(Json(LearnSubmissionResult { ingest, sync }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleSubmission {
    pub semester: String,
    pub schedules: Vec<ScheduleEntry>,
}

async fn submit_schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleSubmission>,
) -> Result<Json<ScheduleStats>, AppError> {
    let stats = IngestService::new(state.db.clone())
        .ingest_schedules(&req.semester, req.schedules)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Defaults to the current semester.
    pub semester: Option<String>,
    /// Optional per-request Todoist token overriding the configured client.
    pub token: Option<String>,
}

async fn sync_now(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<TaskSyncStats>, AppError> {
    let semester = match req.semester {
        Some(s) => s,
        None => repository::current_semester(&state.db)
            .await?
            .ok_or(AppError::NotFound)?
            .semester,
    };
    let todoist: Arc<dyn crate::todoist::TodoistClient> = match req.token {
        Some(token) => Arc::new(TodoistHttpClient::new(TodoistConfig::with_token(token))?),
        None => state.todoist.clone(),
    };
    let stats = TaskSyncService::new(state.db.clone(), todoist)
        .sync_semester(&semester)
        .await?;
    Ok(Json(stats))
}

async fn get_current_semester(
    State(state): State<AppState>,
) -> Result<Json<Semester>, AppError> {
    let semester = repository::current_semester(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(semester))
}

#[derive(Debug, Deserialize)]
struct CourseQueryParams {
    semester: String,
}

async fn list_courses(
    State(state): State<AppState>,
    Query(params): Query<CourseQueryParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses = repository::fetch_courses_for_semester(&state.db, &params.semester).await?;
    Ok(Json(courses))
}

#[derive(Debug, Deserialize)]
struct AssignmentQueryParams {
    course_id: String,
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(params): Query<AssignmentQueryParams>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    let assignments =
        repository::fetch_assignments_for_course(&state.db, &params.course_id).await?;
    Ok(Json(assignments))
}
