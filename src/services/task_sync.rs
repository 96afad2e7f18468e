use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::models::Assignment;
use crate::services::taxonomy;
use crate::todoist::TodoistClient;
use crate::todoist::dto::{NewTask, Task, TaskUpdate};

/// Reconciles the store's active assignments against the remote task set for
/// one semester. Store state wins every conflict except externally-completed
/// detection, where a remote completion flips the assignment to ignored.
pub struct TaskSyncService {
    db: SqlitePool,
    todoist: Arc<dyn TodoistClient>,
}

#[derive(Debug, Default, Serialize)]
pub struct TaskSyncStats {
    pub tasks_added: usize,
    pub tasks_updated: usize,
    pub failures: usize,
}

const TASK_DURATION_MINUTES: u32 = 60;
const DURATION_UNIT: &str = "minute";
/// The course label carries a trailing " (NNNNNNNN)" code suffix of exactly
/// this many characters; task content strips it.
const COURSE_CODE_SUFFIX_LEN: usize = 11;

/// Join key between a stored assignment and its remote task. Must stay
/// byte-identical with what ingestion denormalizes into
/// `course_name_and_code`, since content equality is the sole match.
pub fn task_content(course_name_and_code: &str, title: &str) -> String {
    let chars: Vec<char> = course_name_and_code.chars().collect();
    let keep = chars.len().saturating_sub(COURSE_CODE_SUFFIX_LEN);
    let prefix: String = chars[..keep].iter().collect();
    format!("{} **{}**", prefix, title)
}

/// Scraper emits `YYYY-MM-DDTHH:MM+08:00`; RFC 3339 accepted as fallback.
pub fn parse_due_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%z")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok())
}

/// Priority from due-date proximity: more than 3 days out is low (2), within
/// 3 days is medium (3), past due is high (4).
pub fn priority_for(adjusted_due: DateTime<FixedOffset>, now: DateTime<Utc>) -> u8 {
    let due = adjusted_due.with_timezone(&Utc);
    if due < now {
        4
    } else if due - now < Duration::days(3) {
        3
    } else {
        2
    }
}

/// Due string presented to Todoist, after the 1-hour lead-time shift.
pub fn due_string(adjusted_due: DateTime<FixedOffset>) -> String {
    adjusted_due.format("%Y-%m-%d %H:%M").to_string()
}

enum SyncOutcome {
    Added,
    Updated,
    Closed,
    Converged,
    ExternallyCompleted,
    Failed,
}

impl TaskSyncService {
    pub fn new(db: SqlitePool, todoist: Arc<dyn TodoistClient>) -> Self {
        Self { db, todoist }
    }

    pub async fn sync_semester(&self, semester: &str) -> Result<TaskSyncStats, AppError> {
        let courses = repository::fetch_courses_for_semester(&self.db, semester).await?;
        let taxonomy = taxonomy::ensure_taxonomy(self.todoist.as_ref(), semester, &courses).await?;

        let remote = self.todoist.tasks_in_section(&taxonomy.section_id).await?;
        let tasks_by_content: HashMap<String, Task> = remote
            .into_iter()
            .map(|t| (t.content.clone(), t))
            .collect();

        let mut stats = TaskSyncStats::default();
        let now = Utc::now();

        for course in &courses {
            let assignments =
                match repository::fetch_assignments_for_course(&self.db, &course.course_id).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(
                            "failed to query assignments for course {}: {}",
                            course.course_id, e
                        );
                        stats.failures += 1;
                        continue;
                    }
                };

            for assignment in &assignments {
                match self
                    .sync_assignment(assignment, &tasks_by_content, &taxonomy.section_id, now)
                    .await
                {
                    SyncOutcome::Added => stats.tasks_added += 1,
                    // Closing counts as an update, like any other remote mutation.
                    SyncOutcome::Updated | SyncOutcome::Closed => stats.tasks_updated += 1,
                    SyncOutcome::Converged => {}
                    SyncOutcome::Failed => stats.failures += 1,
                    SyncOutcome::ExternallyCompleted => {
                        if let Err(e) = repository::mark_assignment_ignored(
                            &self.db,
                            &assignment.course_id,
                            &assignment.assignment_id,
                        )
                        .await
                        {
                            warn!(
                                "failed to mark assignment '{}' as ignored: {}",
                                assignment.title, e
                            );
                            stats.failures += 1;
                        } else {
                            info!(
                                "marked externally completed assignment '{}' as ignored",
                                assignment.title
                            );
                        }
                    }
                }
            }
        }

        Ok(stats)
    }

    /// One step of the per-assignment state machine, driven by
    /// (task exists × is_submitted × is_ignored × remote completion).
    async fn sync_assignment(
        &self,
        assignment: &Assignment,
        tasks: &HashMap<String, Task>,
        section_id: &str,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let content = task_content(&assignment.course_name_and_code, &assignment.title);
        let Some(due) = parse_due_date(&assignment.due_date) else {
            warn!(
                "unparsable due date '{}' for assignment '{}'",
                assignment.due_date, assignment.title
            );
            return SyncOutcome::Failed;
        };
        let adjusted = due - Duration::hours(1);
        let due_str = due_string(adjusted);
        let priority = priority_for(adjusted, now);

        match tasks.get(&content) {
            None if !assignment.is_active() => {
                // Submitted or ignored with no remote task: already converged.
                SyncOutcome::Converged
            }
            None => {
                // The task may have been completed out of band; probe the
                // completed set within a day of the adjusted due date before
                // creating anything.
                let since = (adjusted - Duration::days(1)).to_rfc3339();
                let until = (adjusted + Duration::days(1)).to_rfc3339();
                let completed = match self.todoist.completed_tasks_by_due_date(&since, &until).await
                {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(
                            "failed to fetch completed tasks for '{}': {}",
                            assignment.title, e
                        );
                        return SyncOutcome::Failed;
                    }
                };
                if completed.iter().any(|t| t.content == content) {
                    return SyncOutcome::ExternallyCompleted;
                }

                let new_task = NewTask {
                    content,
                    description: assignment.description.clone(),
                    due_string: due_str,
                    duration: TASK_DURATION_MINUTES,
                    duration_unit: DURATION_UNIT.to_string(),
                    labels: vec![assignment.course_name_and_code.clone()],
                    priority,
                    section_id: section_id.to_string(),
                };
                match self.todoist.add_task(&new_task).await {
                    Ok(task) => {
                        info!(
                            "created task {} for assignment '{}' due {}",
                            task.id, assignment.title, new_task.due_string
                        );
                        SyncOutcome::Added
                    }
                    Err(e) => {
                        warn!(
                            "failed to add task for assignment '{}': {}",
                            assignment.title, e
                        );
                        SyncOutcome::Failed
                    }
                }
            }
            Some(task) if assignment.is_submitted || assignment.is_ignored => {
                match self.todoist.close_task(&task.id).await {
                    Ok(()) => {
                        info!(
                            "closed task {} for assignment '{}'",
                            task.id, assignment.title
                        );
                        SyncOutcome::Closed
                    }
                    Err(e) => {
                        warn!(
                            "failed to close task for assignment '{}': {}",
                            assignment.title, e
                        );
                        SyncOutcome::Failed
                    }
                }
            }
            Some(task) => {
                let due_matches = task
                    .due
                    .as_ref()
                    .map(|d| d.string == due_str)
                    .unwrap_or(false);
                let in_sync = due_matches
                    && task.priority == priority
                    && task.description == assignment.description
                    && task.labels.contains(&assignment.course_name_and_code);
                if in_sync {
                    return SyncOutcome::Converged;
                }
                let update = TaskUpdate {
                    description: assignment.description.clone(),
                    due_string: due_str,
                    duration: TASK_DURATION_MINUTES,
                    duration_unit: DURATION_UNIT.to_string(),
                    labels: vec![assignment.course_name_and_code.clone()],
                    priority,
                };
                match self.todoist.update_task(&task.id, &update).await {
                    Ok(()) => {
                        info!(
                            "updated task {} for assignment '{}'",
                            task.id, assignment.title
                        );
                        SyncOutcome::Updated
                    }
                    Err(e) => {
                        warn!(
                            "failed to update task for assignment '{}': {}",
                            assignment.title, e
                        );
                        SyncOutcome::Failed
                    }
                }
            }
        }
    }
}
