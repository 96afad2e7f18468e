use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    Assignment, Course, CourseSchedule, ScheduleEntry, ScrapedAssignment, ScrapedCourse,
};

/// Merges freshly scraped courses and assignments into the store, computing
/// insert vs. update vs. no-op per record. A single failed statement never
/// aborts the batch; it is counted and the pass moves on.
pub struct IngestService {
    db: SqlitePool,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestStats {
    pub courses_inserted: usize,
    pub assignments_inserted: usize,
    pub assignments_updated: usize,
    pub failures: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ScheduleStats {
    pub inserted: usize,
    pub updated: usize,
    pub failures: usize,
}

impl IngestService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn ingest_learn_data(
        &self,
        semester: &str,
        courses: Vec<ScrapedCourse>,
        assignments: HashMap<String, Vec<ScrapedAssignment>>,
    ) -> Result<IngestStats, AppError> {
        let mut stats = IngestStats::default();

        // The whole batch hangs off the semester row; if that upsert fails
        // nothing else can be attributed correctly.
        if let Err(e) = repository::make_semester_current(&self.db, semester).await {
            warn!("failed to upsert semester {}: {}", semester, e);
            stats.failures = courses.len();
            return Ok(stats);
        }

        let existing_courses: HashMap<String, Course> =
            match repository::fetch_courses_for_semester(&self.db, semester).await {
                Ok(rows) => rows.into_iter().map(|c| (c.course_id.clone(), c)).collect(),
                Err(e) => {
                    warn!("failed to query courses for {}: {}", semester, e);
                    stats.failures = courses.len();
                    return Ok(stats);
                }
            };

        for scraped in courses {
            let course = Course {
                course_id: scraped.id,
                course_name: scraped.name.0,
                en_course_name: scraped.name.1,
                unique_name: scraped.unique_name,
                teacher_name: scraped.teacher.0,
                teacher_id: scraped.teacher.1,
                course_code: scraped.course_code,
                semester: semester.to_string(),
            };

            if !existing_courses.contains_key(&course.course_id) {
                if let Err(e) = repository::insert_course(&self.db, &course).await {
                    warn!(
                        "failed to insert course {} ({}): {}",
                        course.unique_name, course.course_id, e
                    );
                    stats.failures += 1;
                    continue;
                }
                info!(
                    "inserted course {} ({})",
                    course.unique_name, course.course_id
                );
                stats.courses_inserted += 1;
            }

            let Some(batch) = assignments.get(&course.course_id) else {
                continue;
            };

            self.reconcile_assignments(&course, batch, &mut stats).await;
        }

        Ok(stats)
    }

    /// Per-course assignment reconciliation, keyed by (course_id, title).
    async fn reconcile_assignments(
        &self,
        course: &Course,
        batch: &[ScrapedAssignment],
        stats: &mut IngestStats,
    ) {
        let existing: HashMap<String, Assignment> =
            match repository::fetch_assignments_for_course(&self.db, &course.course_id).await {
                Ok(rows) => rows.into_iter().map(|a| (a.title.clone(), a)).collect(),
                Err(e) => {
                    warn!(
                        "failed to query assignments for course {}: {}",
                        course.course_id, e
                    );
                    stats.failures += 1;
                    return;
                }
            };

        for scraped in batch {
            match existing.get(&scraped.title) {
                None => {
                    let assignment = Assignment {
                        assignment_id: Uuid::new_v4().to_string(),
                        course_id: course.course_id.clone(),
                        course_name_and_code: course.name_and_code(),
                        title: scraped.title.clone(),
                        due_date: scraped.due_date.clone(),
                        description: scraped.description.clone(),
                        annex_link: scraped.file_link.clone(),
                        is_submitted: scraped.is_submitted,
                        is_ignored: false,
                    };
                    if let Err(e) = repository::insert_assignment(&self.db, &assignment).await {
                        warn!(
                            "failed to insert assignment '{}' for course {}: {}",
                            scraped.title, course.course_id, e
                        );
                        stats.failures += 1;
                        continue;
                    }
                    info!(
                        "inserted assignment '{}' for course {}",
                        scraped.title, course.course_id
                    );
                    stats.assignments_inserted += 1;
                }
                Some(current) => {
                    // Two independent update paths: submission status alone,
                    // and the (due_date, description, annex_link) group. A
                    // record that fired either counts once as updated.
                    let mut updated = false;

                    if current.is_submitted != scraped.is_submitted {
                        if let Err(e) = repository::update_assignment_submission(
                            &self.db,
                            &course.course_id,
                            &current.assignment_id,
                            scraped.is_submitted,
                        )
                        .await
                        {
                            warn!(
                                "failed to update submission status of '{}': {}",
                                scraped.title, e
                            );
                            stats.failures += 1;
                            continue;
                        }
                        info!(
                            "updated submission status of '{}' for course {}",
                            scraped.title, course.course_id
                        );
                        updated = true;
                    }

                    if current.due_date != scraped.due_date
                        || current.description != scraped.description
                        || current.annex_link != scraped.file_link
                    {
                        if let Err(e) = repository::update_assignment_details(
                            &self.db,
                            &course.course_id,
                            &current.assignment_id,
                            &scraped.due_date,
                            &scraped.description,
                            &scraped.file_link,
                        )
                        .await
                        {
                            warn!("failed to update details of '{}': {}", scraped.title, e);
                            stats.failures += 1;
                            continue;
                        }
                        info!(
                            "updated details of '{}' for course {}",
                            scraped.title, course.course_id
                        );
                        updated = true;
                    }

                    if updated {
                        stats.assignments_updated += 1;
                    }
                }
            }
        }
    }

    /// Schedule submissions mirror the assignment path: identity is
    /// (semester, course_code, weekday, time), the week string is the
    /// mutable field.
    pub async fn ingest_schedules(
        &self,
        semester: &str,
        schedules: Vec<ScheduleEntry>,
    ) -> Result<ScheduleStats, AppError> {
        let mut stats = ScheduleStats::default();

        let existing: HashMap<(String, String, String), CourseSchedule> =
            match repository::fetch_schedules_for_semester(&self.db, semester).await {
                Ok(rows) => rows
                    .into_iter()
                    .map(|s| {
                        (
                            (s.course_code.clone(), s.weekday.clone(), s.time.clone()),
                            s,
                        )
                    })
                    .collect(),
                Err(e) => {
                    warn!("failed to query schedules for {}: {}", semester, e);
                    stats.failures = schedules.len();
                    return Ok(stats);
                }
            };

        for entry in schedules {
            let key = (
                entry.course_code.clone(),
                entry.weekday.clone(),
                entry.time.clone(),
            );
            match existing.get(&key) {
                None => {
                    let schedule = CourseSchedule {
                        semester: semester.to_string(),
                        course_code: entry.course_code,
                        week: entry.week,
                        weekday: entry.weekday,
                        time: entry.time,
                    };
                    if let Err(e) = repository::insert_schedule(&self.db, &schedule).await {
                        warn!(
                            "failed to insert schedule for course {}: {}",
                            schedule.course_code, e
                        );
                        stats.failures += 1;
                        continue;
                    }
                    stats.inserted += 1;
                }
                Some(current) if current.week != entry.week => {
                    if let Err(e) = repository::update_schedule_week(
                        &self.db,
                        semester,
                        &entry.course_code,
                        &entry.weekday,
                        &entry.time,
                        &entry.week,
                    )
                    .await
                    {
                        warn!(
                            "failed to update schedule for course {}: {}",
                            entry.course_code, e
                        );
                        stats.failures += 1;
                        continue;
                    }
                    stats.updated += 1;
                }
                Some(_) => {}
            }
        }

        Ok(stats)
    }
}
