use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::{Assignment, Course, CourseSchedule, Semester};

/// Placeholder policy for a freshly sighted semester: 18 weeks from today.
const SEMESTER_LENGTH_WEEKS: i64 = 18;

pub async fn find_semester(
    db: &SqlitePool,
    semester: &str,
) -> Result<Option<Semester>, sqlx::Error> {
    sqlx::query_as::<_, Semester>(
        "SELECT semester, start_date, end_date, is_current FROM semesters WHERE semester = ?",
    )
    .bind(semester)
    .fetch_optional(db)
    .await
}

pub async fn current_semester(db: &SqlitePool) -> Result<Option<Semester>, sqlx::Error> {
    sqlx::query_as::<_, Semester>(
        "SELECT semester, start_date, end_date, is_current FROM semesters WHERE is_current = 1 LIMIT 1",
    )
    .fetch_optional(db)
    .await
}

/// Upsert `semester` as the current one. Demotion of every other row and
/// promotion of this one run inside a single transaction so the
/// at-most-one-current invariant holds even under concurrent ingestion.
pub async fn make_semester_current(db: &SqlitePool, semester: &str) -> Result<(), sqlx::Error> {
    let today = Utc::now();
    let start_date = today.format("%Y-%m-%d").to_string();
    let end_date = (today + Duration::weeks(SEMESTER_LENGTH_WEEKS))
        .format("%Y-%m-%d")
        .to_string();

    let mut tx = db.begin().await?;

    sqlx::query("UPDATE semesters SET is_current = 0 WHERE semester != ?")
        .bind(semester)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO semesters (semester, start_date, end_date, is_current) VALUES (?, ?, ?, 1) \
         ON CONFLICT(semester) DO UPDATE SET is_current = 1",
    )
    .bind(semester)
    .bind(&start_date)
    .bind(&end_date)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

pub async fn fetch_courses_for_semester(
    db: &SqlitePool,
    semester: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT course_id, course_name, en_course_name, unique_name, teacher_name, teacher_id, \
         course_code, semester FROM courses WHERE semester = ?",
    )
    .bind(semester)
    .fetch_all(db)
    .await
}

pub async fn insert_course(db: &SqlitePool, course: &Course) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO courses (course_id, course_name, en_course_name, unique_name, teacher_name, \
         teacher_id, course_code, semester) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&course.course_id)
    .bind(&course.course_name)
    .bind(&course.en_course_name)
    .bind(&course.unique_name)
    .bind(&course.teacher_name)
    .bind(&course.teacher_id)
    .bind(&course.course_code)
    .bind(&course.semester)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn fetch_assignments_for_course(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(
        "SELECT assignment_id, course_id, course_name_and_code, title, due_date, description, \
         annex_link, is_submitted, is_ignored FROM assignments WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn insert_assignment(db: &SqlitePool, assignment: &Assignment) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO assignments (assignment_id, course_id, course_name_and_code, title, due_date, \
         description, annex_link, is_submitted, is_ignored) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&assignment.assignment_id)
    .bind(&assignment.course_id)
    .bind(&assignment.course_name_and_code)
    .bind(&assignment.title)
    .bind(&assignment.due_date)
    .bind(&assignment.description)
    .bind(&assignment.annex_link)
    .bind(assignment.is_submitted)
    .bind(assignment.is_ignored)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_assignment_submission(
    db: &SqlitePool,
    course_id: &str,
    assignment_id: &str,
    is_submitted: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE assignments SET is_submitted = ? WHERE course_id = ? AND assignment_id = ?")
        .bind(is_submitted)
        .bind(course_id)
        .bind(assignment_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn update_assignment_details(
    db: &SqlitePool,
    course_id: &str,
    assignment_id: &str,
    due_date: &str,
    description: &str,
    annex_link: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE assignments SET due_date = ?, description = ?, annex_link = ? \
         WHERE course_id = ? AND assignment_id = ?",
    )
    .bind(due_date)
    .bind(description)
    .bind(annex_link)
    .bind(course_id)
    .bind(assignment_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn mark_assignment_ignored(
    db: &SqlitePool,
    course_id: &str,
    assignment_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE assignments SET is_ignored = 1 WHERE assignment_id = ? AND course_id = ?")
        .bind(assignment_id)
        .bind(course_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn fetch_schedules_for_semester(
    db: &SqlitePool,
    semester: &str,
) -> Result<Vec<CourseSchedule>, sqlx::Error> {
    sqlx::query_as::<_, CourseSchedule>(
        "SELECT semester, course_code, week, weekday, time FROM course_schedules WHERE semester = ?",
    )
    .bind(semester)
    .fetch_all(db)
    .await
}

pub async fn insert_schedule(db: &SqlitePool, schedule: &CourseSchedule) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO course_schedules (semester, course_code, week, weekday, time) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&schedule.semester)
    .bind(&schedule.course_code)
    .bind(&schedule.week)
    .bind(&schedule.weekday)
    .bind(&schedule.time)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_schedule_week(
    db: &SqlitePool,
    semester: &str,
    course_code: &str,
    weekday: &str,
    time: &str,
    week: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_schedules SET week = ? \
         WHERE semester = ? AND course_code = ? AND weekday = ? AND time = ?",
    )
    .bind(week)
    .bind(semester)
    .bind(course_code)
    .bind(weekday)
    .bind(time)
    .execute(db)
    .await?;
    Ok(())
}
