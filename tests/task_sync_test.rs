use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use learn_tracker::db::repository;
use learn_tracker::error::AppError;
use learn_tracker::models::{Assignment, Course};
use learn_tracker::services::TaskSyncService;
use learn_tracker::services::task_sync::task_content;
use learn_tracker::todoist::TodoistClient;
use learn_tracker::todoist::dto::{
    CompletedTask, Due, Label, NewTask, Project, Section, Task, TaskUpdate,
};
use sqlx::SqlitePool;

struct CompletedEntry {
    due: chrono::DateTime<Utc>,
    task: CompletedTask,
}

#[derive(Default)]
struct FakeState {
    projects: Vec<Project>,
    sections: Vec<Section>,
    labels: Vec<Label>,
    tasks: Vec<Task>,
    completed: Vec<CompletedEntry>,
    /// Content string whose add_task call fails, simulating a flaky remote.
    fail_add_for: Option<String>,
    next_id: u64,
    adds: usize,
    updates: usize,
    closes: usize,
}

/// In-memory Todoist double recording every mutation, so tests can assert
/// how many remote writes a sync pass performed.
#[derive(Default)]
struct FakeTodoist {
    state: Mutex<FakeState>,
}

impl FakeTodoist {
    fn next_id(state: &mut FakeState) -> String {
        state.next_id += 1;
        format!("id-{}", state.next_id)
    }

    fn mutation_count(&self) -> usize {
        let s = self.state.lock().unwrap();
        s.adds + s.updates + s.closes
    }

    fn open_tasks(&self) -> Vec<Task> {
        self.state.lock().unwrap().tasks.clone()
    }

    fn seed_completed(&self, content: &str, due: chrono::DateTime<Utc>) {
        let mut s = self.state.lock().unwrap();
        let id = Self::next_id(&mut s);
        let task = CompletedTask {
            id,
            content: content.to_string(),
            completed_at: Some(Utc::now().to_rfc3339()),
        };
        s.completed.push(CompletedEntry { due, task });
    }

    fn fail_add_for(&self, content: &str) {
        self.state.lock().unwrap().fail_add_for = Some(content.to_string());
    }

    fn seed_label(&self, name: &str, color: &str) {
        let mut s = self.state.lock().unwrap();
        let id = Self::next_id(&mut s);
        s.labels.push(Label {
            id,
            name: name.to_string(),
            color: color.to_string(),
        });
    }
}

#[async_trait]
impl TodoistClient for FakeTodoist {
    async fn projects(&self) -> Result<Vec<Project>, AppError> {
        Ok(self.state.lock().unwrap().projects.clone())
    }

    async fn add_project(&self, name: &str) -> Result<Project, AppError> {
        let mut s = self.state.lock().unwrap();
        let id = Self::next_id(&mut s);
        let project = Project {
            id,
            name: name.to_string(),
        };
        s.projects.push(project.clone());
        Ok(project)
    }

    async fn sections(&self, project_id: &str) -> Result<Vec<Section>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sections
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn add_section(&self, project_id: &str, name: &str) -> Result<Section, AppError> {
        let mut s = self.state.lock().unwrap();
        let id = Self::next_id(&mut s);
        let section = Section {
            id,
            project_id: project_id.to_string(),
            name: name.to_string(),
        };
        s.sections.push(section.clone());
        Ok(section)
    }

    async fn labels(&self) -> Result<Vec<Label>, AppError> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn add_label(&self, name: &str, color: &str) -> Result<Label, AppError> {
        let mut s = self.state.lock().unwrap();
        let id = Self::next_id(&mut s);
        let label = Label {
            id,
            name: name.to_string(),
            color: color.to_string(),
        };
        s.labels.push(label.clone());
        Ok(label)
    }

    async fn tasks_in_section(&self, section_id: &str) -> Result<Vec<Task>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|t| t.section_id.as_deref() == Some(section_id))
            .cloned()
            .collect())
    }

    async fn add_task(&self, new_task: &NewTask) -> Result<Task, AppError> {
        let mut s = self.state.lock().unwrap();
        if s.fail_add_for.as_deref() == Some(new_task.content.as_str()) {
            return Err(AppError::Todoist("task service unavailable".to_string()));
        }
        let id = Self::next_id(&mut s);
        let task = Task {
            id,
            content: new_task.content.clone(),
            description: new_task.description.clone(),
            labels: new_task.labels.clone(),
            priority: new_task.priority,
            section_id: Some(new_task.section_id.clone()),
            due: Some(Due {
                date: None,
                datetime: None,
                string: new_task.due_string.clone(),
            }),
        };
        s.tasks.push(task.clone());
        s.adds += 1;
        Ok(task)
    }

    async fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<(), AppError> {
        let mut s = self.state.lock().unwrap();
        let task = s
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(AppError::NotFound)?;
        task.description = update.description.clone();
        task.labels = update.labels.clone();
        task.priority = update.priority;
        task.due = Some(Due {
            date: None,
            datetime: None,
            string: update.due_string.clone(),
        });
        s.updates += 1;
        Ok(())
    }

    async fn close_task(&self, id: &str) -> Result<(), AppError> {
        let mut s = self.state.lock().unwrap();
        // Idempotent: closing a task that is already gone succeeds.
        s.tasks.retain(|t| t.id != id);
        s.closes += 1;
        Ok(())
    }

    async fn completed_tasks_by_due_date(
        &self,
        since: &str,
        until: &str,
    ) -> Result<Vec<CompletedTask>, AppError> {
        let since = chrono::DateTime::parse_from_rfc3339(since)
            .expect("since is not RFC 3339")
            .with_timezone(&Utc);
        let until = chrono::DateTime::parse_from_rfc3339(until)
            .expect("until is not RFC 3339")
            .with_timezone(&Utc);
        Ok(self
            .state
            .lock()
            .unwrap()
            .completed
            .iter()
            .filter(|e| since <= e.due && e.due <= until)
            .map(|e| e.task.clone())
            .collect())
    }
}

async fn setup_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

const SEMESTER: &str = "2024-2025-2";

fn course(id: &str, name: &str, code: &str) -> Course {
    Course {
        course_id: id.to_string(),
        course_name: name.to_string(),
        en_course_name: format!("{} (EN)", name),
        unique_name: format!("{}-{}", name, code),
        teacher_name: "Prof. Zhang".to_string(),
        teacher_id: "t-001".to_string(),
        course_code: code.to_string(),
        semester: SEMESTER.to_string(),
    }
}

fn assignment(course: &Course, title: &str, due_date: &str) -> Assignment {
    Assignment {
        assignment_id: uuid::Uuid::new_v4().to_string(),
        course_id: course.course_id.clone(),
        course_name_and_code: course.name_and_code(),
        title: title.to_string(),
        due_date: due_date.to_string(),
        description: "do the thing".to_string(),
        annex_link: String::new(),
        is_submitted: false,
        is_ignored: false,
    }
}

fn due_in_days(days: i64) -> String {
    (Utc::now() + Duration::days(days))
        .format("%Y-%m-%dT%H:%M+00:00")
        .to_string()
}

/// One semester, one course, one assignment due in `days` days.
async fn seed(db: &SqlitePool, days: i64) -> (Course, Assignment) {
    repository::make_semester_current(db, SEMESTER)
        .await
        .expect("semester upsert failed");
    let c = course("c-1", "Data Structures", "40240533");
    repository::insert_course(db, &c).await.expect("insert course failed");
    let a = assignment(&c, "HW1", &due_in_days(days));
    repository::insert_assignment(db, &a)
        .await
        .expect("insert assignment failed");
    (c, a)
}

#[tokio::test]
async fn sync_creates_exactly_one_task_for_active_assignment() {
    let db = setup_db().await;
    let (c, a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    let stats = service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(stats.tasks_added, 1);
    assert_eq!(stats.tasks_updated, 0);
    assert_eq!(stats.failures, 0);

    let tasks = todoist.open_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].content, task_content(&a.course_name_and_code, "HW1"));
    assert_eq!(tasks[0].content, "Data Structures **HW1**");
    assert_eq!(tasks[0].priority, 2);
    assert_eq!(tasks[0].labels, vec![c.name_and_code()]);
}

#[tokio::test]
async fn sync_twice_makes_no_further_remote_mutations() {
    let db = setup_db().await;
    seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("first sync failed");
    let after_first = todoist.mutation_count();

    let second = service.sync_semester(SEMESTER).await.expect("second sync failed");
    assert_eq!(second.tasks_added, 0);
    assert_eq!(second.tasks_updated, 0);
    assert_eq!(second.failures, 0);
    assert_eq!(todoist.mutation_count(), after_first);
}

#[tokio::test]
async fn imminent_deadline_gets_medium_priority() {
    let db = setup_db().await;
    seed(&db, 2).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(todoist.open_tasks()[0].priority, 3);
}

#[tokio::test]
async fn overdue_assignment_gets_high_priority() {
    let db = setup_db().await;
    seed(&db, -1).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(todoist.open_tasks()[0].priority, 4);
}

#[tokio::test]
async fn submitted_assignment_closes_task_once_and_never_recreates() {
    let db = setup_db().await;
    let (c, a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("first sync failed");
    assert_eq!(todoist.open_tasks().len(), 1);

    repository::update_assignment_submission(&db, &c.course_id, &a.assignment_id, true)
        .await
        .expect("submission update failed");

    let second = service.sync_semester(SEMESTER).await.expect("second sync failed");
    assert_eq!(second.tasks_updated, 1);
    assert!(todoist.open_tasks().is_empty());

    let third = service.sync_semester(SEMESTER).await.expect("third sync failed");
    assert_eq!(third.tasks_added, 0);
    assert_eq!(third.tasks_updated, 0);
    assert!(todoist.open_tasks().is_empty());
}

#[tokio::test]
async fn externally_completed_assignment_is_marked_ignored_not_recreated() {
    let db = setup_db().await;
    let (c, a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    todoist.seed_completed(
        &task_content(&a.course_name_and_code, "HW1"),
        Utc::now() + Duration::days(10),
    );
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    let stats = service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(stats.tasks_added, 0);
    assert_eq!(stats.failures, 0);
    assert!(todoist.open_tasks().is_empty());

    let stored = repository::fetch_assignments_for_course(&db, &c.course_id)
        .await
        .expect("query failed");
    assert!(stored[0].is_ignored);

    // Once ignored, later passes are pure no-ops.
    let second = service.sync_semester(SEMESTER).await.expect("second sync failed");
    assert_eq!(second.tasks_added, 0);
    assert_eq!(second.tasks_updated, 0);
}

#[tokio::test]
async fn completion_outside_due_window_does_not_suppress_creation() {
    let db = setup_db().await;
    let (c, a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    // Same content, but the completion's due date sits 5 days before the
    // assignment's, well outside the ±1-day probe window.
    todoist.seed_completed(
        &task_content(&a.course_name_and_code, "HW1"),
        Utc::now() + Duration::days(5),
    );
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    let stats = service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(stats.tasks_added, 1);
    assert_eq!(todoist.open_tasks().len(), 1);

    let stored = repository::fetch_assignments_for_course(&db, &c.course_id)
        .await
        .expect("query failed");
    assert!(!stored[0].is_ignored);
}

#[tokio::test]
async fn remote_add_failure_is_counted_and_batch_continues() {
    let db = setup_db().await;
    repository::make_semester_current(&db, SEMESTER)
        .await
        .expect("semester upsert failed");
    let c = course("c-1", "Data Structures", "40240533");
    repository::insert_course(&db, &c).await.expect("insert course failed");
    let hw1 = assignment(&c, "HW1", &due_in_days(10));
    let hw2 = assignment(&c, "HW2", &due_in_days(10));
    repository::insert_assignment(&db, &hw1)
        .await
        .expect("insert HW1 failed");
    repository::insert_assignment(&db, &hw2)
        .await
        .expect("insert HW2 failed");

    let todoist = Arc::new(FakeTodoist::default());
    todoist.fail_add_for(&task_content(&hw1.course_name_and_code, "HW1"));
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    // HW1's create fails; HW2 must still get its task in the same pass.
    let stats = service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.tasks_added, 1);
    let tasks = todoist.open_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].content, task_content(&hw2.course_name_and_code, "HW2"));
}

#[tokio::test]
async fn due_date_change_updates_the_existing_task() {
    let db = setup_db().await;
    let (c, a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("first sync failed");

    repository::update_assignment_details(
        &db,
        &c.course_id,
        &a.assignment_id,
        &due_in_days(12),
        &a.description,
        &a.annex_link,
    )
    .await
    .expect("details update failed");

    let second = service.sync_semester(SEMESTER).await.expect("second sync failed");
    assert_eq!(second.tasks_added, 0);
    assert_eq!(second.tasks_updated, 1);
    assert_eq!(todoist.open_tasks().len(), 1);
}

#[tokio::test]
async fn bootstrap_creates_project_sections_and_labels() {
    let db = setup_db().await;
    let (c, _a) = seed(&db, 10).await;
    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("sync failed");

    let state = todoist.state.lock().unwrap();
    assert_eq!(state.projects.len(), 1);
    assert_eq!(state.projects[0].name, SEMESTER);

    let mut section_names: Vec<&str> = state.sections.iter().map(|s| s.name.as_str()).collect();
    section_names.sort();
    assert_eq!(
        section_names,
        vec!["Activities", "Assignments", "Exams", "Projects"]
    );

    assert_eq!(state.labels.len(), 1);
    assert_eq!(state.labels[0].name, c.name_and_code());
    assert_eq!(state.labels[0].color, "berry_red");
    drop(state);

    // A second pass must not duplicate any of the structure.
    service.sync_semester(SEMESTER).await.expect("second sync failed");
    let state = todoist.state.lock().unwrap();
    assert_eq!(state.projects.len(), 1);
    assert_eq!(state.sections.len(), 4);
    assert_eq!(state.labels.len(), 1);
}

#[tokio::test]
async fn palette_index_only_advances_for_created_labels() {
    let db = setup_db().await;
    repository::make_semester_current(&db, SEMESTER)
        .await
        .expect("semester upsert failed");
    let c1 = course("c-1", "Data Structures", "40240533");
    let c2 = course("c-2", "Operating Systems", "30240283");
    repository::insert_course(&db, &c1).await.expect("insert c1 failed");
    repository::insert_course(&db, &c2).await.expect("insert c2 failed");

    let todoist = Arc::new(FakeTodoist::default());
    // c1's label already exists; the first created label must still take the
    // first palette color.
    todoist.seed_label(&c1.name_and_code(), "taupe");
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    service.sync_semester(SEMESTER).await.expect("sync failed");

    let state = todoist.state.lock().unwrap();
    let c2_label = state
        .labels
        .iter()
        .find(|l| l.name == c2.name_and_code())
        .expect("label for c2 missing");
    assert_eq!(c2_label.color, "berry_red");
}

#[tokio::test]
async fn mixed_batch_counts_each_outcome_independently() {
    let db = setup_db().await;
    repository::make_semester_current(&db, SEMESTER)
        .await
        .expect("semester upsert failed");
    let c = course("c-1", "Data Structures", "40240533");
    repository::insert_course(&db, &c).await.expect("insert course failed");

    let active = assignment(&c, "HW1", &due_in_days(10));
    let mut submitted = assignment(&c, "HW2", &due_in_days(10));
    submitted.is_submitted = true;
    repository::insert_assignment(&db, &active)
        .await
        .expect("insert HW1 failed");
    repository::insert_assignment(&db, &submitted)
        .await
        .expect("insert HW2 failed");

    let todoist = Arc::new(FakeTodoist::default());
    let service = TaskSyncService::new(db.clone(), todoist.clone());

    // HW1 gets a task; HW2 is submitted with no remote task, so nothing at all.
    let stats = service.sync_semester(SEMESTER).await.expect("sync failed");
    assert_eq!(stats.tasks_added, 1);
    assert_eq!(stats.tasks_updated, 0);
    assert_eq!(stats.failures, 0);
    assert_eq!(todoist.open_tasks().len(), 1);
}
