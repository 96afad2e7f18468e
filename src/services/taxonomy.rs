use tracing::info;

use crate::error::AppError;
use crate::models::Course;
use crate::todoist::TodoistClient;

/// Remote structure the sync engine works inside: the semester project and
/// its "Assignments" section.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    pub project_id: String,
    pub section_id: String,
}

pub const WORKING_SECTION: &str = "Assignments";
const EXTRA_SECTIONS: [&str; 3] = ["Exams", "Activities", "Projects"];

/// Fixed Todoist label palette, assigned cyclically in first-seen order.
pub const LABEL_COLORS: [&str; 20] = [
    "berry_red",
    "red",
    "orange",
    "yellow",
    "olive_green",
    "lime_green",
    "green",
    "mint_green",
    "teal",
    "sky_blue",
    "light_blue",
    "blue",
    "grape",
    "violet",
    "lavender",
    "magenta",
    "salmon",
    "charcoal",
    "grey",
    "taupe",
];

/// Ensures project, sections and course labels exist before task-level sync.
pub async fn ensure_taxonomy(
    todoist: &dyn TodoistClient,
    semester: &str,
    courses: &[Course],
) -> Result<Taxonomy, AppError> {
    let project_id = ensure_project(todoist, semester).await?;
    let section_id = ensure_sections(todoist, &project_id).await?;
    ensure_course_labels(todoist, courses).await?;
    Ok(Taxonomy {
        project_id,
        section_id,
    })
}

/// The project is named exactly after the semester string.
async fn ensure_project(todoist: &dyn TodoistClient, semester: &str) -> Result<String, AppError> {
    let projects = todoist.projects().await?;
    if let Some(project) = projects.into_iter().find(|p| p.name == semester) {
        info!(
            "using existing project {} for semester {}",
            project.id, semester
        );
        return Ok(project.id);
    }
    let project = todoist.add_project(semester).await?;
    info!(
        "created project {} for semester {}",
        project.id, semester
    );
    Ok(project.id)
}

/// Creates any missing section and resolves "Assignments" as the working one.
async fn ensure_sections(
    todoist: &dyn TodoistClient,
    project_id: &str,
) -> Result<String, AppError> {
    let sections = todoist.sections(project_id).await?;
    for name in EXTRA_SECTIONS {
        if !sections.iter().any(|s| s.name == name) {
            todoist.add_section(project_id, name).await?;
            info!("created section {} in project {}", name, project_id);
        }
    }
    if let Some(section) = sections.into_iter().find(|s| s.name == WORKING_SECTION) {
        return Ok(section.id);
    }
    let section = todoist.add_section(project_id, WORKING_SECTION).await?;
    Ok(section.id)
}

/// One label per course, colored from the palette. The palette index only
/// advances when a label is actually created, so re-runs keep colors stable.
async fn ensure_course_labels(
    todoist: &dyn TodoistClient,
    courses: &[Course],
) -> Result<(), AppError> {
    let labels = todoist.labels().await?;
    let mut color_index = 0usize;
    for course in courses {
        let name = course.name_and_code();
        if labels.iter().any(|l| l.name == name) {
            continue;
        }
        let color = LABEL_COLORS[color_index % LABEL_COLORS.len()];
        todoist.add_label(&name, color).await?;
        info!("created label '{}' with color {}", name, color);
        color_index += 1;
    }
    Ok(())
}
