pub mod assignment;
pub mod course;
pub mod schedule;
pub mod semester;

pub use assignment::{Assignment, ScrapedAssignment};
pub use course::{Course, ScrapedCourse};
pub use schedule::{CourseSchedule, ScheduleEntry};
pub use semester::Semester;
