pub mod ingest;
pub mod task_sync;
pub mod taxonomy;

pub use ingest::{IngestService, IngestStats, ScheduleStats};
pub use task_sync::{TaskSyncService, TaskSyncStats};
pub use taxonomy::Taxonomy;
