mod context;
mod export;
mod queue;
mod reconcile;

pub use context::{ExportWorkerContext, job_failed};
pub use export::{
    ExportFailure, ExportOutcome, ExportWorkerError, handle_export_message, process_export_job,
};
pub use queue::{JobsExportQueue, enqueue_job};
pub use reconcile::{STALE_EXPORT_MESSAGE, reconcile_stale_exports, spawn_reconciler};
