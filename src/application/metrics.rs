//! Metric names emitted by the export pipeline.

pub const METRIC_EXPORTS_SUBMITTED: &str = "deckport_exports_submitted_total";
pub const METRIC_EXPORTS_COMPLETED: &str = "deckport_exports_completed_total";
pub const METRIC_EXPORTS_FAILED: &str = "deckport_exports_failed_total";
pub const METRIC_EXPORT_RENDER_MS: &str = "deckport_export_render_ms";
pub const METRIC_EXPORTS_RECONCILED: &str = "deckport_exports_reconciled_total";
