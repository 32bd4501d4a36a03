//! Application services: export submission, the export worker, and rendering.

pub mod error;
pub mod exports;
pub mod jobs;
pub mod metrics;
pub mod render;
pub mod repos;
