//! Deckport turns stored slide decks into downloadable PPTX and PDF files.
//!
//! Exports run asynchronously: the HTTP API records a job and queues it, a
//! worker renders the document and stores the artifact, and clients follow
//! progress by polling or over server-sent events.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
