#![doc = "doge-report-core: retrieval and export pipeline for doge-report."]

//! This crate walks a paged DOGE API endpoint to exhaustion and writes the
//! aggregated records to disk as JSON or CSV.
//!
//! Data flows strictly downward:
//! the [`paginator`] drives the [`executor`] page by page, and the resulting
//! dataset is handed to the [`exporter`]. The trait seams between them live in
//! [`contract`] so each stage can be exercised on its own.
//!
//! # Usage
//! The `doge-report` binary crate resolves command-line and environment
//! configuration into a [`config::FetchConfig`] and [`config::ExportPlan`]
//! and calls into this crate; nothing here reads process-wide state.

pub mod config;
pub mod contract;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod exporter;
pub mod paginator;
