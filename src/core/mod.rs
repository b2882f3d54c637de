// src/core/mod.rs

// Everything below the operator console: the data model, tool execution,
// persistence and the scan pipeline itself.

/// Scans, finding records and the messages passed between pipeline parts.
pub mod models;

/// Normalizes operator-supplied targets into host and URL forms.
pub mod target;

/// Spawns the external recon tools and parses their JSON-lines output.
pub mod tool;

/// Persistence backends for scans and findings.
pub mod store;

/// The four scan stages, one tool each.
pub mod stages;

/// Chains the stages for one scan and records its terminal status.
pub mod pipeline;

/// Worker pool that runs queued scan jobs.
pub mod dispatch;

/// Scan creation and read-side queries for the console.
pub mod service;
