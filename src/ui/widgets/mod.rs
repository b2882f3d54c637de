// src/ui/widgets/mod.rs

pub mod disclaimer_popup; // Authorization notice shown at startup.
pub mod findings; // Findings of the selected scan.
pub mod footer; // Key hints and status line.
pub mod input; // Target and template fields.
pub mod log_view; // Tail of the log file.
pub mod scans; // Scan list.
pub mod summary; // Lifecycle and counts of the selected scan.
