//! Shared data structures and validation for the task scheduling service
//!
//! This crate contains the wire-level task models, per-job parameter schemas,
//! configuration defaults, and small utilities used by the server crate.

pub mod api;
pub mod defaults;
pub mod params;
pub mod utils;

// Re-export commonly used types for convenience
pub use api::{ProgressInfo, TaskInfo, TaskStatus, TaskSummary};
pub use params::{validate_parameters, ValidationIssue};
pub use utils::validate_email;

#[cfg(test)]
mod tests {

    #[test]
    fn test_basic_imports() {
        // Smoke test to ensure all modules can be imported together
        assert!(crate::params::is_registered("compute_sum"));
    }
}
