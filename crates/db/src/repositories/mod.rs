//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod analysis_request_repo;

pub use analysis_request_repo::AnalysisRequestRepo;
