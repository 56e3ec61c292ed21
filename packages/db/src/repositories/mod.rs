//! Repository implementations for database operations.

mod catalog_repo;
mod job_repo;

pub use catalog_repo::{CatalogRepository, SubjectRecord, UnitRecord, UnitSummaryRecord};
pub use job_repo::JobRepository;
