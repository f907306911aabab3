//
// lib.rs
// dicom-anon
//
// Exposes the anonymization engine, its batch driver and the CLI entry point.
//

// Leaves first: attribute table and record access, then the run-scoped maps,
// the per-record transform, the registry and the batch driver.
pub mod anonymize;
pub mod attributes;
pub mod audit;
pub mod batch;
pub mod cli;
pub mod codec;
pub mod progress;
pub mod record;
pub mod registry;
pub mod uid;
pub mod walk;

pub use anonymize::{anonymize_dataset, anonymize_file, TransformReport};
pub use batch::{BatchConfig, BatchError, BatchSummary};
pub use cli::{run as run_cli, Cli, Commands};
pub use registry::{IdentityRegistry, PatientIdentityRecord, RegistryStore};
pub use uid::{StudyLabeler, UidPseudonymizer};
