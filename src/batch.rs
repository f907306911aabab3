//
// batch.rs
// dicom-anon
//
// Batch driver: walks `<source>/<id>_<name>/...`, anonymizes every DICOM file with run-wide
// UID and study maps, mirrors the tree under `<destination>/Brain-nnnn/...` and updates the
// identity registry.
//

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::anonymize::anonymize_file;
use crate::codec::{self, CodecError};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::registry::{anon_dir_name, IdentityRegistry, RegistryError, RegistryStore};
use crate::uid::{StudyLabeler, UidPseudonymizer};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid patient directory {name:?}: {reason}")]
    InvalidPatientDirectory { name: String, reason: String },
    #[error("failed to list {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(CodecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
}

/// Per-patient result of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientOutcome {
    pub patient_id: u64,
    pub anon_patient_id: u64,
    pub anon_dir: String,
    pub is_new: bool,
    pub valid_files: u64,
    pub invalid_files: u64,
    pub session_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_files: u64,
    pub patients: Vec<PatientOutcome>,
}

impl BatchSummary {
    pub fn valid_files(&self) -> u64 {
        self.patients.iter().map(|p| p.valid_files).sum()
    }

    pub fn invalid_files(&self) -> u64 {
        self.patients.iter().map(|p| p.invalid_files).sum()
    }
}

/// Parse `<digits>_<free text>` into the real patient id.
pub fn parse_patient_dir(name: &str) -> Result<u64, BatchError> {
    let invalid = |reason: String| BatchError::InvalidPatientDirectory {
        name: name.to_string(),
        reason,
    };
    let Some((id, _)) = name.split_once('_') else {
        return Err(invalid("expected '<patientID>_<name>' format".into()));
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("patient ID is not numeric: {id:?}")));
    }
    id.parse()
        .map_err(|_| invalid(format!("patient ID out of range: {id:?}")))
}

fn list_patient_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, BatchError> {
    let io_err = |source: std::io::Error| BatchError::Io {
        path: root.to_path_buf(),
        source,
    };
    let mut found = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            found.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

/// `*.dcm` files below a directory, in a stable order, and the entries the walk could not read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileScan {
    pub files: Vec<PathBuf>,
    pub unreadable: u64,
}

impl FileScan {
    pub fn total(&self) -> u64 {
        self.files.len() as u64 + self.unreadable
    }
}

pub fn dicom_files(dir: &Path) -> FileScan {
    let mut scan = FileScan::default();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(e) if e.file_type().is_file() && codec::is_dicom_path(e.path()) => {
                scan.files.push(e.into_path())
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot read {}: {}", e.path().unwrap_or(dir).display(), e);
                scan.unreadable += 1;
            }
        }
    }
    scan
}

/// Immediate subdirectories of a patient's output directory; zero if it was never created.
pub fn count_sessions(dir: &Path) -> std::io::Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut sessions = 0;
    for entry in entries {
        if entry?.file_type()?.is_dir() {
            sessions += 1;
        }
    }
    Ok(sessions)
}

/// Drives one batch over `config.source_root`.
///
/// The registry is saved exactly once, after every patient has been processed.
/// Any error returned before that point leaves the stored registry untouched.
pub fn run(
    config: &BatchConfig,
    registry: &mut IdentityRegistry,
    store: &RegistryStore,
    progress: &mut dyn ProgressSink,
) -> Result<BatchSummary, BatchError> {
    info!(
        "Anonymizing {} into {}",
        config.source_root.display(),
        config.destination_root.display()
    );

    progress.notify(ProgressEvent::Status("Counting files.".into()));
    let patient_dirs = list_patient_dirs(&config.source_root)?;
    let total_files: u64 = patient_dirs
        .par_iter()
        .map(|(_, path)| dicom_files(path).total())
        .sum();
    info!("{} files under {} patient directories", total_files, patient_dirs.len());
    progress.notify(ProgressEvent::Counted { total: total_files });

    let mut uids = UidPseudonymizer::new();
    let mut studies = StudyLabeler::new();
    let mut summary = BatchSummary {
        total_files,
        patients: Vec::with_capacity(patient_dirs.len()),
    };
    let mut processed = 0_u64;

    for (name, patient_path) in &patient_dirs {
        let patient_id = parse_patient_dir(name)?;
        let resolution = registry.resolve(patient_id);
        let anon_dir = anon_dir_name(resolution.anon_patient_id);
        let anon_path = config.destination_root.join(&anon_dir);
        if resolution.is_new {
            info!("Patient ID {} not seen previously - assigned {}", patient_id, anon_dir);
        } else {
            info!("Patient ID {} seen previously - appending to {}", patient_id, anon_dir);
        }
        progress.notify(ProgressEvent::PatientStarted {
            patient_id,
            anon_dir: anon_dir.clone(),
        });

        let scan = dicom_files(patient_path);
        let mut valid = 0_u64;
        let mut invalid = scan.unreadable;
        if scan.unreadable > 0 {
            processed += scan.unreadable;
            progress.notify(ProgressEvent::FileProcessed {
                processed,
                total: total_files,
            });
        }
        for source_file in scan.files {
            // Same relative path on both sides.
            let relative = source_file
                .strip_prefix(patient_path)
                .unwrap_or(&source_file);
            let target = anon_path.join(relative);

            match codec::read_record(&source_file) {
                Ok(obj) => match anonymize_file(obj, &anon_dir, &mut uids, &mut studies) {
                    Ok((anon, report)) => {
                        codec::write_record(&anon, &target).map_err(BatchError::Write)?;
                        debug!(file = %target.display(), ?report, "written");
                        valid += 1;
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", source_file.display(), e);
                        invalid += 1;
                    }
                },
                Err(e) => {
                    warn!("Skipping {}: {}", source_file.display(), e);
                    invalid += 1;
                }
            }

            processed += 1;
            progress.notify(ProgressEvent::FileProcessed {
                processed,
                total: total_files,
            });
        }

        let session_count = match count_sessions(&anon_path) {
            Ok(count) => count,
            Err(e) => {
                let kept = registry
                    .get(patient_id)
                    .map_or(0, |r| r.total_session_count);
                warn!(
                    "Cannot count sessions in {}: {} - keeping {}",
                    anon_path.display(),
                    e,
                    kept
                );
                kept
            }
        };
        progress.notify(ProgressEvent::Status("Updating the patient ID mapping.".into()));
        registry.update_stats(
            patient_id,
            session_count,
            valid,
            invalid,
            Local::now().naive_local(),
        )?;

        summary.patients.push(PatientOutcome {
            patient_id,
            anon_patient_id: resolution.anon_patient_id,
            anon_dir,
            is_new: resolution.is_new,
            valid_files: valid,
            invalid_files: invalid,
            session_count,
        });
    }

    progress.notify(ProgressEvent::Status("Saving the ID mapping file.".into()));
    store.save(registry)?;
    info!(
        "Finished: {} valid, {} invalid, {} UIDs and {} studies pseudonymized",
        summary.valid_files(),
        summary.invalid_files(),
        uids.len(),
        studies.len()
    );
    progress.notify(ProgressEvent::Status("Finished processing.".into()));
    Ok(summary)
}
