//
// registry.rs
// dicom-anon
//
// Durable mapping from real patient identifiers to anonymized identifiers, with per-patient
// processing statistics. Loaded once before a batch and saved once after it.
//

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Prefix of every anonymized patient directory.
pub const ANON_DIR_PREFIX: &str = "Brain";

/// File name of the registry inside the user's home directory.
pub const DEFAULT_REGISTRY_FILE: &str = "dicom-anon-mapping.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("patient {0} has not been resolved in this registry")]
    NotFound(u64),
    #[error("patient {0} appears more than once in the registry")]
    DuplicatePatient(u64),
    #[error("anonymized id {anon_patient_id} is assigned to both patient {first} and patient {second}")]
    DuplicateAnonId {
        anon_patient_id: u64,
        first: u64,
        second: u64,
    },
    #[error("registry I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry file {path} is not valid")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not replace registry file {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Directory name for an anonymized patient id, e.g. `Brain-0007`.
pub fn anon_dir_name(anon_patient_id: u64) -> String {
    format!("{ANON_DIR_PREFIX}-{anon_patient_id:04}")
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentityRecord {
    pub patient_id: u64,
    pub anon_patient_id: u64,
    pub anon_patient_dir_name: String,
    pub total_session_count: u64,
    pub valid_file_count: u64,
    pub invalid_file_count: u64,
    pub last_updated: NaiveDateTime,
}

/// Outcome of [`IdentityRegistry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub anon_patient_id: u64,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRegistry {
    records: BTreeMap<u64, PatientIdentityRecord>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the anonymized id of `patient_id`, allocating the next one if unseen.
    pub fn resolve(&mut self, patient_id: u64) -> Resolution {
        if let Some(existing) = self.records.get(&patient_id) {
            return Resolution {
                anon_patient_id: existing.anon_patient_id,
                is_new: false,
            };
        }

        let anon_patient_id = self
            .records
            .values()
            .map(|r| r.anon_patient_id)
            .max()
            .map_or(1, |max| max + 1);
        self.records.insert(
            patient_id,
            PatientIdentityRecord {
                patient_id,
                anon_patient_id,
                anon_patient_dir_name: anon_dir_name(anon_patient_id),
                total_session_count: 0,
                valid_file_count: 0,
                invalid_file_count: 0,
                last_updated: Local::now().naive_local(),
            },
        );
        debug!(patient_id, anon_patient_id, "allocated new anonymized patient id");
        Resolution {
            anon_patient_id,
            is_new: true,
        }
    }

    /// Overwrite the session count and add this run's file counts.
    pub fn update_stats(
        &mut self,
        patient_id: u64,
        session_count: u64,
        valid_delta: u64,
        invalid_delta: u64,
        timestamp: NaiveDateTime,
    ) -> Result<&PatientIdentityRecord, RegistryError> {
        let record = self
            .records
            .get_mut(&patient_id)
            .ok_or(RegistryError::NotFound(patient_id))?;
        record.total_session_count = session_count;
        record.valid_file_count += valid_delta;
        record.invalid_file_count += invalid_delta;
        record.last_updated = timestamp;
        Ok(record)
    }

    pub fn get(&self, patient_id: u64) -> Option<&PatientIdentityRecord> {
        self.records.get(&patient_id)
    }

    /// Records in ascending real patient id order.
    pub fn records(&self) -> impl Iterator<Item = &PatientIdentityRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IdentityRegistry {
    /// Build a registry from stored rows, rejecting repeated real or anonymized ids.
    pub fn from_records(
        rows: impl IntoIterator<Item = PatientIdentityRecord>,
    ) -> Result<Self, RegistryError> {
        let mut records = BTreeMap::new();
        let mut owners: BTreeMap<u64, u64> = BTreeMap::new();
        for row in rows {
            if let Some(&first) = owners.get(&row.anon_patient_id) {
                if first == row.patient_id {
                    return Err(RegistryError::DuplicatePatient(row.patient_id));
                }
                return Err(RegistryError::DuplicateAnonId {
                    anon_patient_id: row.anon_patient_id,
                    first,
                    second: row.patient_id,
                });
            }
            if records.contains_key(&row.patient_id) {
                return Err(RegistryError::DuplicatePatient(row.patient_id));
            }
            owners.insert(row.anon_patient_id, row.patient_id);
            records.insert(row.patient_id, row);
        }
        Ok(Self { records })
    }
}

/// JSON file holding the registry as a flat table of rows.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/dicom-anon-mapping.json`, falling back to the working directory.
    pub fn default_location() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(DEFAULT_REGISTRY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry; a missing file is the empty bootstrap state.
    pub fn load(&self) -> Result<IdentityRegistry, RegistryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No previous mapping at {} - starting empty", self.path.display());
                return Ok(IdentityRegistry::new());
            }
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let rows: Vec<PatientIdentityRecord> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| RegistryError::Json {
                path: self.path.clone(),
                source,
            })?;
        let count = rows.len();
        let registry = IdentityRegistry::from_records(rows)?;
        info!("Loaded {} patient mappings from {}", count, self.path.display());
        Ok(registry)
    }

    /// Replace the stored registry atomically: the previous file survives any failure.
    pub fn save(&self, registry: &IdentityRegistry) -> Result<(), RegistryError> {
        let io_err = |source: std::io::Error| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let rows: Vec<&PatientIdentityRecord> = registry.records().collect();
            serde_json::to_writer_pretty(&mut writer, &rows).map_err(|source| {
                RegistryError::Json {
                    path: self.path.clone(),
                    source,
                }
            })?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path)
            .map_err(|source| RegistryError::Persist {
                path: self.path.clone(),
                source,
            })?;
        info!("Saved {} patient mappings to {}", registry.len(), self.path.display());
        Ok(())
    }
}
