use std::fs;
use std::path::Path;

use dicom::object::{open_file, DefaultDicomObject, ReadError, WriteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not read DICOM file {path}")]
    Read {
        path: String,
        #[source]
        source: ReadError,
    },
    #[error("could not create directory for {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write DICOM file {path}")]
    Write {
        path: String,
        #[source]
        source: WriteError,
    },
}

/// Parse a DICOM file, meta group included.
pub fn read_record(path: &Path) -> Result<DefaultDicomObject, CodecError> {
    open_file(path).map_err(|source| CodecError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Write a DICOM file, creating missing parent directories.
pub fn write_record(obj: &DefaultDicomObject, path: &Path) -> Result<(), CodecError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CodecError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    obj.write_to_file(path).map_err(|source| CodecError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Whether a path looks like a DICOM file by extension.
pub fn is_dicom_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dicom_extension_is_case_insensitive() {
        assert!(is_dicom_path(Path::new("a/b/IM0001.dcm")));
        assert!(is_dicom_path(Path::new("IM0001.DCM")));
        assert!(!is_dicom_path(Path::new("notes.txt")));
        assert!(!is_dicom_path(Path::new("DICOMDIR")));
    }

    #[test]
    fn unreadable_file_reports_read_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.dcm");
        fs::write(&path, b"not a dicom file").expect("write");
        assert!(matches!(read_record(&path), Err(CodecError::Read { .. })));
    }
}
