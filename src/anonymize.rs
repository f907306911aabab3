//
// anonymize.rs
// dicom-anon
//
// Per-record de-identification: date generalization, identifier substitution, private tag removal,
// attribute blanking and consistent UID remapping.
//

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use dicom::core::header::Header;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attributes::{
    is_class_uid_keyword, IDENTIFYING_ATTRIBUTES, PATIENT_BIRTH_DATE, PATIENT_ID, PATIENT_NAME,
    STUDY_DATE, STUDY_ID, STUDY_INSTANCE_UID,
};
use crate::codec;
use crate::record::{for_each_item_mut, keyword_of, remove_private_elements, Record, RecordAccess};
use crate::uid::{StudyLabeler, UidPseudonymizer};

/// Offset applied to every StudyDate of a run. Constant, so intervals between studies survive.
pub const DATE_SHIFT_DAYS: i64 = 30;

const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to rebuild file meta group: {0}")]
    FileMeta(String),
}

/// What the transform changed on one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub birth_date_generalized: bool,
    pub study_date_shifted: bool,
    pub private_removed: usize,
    pub attributes_blanked: usize,
    pub uids_remapped: usize,
}

fn unpad(value: &str) -> &str {
    value.trim_end_matches(['\0', ' '])
}

fn is_dicom_date(value: &str) -> bool {
    value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
}

/// `YYYYMMDD` becomes `YYYY0101`. Anything else yields `None`.
pub fn generalize_birth_date(value: &str) -> Option<String> {
    is_dicom_date(value).then(|| format!("{}0101", &value[..4]))
}

/// Shift a `YYYYMMDD` date by `days`. Invalid calendar dates yield `None`.
pub fn shift_date(value: &str, days: i64) -> Option<String> {
    if !is_dicom_date(value) {
        return None;
    }
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT).ok()?;
    let shifted = date.checked_add_signed(Duration::days(days))?;
    Some(shifted.format(DATE_FORMAT).to_string())
}

fn remap_uids(obj: &mut Record, uids: &mut UidPseudonymizer) -> usize {
    let targets: Vec<(Tag, VR)> = obj
        .iter()
        .filter(|e| e.vr() == VR::UI)
        .filter(|e| !keyword_of(e.tag()).is_some_and(is_class_uid_keyword))
        .map(|e| (e.tag(), e.vr()))
        .collect();

    let mut remapped = 0;
    for (tag, vr) in targets {
        let values: Vec<String> = match obj.element(tag).map(|e| e.to_multi_str()) {
            Ok(Ok(values)) => values.into_owned(),
            _ => continue,
        };
        let mapped: Vec<String> = values.iter().map(|v| uids.map(v)).collect();
        if mapped != values {
            remapped += 1;
        }
        obj.put(DataElement::new(tag, vr, PrimitiveValue::Strs(mapped.into())));
    }

    for_each_item_mut(obj, |item| remapped += remap_uids(item, uids));
    remapped
}

/// Anonymize the data set body in place.
///
/// Must be applied exactly once per original record: running it again shifts
/// dates a second time and remaps the already remapped UIDs.
pub fn anonymize_dataset(
    obj: &mut Record,
    anon_name: &str,
    uids: &mut UidPseudonymizer,
    studies: &mut StudyLabeler,
) -> TransformReport {
    let mut report = TransformReport::default();

    if let Some(birth) = obj.text(PATIENT_BIRTH_DATE) {
        if let Some(generalized) = generalize_birth_date(&birth) {
            obj.set_text(PATIENT_BIRTH_DATE, &generalized);
            report.birth_date_generalized = true;
        }
    }

    if let Some(study_date) = obj.text(STUDY_DATE).filter(|d| !d.is_empty()) {
        match shift_date(&study_date, DATE_SHIFT_DAYS) {
            Some(shifted) => {
                obj.set_text(STUDY_DATE, &shifted);
                report.study_date_shifted = true;
            }
            None => warn!("Leaving unparsable StudyDate {:?} unchanged", study_date),
        }
    }

    report.private_removed = remove_private_elements(obj);

    obj.set_text(PATIENT_NAME, anon_name);
    obj.set_text(PATIENT_ID, anon_name);

    let label = studies.label_for(obj.text(STUDY_INSTANCE_UID).as_deref());
    obj.set_text(STUDY_ID, &label);

    report.attributes_blanked = IDENTIFYING_ATTRIBUTES
        .iter()
        .filter(|attr| obj.blank(**attr))
        .count();

    report.uids_remapped = remap_uids(obj, uids);
    report
}

/// Anonymize a whole file object, including the MediaStorageSOPInstanceUID of the meta group.
pub fn anonymize_file(
    mut obj: DefaultDicomObject,
    anon_name: &str,
    uids: &mut UidPseudonymizer,
    studies: &mut StudyLabeler,
) -> Result<(DefaultDicomObject, TransformReport), TransformError> {
    let report = anonymize_dataset(&mut obj, anon_name, uids, studies);

    let meta = obj.meta();
    let mut builder = FileMetaTableBuilder::new()
        .transfer_syntax(unpad(&meta.transfer_syntax))
        .media_storage_sop_class_uid(unpad(&meta.media_storage_sop_class_uid))
        .media_storage_sop_instance_uid(uids.map(unpad(&meta.media_storage_sop_instance_uid)))
        .implementation_class_uid(unpad(&meta.implementation_class_uid));
    if let Some(version) = meta.implementation_version_name.as_deref() {
        builder = builder.implementation_version_name(unpad(version));
    }
    let meta = builder
        .build()
        .map_err(|e| TransformError::FileMeta(e.to_string()))?;

    let mut out = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj.into_inner() {
        out.put(elem);
    }
    Ok((out, report))
}

/// Anonymize a single file with fresh maps, defaulting the output to `*_anon.dcm`.
pub fn process_file(input: &Path, output: Option<&Path>, anon_name: &str) -> Result<()> {
    let obj = codec::read_record(input)
        .with_context(|| format!("Failed to open DICOM file {}", input.display()))?;

    let mut uids = UidPseudonymizer::new();
    let mut studies = StudyLabeler::new();
    let (anon, report) = anonymize_file(obj, anon_name, &mut uids, &mut studies)?;
    debug!(?report, "record anonymized");

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("record");
            input.with_file_name(format!("{stem}_anon.dcm"))
        }
    };

    codec::write_record(&anon, &output_path)?;
    info!("Anonymized file saved to {}", output_path.display());
    Ok(())
}
