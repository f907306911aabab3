//
// anonymization_workflows.rs
// dicom-anon
//
// Integration tests running the batch driver over temporary patient trees and checking the
// written files and the persisted registry.
//

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN};
use dicom_anon::batch::{self, BatchConfig, BatchError};
use dicom_anon::progress::{NoProgress, ProgressEvent};
use dicom_anon::registry::{IdentityRegistry, PatientIdentityRecord, RegistryStore};
use tempfile::{tempdir, TempDir};

const MR_CLASS: &str = "1.2.840.10008.5.1.4.1.1.4";

struct Instance<'a> {
    study_uid: &'a str,
    series_uid: &'a str,
    sop_uid: &'a str,
}

fn write_instance(path: &Path, instance: &Instance<'_>, extra: Vec<DataElement<InMemDicomObject>>) {
    write_instance_as(path, EXPLICIT_VR_LITTLE_ENDIAN.uid(), instance, extra);
}

fn write_instance_as(
    path: &Path,
    transfer_syntax: &str,
    instance: &Instance<'_>,
    extra: Vec<DataElement<InMemDicomObject>>,
) {
    let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    let strings = [
        (Tag(0x0010, 0x0010), VR::PN, "Smith^John"),
        (Tag(0x0010, 0x0020), VR::LO, "H123456"),
        (Tag(0x0010, 0x0030), VR::DA, "19800615"),
        (Tag(0x0008, 0x0020), VR::DA, "20230101"),
        (Tag(0x0008, 0x0060), VR::CS, "MR"),
        (Tag(0x0008, 0x0016), VR::UI, MR_CLASS),
        (Tag(0x0008, 0x0018), VR::UI, instance.sop_uid),
        (Tag(0x0020, 0x000D), VR::UI, instance.study_uid),
        (Tag(0x0020, 0x000E), VR::UI, instance.series_uid),
        (Tag(0x0020, 0x0010), VR::SH, "ACC-991"),
        (Tag(0x0008, 0x1030), VR::LO, "MRI BRAIN WITH CONTRAST"),
    ];
    for (tag, vr, value) in strings {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }
    for elem in extra {
        obj.put(elem);
    }

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(MR_CLASS)
        .media_storage_sop_instance_uid(instance.sop_uid)
        .build()
        .expect("meta");

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    file_obj.write_to_file(path).expect("write test dicom");
}

fn simple(path: &Path, n: u32) {
    let sop = format!("1.2.826.0.1.3680043.2.1125.1.{n}");
    write_instance(
        path,
        &Instance {
            study_uid: "1.2.826.0.1.3680043.2.1125.100",
            series_uid: "1.2.826.0.1.3680043.2.1125.200",
            sop_uid: &sop,
        },
        Vec::new(),
    );
}

struct Workspace {
    _dir: TempDir,
    source: PathBuf,
    destination: PathBuf,
    store: RegistryStore,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("source");
        let destination = dir.path().join("destination");
        fs::create_dir_all(&source).expect("source");
        let store = RegistryStore::new(dir.path().join("home").join("dicom-anon-mapping.json"));
        Self {
            _dir: dir,
            source,
            destination,
            store,
        }
    }

    fn config(&self) -> BatchConfig {
        BatchConfig {
            source_root: self.source.clone(),
            destination_root: self.destination.clone(),
        }
    }

    fn run(&self) -> Result<(batch::BatchSummary, IdentityRegistry), BatchError> {
        let mut registry = self.store.load().expect("load registry");
        let summary = batch::run(&self.config(), &mut registry, &self.store, &mut NoProgress)?;
        Ok((summary, registry))
    }
}

fn text(obj: &DefaultDicomObject, tag: Tag) -> String {
    obj.element(tag)
        .expect("element present")
        .to_str()
        .expect("text value")
        .trim_end_matches(['\0', ' '])
        .to_string()
}

#[test]
fn scenario_a_first_run_creates_brain_0001() {
    let ws = Workspace::new();
    simple(&ws.source.join("7_Smith").join("session1").join("IM0001.dcm"), 1);

    let (summary, registry) = ws.run().expect("batch");
    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.valid_files(), 1);

    let out = ws
        .destination
        .join("Brain-0001")
        .join("session1")
        .join("IM0001.dcm");
    let anon = dicom::object::open_file(&out).expect("open anonymized");
    assert_eq!(text(&anon, Tag(0x0010, 0x0030)), "19800101");
    assert_eq!(text(&anon, Tag(0x0008, 0x0020)), "20230131");
    assert_eq!(text(&anon, Tag(0x0010, 0x0010)), "Brain-0001");
    assert_eq!(text(&anon, Tag(0x0010, 0x0020)), "Brain-0001");
    assert_eq!(text(&anon, Tag(0x0020, 0x0010)), "STUDY_0001");
    assert_eq!(text(&anon, Tag(0x0008, 0x1030)), "MRI BRAIN WITH CONTRAST");
    assert_eq!(text(&anon, Tag(0x0008, 0x0016)), MR_CLASS);

    // Envelope and body carry the same pseudonymized instance UID.
    let sop = text(&anon, Tag(0x0008, 0x0018));
    assert_ne!(sop, "1.2.826.0.1.3680043.2.1125.1.1");
    let meta = anon.meta();
    assert_eq!(meta.media_storage_sop_instance_uid.trim_end_matches('\0'), sop);
    assert_eq!(meta.media_storage_sop_class_uid.trim_end_matches('\0'), MR_CLASS);

    let record = registry.get(7).expect("registry row");
    assert_eq!(record.anon_patient_id, 1);
    assert_eq!(record.anon_patient_dir_name, "Brain-0001");
    assert_eq!(record.total_session_count, 1);
    assert_eq!(record.valid_file_count, 1);

    let persisted = ws.store.load().expect("reload");
    assert_eq!(persisted.get(7).map(|r| r.anon_patient_id), Some(1));
}

#[test]
fn scenario_b_rerun_accumulates_file_counts() {
    let ws = Workspace::new();
    let seeded = IdentityRegistry::from_records([PatientIdentityRecord {
        patient_id: 7,
        anon_patient_id: 1,
        anon_patient_dir_name: "Brain-0001".into(),
        total_session_count: 1,
        valid_file_count: 3,
        invalid_file_count: 0,
        last_updated: NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("timestamp"),
    }])
    .expect("seed rows");
    ws.store.save(&seeded).expect("seed registry");

    let patient = ws.source.join("7_Smith").join("session2");
    simple(&patient.join("IM0001.dcm"), 1);
    simple(&patient.join("IM0002.dcm"), 2);

    let (summary, registry) = ws.run().expect("batch");
    assert!(!summary.patients[0].is_new);

    let record = registry.get(7).expect("row");
    assert_eq!(record.anon_patient_id, 1);
    assert_eq!(record.valid_file_count, 5);
    assert_eq!(ws.store.load().expect("reload"), registry);
}

#[test]
fn scenario_c_malformed_directory_aborts_without_saving() {
    let ws = Workspace::new();
    simple(&ws.source.join("7_Smith").join("IM0001.dcm"), 1);
    simple(&ws.source.join("abc_Jones").join("IM0001.dcm"), 2);
    simple(&ws.source.join("b1_Later").join("IM0001.dcm"), 3);

    let err = ws.run().expect_err("batch must abort");
    assert!(matches!(
        err,
        BatchError::InvalidPatientDirectory { ref name, .. } if name == "abc_Jones"
    ));

    // Earlier patient output stays on disk; nothing for the bad or later directories.
    assert!(ws.destination.join("Brain-0001").join("IM0001.dcm").exists());
    let written: Vec<_> = fs::read_dir(&ws.destination).expect("dest").collect();
    assert_eq!(written.len(), 1);
    assert!(!ws.store.path().exists());
}

#[test]
fn blanking_scenario_empties_text_and_sequence_fields() {
    let ws = Workspace::new();
    let mut plan_item = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    plan_item.put(DataElement::new(
        Tag(0x0008, 0x0100),
        VR::SH,
        PrimitiveValue::from("PLAN-7"),
    ));
    write_instance(
        &ws.source.join("12_Doe").join("s1").join("IM0001.dcm"),
        &Instance {
            study_uid: "1.2.3.100",
            series_uid: "1.2.3.200",
            sop_uid: "1.2.3.300",
        },
        vec![
            DataElement::new(
                Tag(0x0040, 0x0254),
                VR::LO,
                PrimitiveValue::from("MRI for Mr Doe, ward 4"),
            ),
            DataElement::new(
                Tag(0x0010, 0x0050),
                VR::SQ,
                DataSetSequence::from(vec![plan_item]),
            ),
            DataElement::new(
                Tag(0x0008, 0x0080),
                VR::LO,
                PrimitiveValue::from("General Hospital"),
            ),
            DataElement::new(Tag(0x0029, 0x0010), VR::LO, PrimitiveValue::from("SIEMENS")),
        ],
    );

    ws.run().expect("batch");
    let anon = dicom::object::open_file(
        ws.destination
            .join("Brain-0001")
            .join("s1")
            .join("IM0001.dcm"),
    )
    .expect("open");

    assert_eq!(text(&anon, Tag(0x0040, 0x0254)), "");
    assert_eq!(text(&anon, Tag(0x0008, 0x0080)), "");
    let plan = anon.element(Tag(0x0010, 0x0050)).expect("sequence kept");
    assert!(plan.items().expect("sequence value").is_empty());
    assert_eq!(text(&anon, Tag(0x0008, 0x1030)), "MRI BRAIN WITH CONTRAST");
    assert!(anon.element(Tag(0x0029, 0x0010)).is_err());

    assert!(dicom_anon::audit::audit_record(&anon).is_clean());
}

#[test]
fn uids_stay_linked_across_files_and_patients_get_separate_buckets() {
    let ws = Workspace::new();
    let study = "1.2.3.100";
    let series = "1.2.3.200";
    for (n, sop) in ["1.2.3.301", "1.2.3.302"].iter().enumerate() {
        write_instance(
            &ws.source
                .join("7_Smith")
                .join("s1")
                .join(format!("IM000{}.dcm", n + 1)),
            &Instance {
                study_uid: study,
                series_uid: series,
                sop_uid: sop,
            },
            Vec::new(),
        );
    }
    write_instance(
        &ws.source.join("8_Jones").join("s1").join("IM0001.dcm"),
        &Instance {
            study_uid: "1.2.3.999",
            series_uid: "1.2.3.998",
            sop_uid: "1.2.3.997",
        },
        Vec::new(),
    );

    let (summary, registry) = ws.run().expect("batch");
    assert_eq!(summary.patients.len(), 2);
    assert_eq!(registry.get(8).map(|r| r.anon_patient_id), Some(2));

    let first_dir = ws.destination.join("Brain-0001").join("s1");
    let a = dicom::object::open_file(first_dir.join("IM0001.dcm")).expect("a");
    let b = dicom::object::open_file(first_dir.join("IM0002.dcm")).expect("b");
    let c = dicom::object::open_file(
        ws.destination
            .join("Brain-0002")
            .join("s1")
            .join("IM0001.dcm"),
    )
    .expect("c");

    // Same study/series: same pseudonym. Different instances: different pseudonyms.
    assert_eq!(text(&a, Tag(0x0020, 0x000D)), text(&b, Tag(0x0020, 0x000D)));
    assert_eq!(text(&a, Tag(0x0020, 0x000E)), text(&b, Tag(0x0020, 0x000E)));
    assert_ne!(text(&a, Tag(0x0008, 0x0018)), text(&b, Tag(0x0008, 0x0018)));
    assert_ne!(text(&a, Tag(0x0020, 0x000D)), study);

    assert_eq!(text(&a, Tag(0x0020, 0x0010)), "STUDY_0001");
    assert_eq!(text(&c, Tag(0x0020, 0x0010)), "STUDY_0002");
    assert_eq!(text(&c, Tag(0x0010, 0x0010)), "Brain-0002");
}

#[test]
fn implicit_vr_nested_references_follow_pseudonyms_and_lose_private_tags() {
    let ws = Workspace::new();
    let session = ws.source.join("7_Smith").join("s1");
    fn instance(sop_uid: &str) -> Instance<'_> {
        Instance {
            study_uid: "1.2.3.100",
            series_uid: "1.2.3.200",
            sop_uid,
        }
    }
    write_instance_as(
        &session.join("IM0001.dcm"),
        IMPLICIT_VR_LITTLE_ENDIAN.uid(),
        &instance("1.2.3.301"),
        Vec::new(),
    );

    let mut item = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    item.put(DataElement::new(
        Tag(0x0008, 0x1150),
        VR::UI,
        PrimitiveValue::from(MR_CLASS),
    ));
    item.put(DataElement::new(
        Tag(0x0008, 0x1155),
        VR::UI,
        PrimitiveValue::from("1.2.3.301"),
    ));
    item.put(DataElement::new(
        Tag(0x0029, 0x1010),
        VR::LO,
        PrimitiveValue::from("scanner note"),
    ));
    write_instance_as(
        &session.join("IM0002.dcm"),
        IMPLICIT_VR_LITTLE_ENDIAN.uid(),
        &instance("1.2.3.302"),
        vec![DataElement::new(
            Tag(0x0008, 0x1140),
            VR::SQ,
            DataSetSequence::from(vec![item]),
        )],
    );

    let (summary, _) = ws.run().expect("batch");
    assert_eq!(summary.valid_files(), 2);

    let out = ws.destination.join("Brain-0001").join("s1");
    let referenced = dicom::object::open_file(out.join("IM0001.dcm")).expect("referenced");
    let referencing = dicom::object::open_file(out.join("IM0002.dcm")).expect("referencing");

    let seq = referencing.element(Tag(0x0008, 0x1140)).expect("sequence");
    let items = seq.items().expect("items");
    assert_eq!(items.len(), 1);
    let nested_uid = items[0]
        .element(Tag(0x0008, 0x1155))
        .expect("nested reference")
        .to_str()
        .expect("uid text")
        .trim_end_matches(['\0', ' '])
        .to_string();
    assert_eq!(nested_uid, text(&referenced, Tag(0x0008, 0x0018)));
    assert_ne!(nested_uid, "1.2.3.301");
    assert!(items[0].element(Tag(0x0029, 0x1010)).is_err());
}

#[test]
fn unreadable_files_are_counted_and_progress_is_reported() {
    let ws = Workspace::new();
    let patient = ws.source.join("5_Brown").join("s1");
    simple(&patient.join("IM0001.dcm"), 1);
    fs::write(patient.join("IM0002.dcm"), b"corrupted").expect("write junk");
    fs::write(patient.join("README.txt"), b"ignored").expect("write txt");

    let mut events = Vec::new();
    let mut registry = ws.store.load().expect("load");
    let summary = batch::run(
        &ws.config(),
        &mut registry,
        &ws.store,
        &mut |event: ProgressEvent| events.push(event),
    )
    .expect("batch");

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.valid_files(), 1);
    assert_eq!(summary.invalid_files(), 1);
    let record = registry.get(5).expect("row");
    assert_eq!((record.valid_file_count, record.invalid_file_count), (1, 1));

    assert!(events.contains(&ProgressEvent::Counted { total: 2 }));
    assert!(events.contains(&ProgressEvent::FileProcessed {
        processed: 2,
        total: 2
    }));
    assert!(!ws
        .destination
        .join("Brain-0001")
        .join("s1")
        .join("IM0002.dcm")
        .exists());
}

#[test]
fn separate_runs_reuse_patient_bucket_but_not_uid_pseudonyms() {
    let ws = Workspace::new();
    simple(&ws.source.join("7_Smith").join("s1").join("IM0001.dcm"), 1);
    ws.run().expect("first run");
    let out = ws.destination.join("Brain-0001").join("s1").join("IM0001.dcm");
    let first = text(&dicom::object::open_file(&out).expect("first"), Tag(0x0020, 0x000D));

    let (summary, registry) = ws.run().expect("second run");
    let second = text(&dicom::object::open_file(&out).expect("second"), Tag(0x0020, 0x000D));

    assert!(!summary.patients[0].is_new);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(7).map(|r| r.valid_file_count), Some(2));
    // UID maps are scoped to a single batch.
    assert_ne!(first, second);
}
