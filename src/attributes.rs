//
// attributes.rs
// dicom-anon
//
// Fixed table of the DICOM attributes the anonymizer reads, rewrites or blanks.
//

use dicom::core::{Tag, VR};

/// A standard attribute addressed by keyword, with its tag and default VR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub keyword: &'static str,
    pub tag: Tag,
    pub vr: VR,
}

const fn attr(keyword: &'static str, group: u16, element: u16, vr: VR) -> Attribute {
    Attribute {
        keyword,
        tag: Tag(group, element),
        vr,
    }
}

pub const PATIENT_NAME: Attribute = attr("PatientName", 0x0010, 0x0010, VR::PN);
pub const PATIENT_ID: Attribute = attr("PatientID", 0x0010, 0x0020, VR::LO);
pub const PATIENT_BIRTH_DATE: Attribute = attr("PatientBirthDate", 0x0010, 0x0030, VR::DA);
pub const STUDY_DATE: Attribute = attr("StudyDate", 0x0008, 0x0020, VR::DA);
pub const STUDY_ID: Attribute = attr("StudyID", 0x0020, 0x0010, VR::SH);
pub const STUDY_INSTANCE_UID: Attribute = attr("StudyInstanceUID", 0x0020, 0x000D, VR::UI);
pub const STUDY_DESCRIPTION: Attribute = attr("StudyDescription", 0x0008, 0x1030, VR::LO);
pub const SOP_CLASS_UID: Attribute = attr("SOPClassUID", 0x0008, 0x0016, VR::UI);
pub const SOP_INSTANCE_UID: Attribute = attr("SOPInstanceUID", 0x0008, 0x0018, VR::UI);

/// Identifying attributes blanked on every record.
///
/// PatientName, PatientID and StudyDescription are deliberately absent: the
/// first two receive the anonymized name and the description is kept.
pub const IDENTIFYING_ATTRIBUTES: &[Attribute] = &[
    // Patient
    attr("OtherPatientIDs", 0x0010, 0x1000, VR::LO),
    attr("OtherPatientNames", 0x0010, 0x1001, VR::PN),
    attr("PatientBirthName", 0x0010, 0x1005, VR::PN),
    attr("PatientMotherBirthName", 0x0010, 0x1060, VR::PN),
    attr("PatientAddress", 0x0010, 0x1040, VR::LO),
    attr("PatientTelephoneNumbers", 0x0010, 0x2154, VR::SH),
    attr("PatientInsurancePlanCodeSequence", 0x0010, 0x0050, VR::SQ),
    attr("PatientComments", 0x0010, 0x4000, VR::LT),
    attr("EthnicGroup", 0x0010, 0x2160, VR::SH),
    attr("Occupation", 0x0010, 0x2180, VR::SH),
    attr("AdditionalPatientHistory", 0x0010, 0x21B0, VR::LT),
    attr("PatientReligiousPreference", 0x0010, 0x21F0, VR::LO),
    // People and roles
    attr("ResponsiblePerson", 0x0010, 0x2297, VR::PN),
    attr("ResponsiblePersonRole", 0x0010, 0x2298, VR::CS),
    attr("PersonName", 0x0040, 0xA123, VR::PN),
    attr("PerformingPhysicianName", 0x0008, 0x1050, VR::PN),
    attr("ReferringPhysicianName", 0x0008, 0x0090, VR::PN),
    attr("ReferringPhysicianAddress", 0x0008, 0x0092, VR::ST),
    attr("ReferringPhysicianTelephoneNumbers", 0x0008, 0x0094, VR::SH),
    attr("RequestingPhysician", 0x0032, 0x1032, VR::PN),
    attr("OperatorsName", 0x0008, 0x1070, VR::PN),
    attr("PhysiciansOfRecord", 0x0008, 0x1048, VR::PN),
    attr("PhysiciansReadingStudy", 0x0008, 0x1060, VR::PN),
    // Institution and equipment
    attr("InstitutionName", 0x0008, 0x0080, VR::LO),
    attr("InstitutionAddress", 0x0008, 0x0081, VR::ST),
    attr("InstitutionalDepartmentName", 0x0008, 0x1040, VR::LO),
    attr("StationName", 0x0008, 0x1010, VR::SH),
    attr("DeviceSerialNumber", 0x0018, 0x1000, VR::LO),
    attr("SoftwareVersions", 0x0018, 0x1020, VR::LO),
    // Scheduling and administrative identifiers
    attr("AccessionNumber", 0x0008, 0x0050, VR::SH),
    attr("IssuerOfPatientID", 0x0010, 0x0021, VR::LO),
    attr("IssuerOfAccessionNumberSequence", 0x0008, 0x0051, VR::SQ),
    attr("RequestingService", 0x0032, 0x1033, VR::LO),
    attr("AdmissionID", 0x0038, 0x0010, VR::LO),
    attr("InsurancePlanIdentification", 0x0010, 0x1050, VR::LO),
    attr("VisitComments", 0x0038, 0x4000, VR::LT),
    attr("ScheduledProcedureStepDescription", 0x0040, 0x0007, VR::LO),
    attr("RequestedProcedureDescription", 0x0032, 0x1060, VR::LO),
    attr("RequestedProcedureID", 0x0040, 0x1001, VR::SH),
    attr("RequestedProcedureLocation", 0x0040, 0x1005, VR::LO),
    // Free text
    attr("ProtocolName", 0x0018, 0x1030, VR::LO),
    attr("PerformedProcedureStepDescription", 0x0040, 0x0254, VR::LO),
    attr("StudyComments", 0x0032, 0x4000, VR::LT),
    // Geography
    attr("CountryOfResidence", 0x0010, 0x2150, VR::LO),
    attr("RegionOfResidence", 0x0010, 0x2152, VR::LO),
];

/// Look up a blanked attribute by its tag.
pub fn identifying_by_tag(tag: Tag) -> Option<&'static Attribute> {
    IDENTIFYING_ATTRIBUTES.iter().find(|a| a.tag == tag)
}

/// Class identifiers name a record type shared by many instances and must
/// survive UID remapping unchanged.
pub fn is_class_uid_keyword(keyword: &str) -> bool {
    keyword.ends_with("SOPClassUID") || keyword.ends_with("TransferSyntaxUID")
}
