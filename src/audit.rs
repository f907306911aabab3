use std::path::Path;

use anyhow::{Context, Result};
use dicom::core::header::Header;
use dicom::core::value::Value;
use dicom::core::VR;

use crate::attributes::{identifying_by_tag, is_class_uid_keyword};
use crate::codec;
use crate::record::{is_private, Record};
use crate::walk::{walk, Visit};

/// Residual identifying content found in a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub private_elements: usize,
    /// Keywords of blanked-set attributes that still hold a value, at any depth.
    pub populated_identifying: Vec<&'static str>,
    pub instance_uids: usize,
    pub class_uids: usize,
    pub max_depth: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.private_elements == 0 && self.populated_identifying.is_empty()
    }
}

fn has_content(visit: &Visit<'_>) -> bool {
    match visit.element.value() {
        Value::Primitive(p) => !p.to_str().trim_matches(['\0', ' ']).is_empty(),
        Value::Sequence(seq) => !seq.items().is_empty(),
        Value::PixelSequence(_) => true,
    }
}

pub fn audit_record(record: &Record) -> AuditReport {
    let mut report = AuditReport::default();
    for visit in walk(record) {
        let tag = visit.element.tag();
        report.max_depth = report.max_depth.max(visit.depth);

        if is_private(tag) {
            report.private_elements += 1;
        } else if let Some(attr) = identifying_by_tag(tag) {
            if has_content(&visit) && !report.populated_identifying.contains(&attr.keyword) {
                report.populated_identifying.push(attr.keyword);
            }
        }

        if visit.vr() == VR::UI {
            if visit.keyword().is_some_and(is_class_uid_keyword) {
                report.class_uids += 1;
            } else {
                report.instance_uids += 1;
            }
        }
    }
    report
}

pub fn audit_file(path: &Path) -> Result<AuditReport> {
    let obj = codec::read_record(path).context("Failed to open DICOM file")?;
    Ok(audit_record(&obj))
}

pub fn print_audit(path: &Path) -> Result<()> {
    let report = audit_file(path)?;
    println!("Audit of {}", path.display());
    println!("  Private elements:      {}", report.private_elements);
    println!("  Instance UIDs:         {}", report.instance_uids);
    println!("  Class UIDs:            {}", report.class_uids);
    println!("  Max nesting depth:     {}", report.max_depth);
    if report.populated_identifying.is_empty() {
        println!("  Identifying attributes: none populated");
    } else {
        println!(
            "  Identifying attributes: {}",
            report.populated_identifying.join(", ")
        );
    }
    println!("  Result: {}", if report.is_clean() { "clean" } else { "NOT clean" });
    Ok(())
}
