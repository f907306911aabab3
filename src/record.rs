use dicom::core::dictionary::DataDictionary;
use dicom::core::header::Header;
use dicom::core::value::{DataSetSequence, Value};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;

use crate::attributes::Attribute;

/// The data set body of a parsed DICOM file.
pub type Record = InMemDicomObject<StandardDataDictionary>;

/// Keyword-level access to a record, independent of how elements are stored.
pub trait RecordAccess {
    /// Trimmed string value, `None` when absent or not representable as text.
    fn text(&self, attr: Attribute) -> Option<String>;
    fn has(&self, attr: Attribute) -> bool;
    /// Insert or overwrite, keeping the VR of an existing element.
    fn set_text(&mut self, attr: Attribute, value: &str);
    /// Replace a present element with an empty value. Returns whether it was present.
    fn blank(&mut self, attr: Attribute) -> bool;
}

impl RecordAccess for Record {
    fn text(&self, attr: Attribute) -> Option<String> {
        self.element(attr.tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches(['\0', ' ']).trim_start().to_string())
    }

    fn has(&self, attr: Attribute) -> bool {
        self.element(attr.tag).is_ok()
    }

    fn set_text(&mut self, attr: Attribute, value: &str) {
        let vr = self.element(attr.tag).map(|e| e.vr()).unwrap_or(attr.vr);
        self.put(DataElement::new(attr.tag, vr, PrimitiveValue::from(value)));
    }

    fn blank(&mut self, attr: Attribute) -> bool {
        let Ok(vr) = self.element(attr.tag).map(|e| e.vr()) else {
            return false;
        };
        if vr == VR::SQ {
            self.put(DataElement::new(
                attr.tag,
                VR::SQ,
                DataSetSequence::<Record>::empty(),
            ));
        } else {
            self.put(DataElement::new(attr.tag, vr, PrimitiveValue::Empty));
        }
        true
    }
}

/// Standard keyword for a tag, if the dictionary knows it.
pub fn keyword_of(tag: Tag) -> Option<&'static str> {
    StandardDataDictionary.by_tag(tag).map(|e| e.alias)
}

pub fn is_private(tag: Tag) -> bool {
    tag.group() % 2 == 1
}

/// Apply `f` to every item of every sequence directly contained in `obj`.
///
/// Sequences and their items are rebuilt with undefined length, so the encoder
/// writes delimiters instead of lengths that no longer match the edited items.
pub fn for_each_item_mut(obj: &mut Record, mut f: impl FnMut(&mut Record)) {
    let sequences: Vec<Tag> = obj
        .iter()
        .filter(|e| matches!(e.value(), Value::Sequence(_)))
        .map(|e| e.tag())
        .collect();

    for tag in sequences {
        let Ok(elem) = obj.take_element(tag) else {
            continue;
        };
        let vr = elem.vr();
        let value = match elem.into_value() {
            Value::Sequence(seq) => {
                let items: Vec<Record> = seq
                    .into_items()
                    .into_iter()
                    .map(|mut item| {
                        f(&mut item);
                        Record::from_element_iter(item)
                    })
                    .collect();
                Value::from(DataSetSequence::from(items))
            }
            other => other,
        };
        obj.put(DataElement::new(tag, vr, value));
    }
}

/// Remove private elements at every nesting level. Returns the number removed.
pub fn remove_private_elements(obj: &mut Record) -> usize {
    let private: Vec<Tag> = obj
        .iter()
        .map(|e| e.tag())
        .filter(|tag| is_private(*tag))
        .collect();
    for tag in &private {
        obj.remove_element(*tag);
    }

    let mut removed = private.len();
    for_each_item_mut(obj, |item| removed += remove_private_elements(item));
    removed
}
