//
// walk.rs
// dicom-anon
//
// Lazy depth-first traversal over every element of a record, descending into sequence items.
//

use dicom::core::header::Header;
use dicom::core::value::Value;
use dicom::core::VR;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::mem::InMemElement;

use crate::record::{keyword_of, Record};

type Element = InMemElement<StandardDataDictionary>;

/// One element reached by the walk, with its nesting depth (0 = top level).
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub element: &'a Element,
    pub depth: usize,
}

impl<'a> Visit<'a> {
    pub fn vr(&self) -> VR {
        self.element.vr()
    }

    pub fn keyword(&self) -> Option<&'static str> {
        keyword_of(self.element.tag())
    }
}

/// Depth-first iterator over a record's element tree.
///
/// Only one iterator per open nesting level is held, so memory grows with
/// depth rather than with element count. Call [`walk`] again to restart.
pub struct ElementWalk<'a> {
    stack: Vec<Box<dyn Iterator<Item = &'a Element> + 'a>>,
}

pub fn walk(record: &Record) -> ElementWalk<'_> {
    ElementWalk {
        stack: vec![Box::new(record.iter())],
    }
}

impl<'a> Iterator for ElementWalk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            match self.stack.last_mut()?.next() {
                Some(element) => {
                    if let Value::Sequence(seq) = element.value() {
                        self.stack
                            .push(Box::new(seq.items().iter().flat_map(|item| item.iter())));
                    }
                    return Some(Visit { element, depth });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
