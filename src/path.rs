//! Dotted field paths and their resolution against nested records.
//!
//! A [`FieldPath`] such as `.chapters.title` names a route through nested
//! JSON objects. When a route crosses a list, an [`IndexAssignment`] pins
//! which element to read: the assignment is keyed by the path that ends at
//! the list (`.chapters`), and every deeper reference beneath that list
//! picks the pinned element.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use crate::error::{QuarryError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// The empty path, which resolves to the record itself.
    pub fn root() -> Self {
        Self::default()
    }
    /// Parses `.a.b.c`. Every segment must be non-empty.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('.') else {
            return Err(QuarryError::Field {
                path: text.to_owned(),
                message: String::from("a field path starts with '.'"),
            });
        };
        let segments: Vec<String> = rest.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(QuarryError::Field {
                path: text.to_owned(),
                message: String::from("empty path segment"),
            });
        }
        Ok(Self { segments })
    }
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
    pub fn len(&self) -> usize {
        self.segments.len()
    }
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_owned());
        Self { segments }
    }
    /// Every non-empty prefix, shortest first, ending with the path itself.
    pub fn prefixes(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (1..=self.segments.len()).map(|depth| Self {
            segments: self.segments[..depth].to_vec(),
        })
    }
    /// Walks the record one segment at a time. Whenever the path so far is
    /// pinned by `indexes`, the pinned element of that list is selected
    /// before descending further.
    pub fn resolve<'r>(&self, record: &'r Value, indexes: &IndexAssignment) -> Result<&'r Value> {
        let mut current = record;
        for depth in 1..=self.segments.len() {
            let segment = &self.segments[depth - 1];
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| self.error(depth, "no such field"))?,
                Value::Array(_) => {
                    return Err(self.error(depth - 1, "list reached without an index assignment"));
                }
                _ => return Err(self.error(depth - 1, "cannot descend into a scalar")),
            };
            if let Some(index) = indexes.get(&self.segments[..depth]) {
                current = match current {
                    Value::Array(items) => items.get(index).ok_or_else(|| {
                        self.error(depth, &format!("index {} out of range for {} elements", index, items.len()))
                    })?,
                    _ => return Err(self.error(depth, "index assigned to a value that is not a list")),
                };
            }
        }
        Ok(current)
    }
    fn error(&self, depth: usize, message: &str) -> QuarryError {
        let prefix = Self {
            segments: self.segments[..depth].to_vec(),
        };
        QuarryError::Field {
            path: if prefix.is_root() { self.to_string() } else { prefix.to_string() },
            message: message.to_owned(),
        }
    }
}

impl Borrow<[String]> for FieldPath {
    fn borrow(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// Pins list-valued paths to one element each for a single iteration step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexAssignment {
    pins: BTreeMap<FieldPath, usize>,
}

impl IndexAssignment {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn pinned(boundary: FieldPath, index: usize) -> Self {
        let mut assignment = Self::new();
        assignment.pin(boundary, index);
        assignment
    }
    pub fn pin(&mut self, boundary: FieldPath, index: usize) {
        self.pins.insert(boundary, index);
    }
    pub fn get(&self, path: &[String]) -> Option<usize> {
        self.pins.get(path).copied()
    }
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// The set of field paths a generator depends on.
pub type RequirementSet = BTreeSet<FieldPath>;

/// Adds every prefix of every required path, so `.a.b.c` also admits
/// `.a` and `.a.b` during boundary discovery.
pub fn prefix_closure(requirements: &RequirementSet) -> RequirementSet {
    requirements.iter().flat_map(FieldPath::prefixes).collect()
}

/// Renders a resolved value the way it is substituted into text.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
