//! Column-store cell views.
//!
//! A cell holds every value found at one path of one document, flattened,
//! with the array nesting depth at which each value was found.

use crate::value::Value;

/// One entry of a cell.
#[derive(Clone, Debug, PartialEq)]
pub enum CellEntry {
    /// A scalar value at the path.
    Value(Value),
    /// An empty array at the path.
    EmptyArray,
    /// A sub-document at the path (its fields live in other cells).
    Object,
    /// A non-empty array whose contents are recorded one level deeper.
    NestedArray,
}

/// A flattened, depth-annotated view of the values at one path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CsiCell {
    entries: Vec<(u32, CellEntry)>,
    has_double_nested_arrays: bool,
}

impl CsiCell {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry found at array depth `depth`.
    #[must_use]
    pub fn with_entry(mut self, depth: u32, entry: CellEntry) -> Self {
        self.push(depth, entry);
        self
    }

    /// Appends a scalar value found at array depth `depth`.
    #[must_use]
    pub fn with_value(self, depth: u32, value: Value) -> Self {
        self.with_entry(depth, CellEntry::Value(value))
    }

    /// Builds a cell from a value found at the path, flattening arrays.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut cell = Self::new();
        cell.flatten(value, 0);
        cell
    }

    fn flatten(&mut self, value: &Value, depth: u32) {
        if value.is_array() {
            let mut elements = value.array_iter().peekable();
            if elements.peek().is_none() {
                self.push(depth, CellEntry::EmptyArray);
                return;
            }
            if depth > 0 {
                self.push(depth, CellEntry::NestedArray);
            }
            for element in elements {
                self.flatten(&element, depth + 1);
            }
        } else if value.is_object() {
            self.push(depth, CellEntry::Object);
        } else if !value.is_nothing() {
            self.push(depth, CellEntry::Value(value.clone()));
        }
    }

    fn push(&mut self, depth: u32, entry: CellEntry) {
        if depth > 1 {
            self.has_double_nested_arrays = true;
        }
        self.entries.push((depth, entry));
    }

    /// Returns true if some value sits more than one array level deep.
    #[must_use]
    pub fn has_double_nested_arrays(&self) -> bool {
        self.has_double_nested_arrays
    }

    /// Iterates scalar values regardless of depth.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|(_, e)| match e {
            CellEntry::Value(v) => Some(v),
            _ => None,
        })
    }

    /// Iterates entries with their depth.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &CellEntry)> {
        self.entries.iter().map(|(d, e)| (*d, e))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cell has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
