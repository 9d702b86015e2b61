//! Sort specifications and generated sort keys.

use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collation::Collator;
use crate::compare::compare_values;
use crate::value::Value;

/// One component of a sort specification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortPart {
    /// Dotted field path.
    pub path: String,
    /// Ascending when true.
    pub ascending: bool,
}

/// An ordered list of sort components.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SortSpec {
    parts: Vec<SortPart>,
}

impl SortSpec {
    /// Creates an empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ascending component.
    #[must_use]
    pub fn asc(mut self, path: impl Into<String>) -> Self {
        self.parts.push(SortPart {
            path: path.into(),
            ascending: true,
        });
        self
    }

    /// Appends a descending component.
    #[must_use]
    pub fn desc(mut self, path: impl Into<String>) -> Self {
        self.parts.push(SortPart {
            path: path.into(),
            ascending: false,
        });
        self
    }

    /// The components in order.
    #[must_use]
    pub fn parts(&self) -> &[SortPart] {
        &self.parts
    }

    /// Compares two sort keys under this specification.
    ///
    /// With a single component the keys are plain values. With several, keys
    /// are arrays (or generated sort keys) holding one value per component.
    #[must_use]
    pub fn compare_keys(&self, a: &Value, b: &Value, collator: Option<&dyn Collator>) -> Ordering {
        match self.parts.as_slice() {
            [] => Ordering::Equal,
            [part] => directed(compare_values(a, b, collator), part.ascending),
            parts => {
                let (Some(xs), Some(ys)) = (components(a), components(b)) else {
                    return compare_values(a, b, collator);
                };
                for (i, part) in parts.iter().enumerate() {
                    let x = xs.get(i).unwrap_or(&Value::Null);
                    let y = ys.get(i).unwrap_or(&Value::Null);
                    let ord = directed(compare_values(x, y, collator), part.ascending);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
        }
    }

    /// Extracts the sort key of a document.
    ///
    /// When a path reaches several values through arrays, ascending components
    /// take the smallest and descending components the largest. Missing paths
    /// contribute Null.
    #[must_use]
    pub fn generate_key(&self, doc: &Value, collator: Option<&dyn Collator>) -> SortKey {
        let components = self
            .parts
            .iter()
            .map(|part| {
                let mut candidates = Vec::new();
                collect_path(doc, &part.path, &mut candidates);
                let best = if part.ascending {
                    candidates
                        .into_iter()
                        .min_by(|x, y| compare_values(x, y, collator))
                } else {
                    candidates
                        .into_iter()
                        .max_by(|x, y| compare_values(x, y, collator))
                };
                best.unwrap_or(Value::Null)
            })
            .collect();
        SortKey { components }
    }
}

fn directed(ord: Ordering, ascending: bool) -> Ordering {
    if ascending { ord } else { ord.reverse() }
}

fn components(key: &Value) -> Option<Vec<Value>> {
    match key {
        Value::SortKey(k) => Some(k.components().to_vec()),
        v if v.is_array() => Some(v.array_iter().collect()),
        _ => None,
    }
}

fn collect_path(value: &Value, path: &str, out: &mut Vec<Value>) {
    if path.is_empty() {
        if value.is_array() {
            out.extend(value.array_iter().filter(|v| !v.is_nothing()));
        } else if !value.is_nothing() {
            out.push(value.clone());
        }
        return;
    }
    let (head, rest) = path.split_once('.').unwrap_or((path, ""));
    if value.is_array() {
        for element in value.array_iter() {
            if element.is_object() {
                collect_path(&element, path, out);
            }
        }
    } else if let Some(child) = value.field(head) {
        collect_path(&child, rest, out);
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", part.path, if part.ascending { 1 } else { -1 })?;
        }
        write!(f, "}}")
    }
}

/// A generated sort key: one value per sort component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortKey {
    components: Vec<Value>,
}

impl SortKey {
    /// Creates a key from its components.
    #[must_use]
    pub fn new(components: Vec<Value>) -> Self {
        Self { components }
    }

    /// The key components.
    #[must_use]
    pub fn components(&self) -> &[Value] {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_direction() {
        let spec = SortSpec::new().desc("k");
        assert_eq!(
            spec.compare_keys(&Value::Int32(9), &Value::Int32(5), None),
            Ordering::Less
        );
        let spec = SortSpec::new().asc("k");
        assert_eq!(
            spec.compare_keys(&Value::Int32(9), &Value::Int32(5), None),
            Ordering::Greater
        );
    }

    #[test]
    fn compound_keys() {
        let spec = SortSpec::new().asc("a").desc("b");
        let x = Value::array([Value::Int32(1), Value::Int32(2)]);
        let y = Value::array([Value::Int32(1), Value::Int32(3)]);
        assert_eq!(spec.compare_keys(&x, &y, None), Ordering::Greater);
    }

    #[test]
    fn generate_key_through_arrays() {
        let doc = Value::object([(
            "a",
            Value::array([
                Value::object([("b", Value::Int32(4))]),
                Value::object([("b", Value::array([Value::Int32(1), Value::Int32(7)]))]),
            ]),
        )]);
        let asc = SortSpec::new().asc("a.b").generate_key(&doc, None);
        assert_eq!(asc.components(), [Value::Int32(1)]);
        let desc = SortSpec::new().desc("a.b").generate_key(&doc, None);
        assert_eq!(desc.components(), [Value::Int32(7)]);
        let missing = SortSpec::new().asc("z").generate_key(&doc, None);
        assert_eq!(missing.components(), [Value::Null]);
    }

    #[test]
    fn display() {
        assert_eq!(SortSpec::new().asc("a").desc("b.c").to_string(), "{a: 1, b.c: -1}");
    }
}
