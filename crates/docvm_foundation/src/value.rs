//! Core tagged value type.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::cell::CsiCell;
use crate::collation::Collator;
use crate::collections::{Array, ArrayMultiSet, ArraySet, Object};
use crate::regex::CompiledRegex;
use crate::sort::{SortKey, SortSpec};
use crate::timezone::TimeZoneDb;
use crate::types::TypeTag;
use crate::wire::WireDoc;

/// Core value type evaluated by the VM.
///
/// Each variant carries its payload directly, so the tag and payload can never
/// disagree. Heap payloads are reference counted or persistent, which makes
/// `clone` O(1); a clone is how a borrowed view of a value is represented.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value. Produced by type mismatches, never an error.
    #[default]
    Nothing,
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit binary floating point.
    Double(f64),
    /// Decimal floating point.
    Decimal(Decimal),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Seconds in the high 32 bits, increment in the low 32 bits.
    Timestamp(u64),
    /// Sorts below every other value.
    MinKey,
    /// Sorts above every other value.
    MaxKey,
    /// UTF-8 string.
    String(Arc<str>),
    /// Heap array.
    Array(Array),
    /// Heap array with set semantics.
    ArraySet(ArraySet),
    /// Heap array with multiset semantics.
    ArrayMultiSet(ArrayMultiSet),
    /// Heap object.
    Object(Object),
    /// Object view over the compact wire encoding.
    BsonObject(WireDoc),
    /// Array view over the compact wire encoding.
    BsonArray(WireDoc),
    /// Absolute code position of a compiled lambda.
    LocalLambda(usize),
    /// Sort specification.
    SortSpec(Arc<SortSpec>),
    /// Generated sort key.
    SortKey(Arc<SortKey>),
    /// Collator handle.
    Collator(Arc<dyn Collator>),
    /// Timezone database handle.
    TimeZoneDb(Arc<TimeZoneDb>),
    /// Compiled regular expression.
    Regex(Arc<CompiledRegex>),
    /// Column-store cell view.
    CsiCell(Arc<CsiCell>),
}

/// Fixed per-value overhead used by memory accounting.
const VALUE_OVERHEAD: usize = 16;

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        match self {
            Self::Nothing => TypeTag::Nothing,
            Self::Null => TypeTag::Null,
            Self::Bool(_) => TypeTag::Boolean,
            Self::Int32(_) => TypeTag::NumberInt32,
            Self::Int64(_) => TypeTag::NumberInt64,
            Self::Double(_) => TypeTag::NumberDouble,
            Self::Decimal(_) => TypeTag::NumberDecimal,
            Self::Date(_) => TypeTag::Date,
            Self::Timestamp(_) => TypeTag::Timestamp,
            Self::MinKey => TypeTag::MinKey,
            Self::MaxKey => TypeTag::MaxKey,
            Self::String(_) => TypeTag::String,
            Self::Array(_) => TypeTag::Array,
            Self::ArraySet(_) => TypeTag::ArraySet,
            Self::ArrayMultiSet(_) => TypeTag::ArrayMultiSet,
            Self::Object(_) => TypeTag::Object,
            Self::BsonObject(_) => TypeTag::BsonObject,
            Self::BsonArray(_) => TypeTag::BsonArray,
            Self::LocalLambda(_) => TypeTag::LocalLambda,
            Self::SortSpec(_) => TypeTag::SortSpec,
            Self::SortKey(_) => TypeTag::SortKey,
            Self::Collator(_) => TypeTag::Collator,
            Self::TimeZoneDb(_) => TypeTag::TimeZoneDb,
            Self::Regex(_) => TypeTag::Regex,
            Self::CsiCell(_) => TypeTag::CsiCell,
        }
    }

    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    /// Creates an array value from an iterator of values.
    #[must_use]
    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(values.into_iter().collect())
    }

    /// Creates an object value from `(name, value)` pairs.
    #[must_use]
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true if this is `Nothing`.
    #[must_use]
    pub const fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Returns true for Null and Nothing.
    #[must_use]
    pub const fn is_nullish(&self) -> bool {
        matches!(self, Self::Nothing | Self::Null)
    }

    /// Returns true for the numeric family.
    #[must_use]
    pub const fn is_number(&self) -> bool {
        self.tag().is_number()
    }

    /// Returns true for every array representation.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        self.tag().is_array()
    }

    /// Returns true for every object representation.
    #[must_use]
    pub const fn is_object(&self) -> bool {
        self.tag().is_object()
    }

    /// Returns true for strings.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns the boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the heap array payload.
    #[must_use]
    pub const fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the heap object payload.
    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the collator handle.
    #[must_use]
    pub fn as_collator(&self) -> Option<&dyn Collator> {
        match self {
            Self::Collator(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    /// Returns an integral payload as `i64`.
    ///
    /// Doubles and decimals qualify when they hold an exact integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        crate::numeric::exact_i64(self)
    }

    /// Returns a numeric payload as `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        crate::numeric::to_f64(self)
    }

    /// Iterates the elements of any array representation.
    ///
    /// Non-arrays yield nothing.
    pub fn array_iter(&self) -> impl Iterator<Item = Value> + '_ {
        let iter: Box<dyn Iterator<Item = Value> + '_> = match self {
            Self::Array(a) => Box::new(a.iter().cloned()),
            Self::ArraySet(s) => Box::new(s.iter().cloned()),
            Self::ArrayMultiSet(m) => Box::new(m.iter().cloned()),
            Self::BsonArray(doc) => Box::new(doc.iter().map(|(_, v)| v)),
            _ => Box::new(std::iter::empty()),
        };
        iter
    }

    /// Number of elements in any array representation.
    #[must_use]
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Self::Array(a) => Some(a.len()),
            Self::ArraySet(s) => Some(s.len()),
            Self::ArrayMultiSet(m) => Some(m.len()),
            Self::BsonArray(doc) => Some(doc.iter().count()),
            _ => None,
        }
    }

    /// Iterates `(name, value)` pairs of any object representation.
    pub fn object_iter(&self) -> impl Iterator<Item = (String, Value)> + '_ {
        let iter: Box<dyn Iterator<Item = (String, Value)> + '_> = match self {
            Self::Object(o) => Box::new(o.iter().map(|(k, v)| (k.clone(), v.clone()))),
            Self::BsonObject(doc) => Box::new(doc.iter().map(|(k, v)| (k.to_string(), v))),
            _ => Box::new(std::iter::empty()),
        };
        iter
    }

    /// Looks up a field of any object representation.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Object(o) => o.get(name).cloned(),
            Self::BsonObject(doc) => doc.get_field(name),
            _ => None,
        }
    }

    /// Looks up an element of any array representation.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<Value> {
        match self {
            Self::Array(a) => a.get(index).cloned(),
            Self::ArraySet(s) => s.get_index(index).cloned(),
            Self::ArrayMultiSet(_) => self.array_iter().nth(index),
            Self::BsonArray(doc) => doc.get_element(index),
            _ => None,
        }
    }

    /// Converts wire views and set/multiset arrays into heap containers.
    ///
    /// Nested wire views are converted as well; other values are returned as is.
    #[must_use]
    pub fn to_heap(&self) -> Value {
        match self {
            Self::BsonObject(doc) => Self::Object(
                doc.iter()
                    .map(|(k, v)| (k.to_string(), v.to_heap()))
                    .collect(),
            ),
            Self::BsonArray(doc) => Self::Array(doc.iter().map(|(_, v)| v.to_heap()).collect()),
            Self::ArraySet(_) | Self::ArrayMultiSet(_) => Self::Array(self.array_iter().collect()),
            other => other.clone(),
        }
    }

    /// Approximate heap footprint in bytes, used by capped accumulators.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        VALUE_OVERHEAD
            + match self {
                Self::String(s) => s.len(),
                Self::Array(a) => a.iter().map(Value::approx_size).sum(),
                Self::ArraySet(s) => s.iter().map(Value::approx_size).sum(),
                Self::ArrayMultiSet(m) => m.iter().map(Value::approx_size).sum(),
                Self::Object(o) => o.iter().map(|(k, v)| k.len() + v.approx_size()).sum(),
                Self::BsonObject(doc) | Self::BsonArray(doc) => doc.as_bytes().len(),
                Self::SortKey(key) => key.components().iter().map(Value::approx_size).sum(),
                Self::Regex(re) => re.pattern().len(),
                Self::CsiCell(cell) => cell.len() * VALUE_OVERHEAD,
                _ => 0,
            }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nothing, Self::Nothing)
            | (Self::Null, Self::Null)
            | (Self::MinKey, Self::MinKey)
            | (Self::MaxKey, Self::MaxKey) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) | (Self::Date(a), Self::Date(b)) => a == b,
            // Bit equality, so NaN == NaN
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::ArraySet(a), Self::ArraySet(b)) => a == b,
            (Self::ArrayMultiSet(a), Self::ArrayMultiSet(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::BsonObject(a), Self::BsonObject(b)) | (Self::BsonArray(a), Self::BsonArray(b)) => {
                a.as_bytes() == b.as_bytes()
            }
            (Self::LocalLambda(a), Self::LocalLambda(b)) => a == b,
            (Self::SortSpec(a), Self::SortSpec(b)) => a == b,
            (Self::SortKey(a), Self::SortKey(b)) => a == b,
            (Self::Collator(a), Self::Collator(b)) => Arc::ptr_eq(a, b),
            (Self::TimeZoneDb(a), Self::TimeZoneDb(b)) => Arc::ptr_eq(a, b),
            (Self::Regex(a), Self::Regex(b)) => a == b,
            (Self::CsiCell(a), Self::CsiCell(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Collator(c) => write!(f, "collator({c:?})"),
            Self::TimeZoneDb(_) => write!(f, "timeZoneDB"),
            Self::CsiCell(cell) => write!(f, "{cell:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "Nothing"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}L"),
            Self::Double(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Decimal(d) => write!(f, "NumberDecimal({d})"),
            Self::Date(ms) => write!(f, "Date({ms})"),
            Self::Timestamp(ts) => write!(f, "Timestamp({}, {})", ts >> 32, ts & 0xFFFF_FFFF),
            Self::MinKey => write!(f, "MinKey"),
            Self::MaxKey => write!(f, "MaxKey"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Array(_) | Self::ArraySet(_) | Self::ArrayMultiSet(_) | Self::BsonArray(_) => {
                write!(f, "[")?;
                for (i, v) in self.array_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Object(_) | Self::BsonObject(_) => {
                write!(f, "{{")?;
                for (i, (k, v)) in self.object_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::LocalLambda(pos) => write!(f, "LocalLambda({pos})"),
            Self::SortSpec(spec) => write!(f, "SortSpec({spec})"),
            Self::SortKey(key) => write!(f, "SortKey({:?})", key.components()),
            Self::Collator(_) => write!(f, "Collator"),
            Self::TimeZoneDb(_) => write!(f, "TimeZoneDB"),
            Self::Regex(re) => write!(f, "/{}/{}", re.pattern(), re.flags()),
            Self::CsiCell(_) => write!(f, "CsiCell"),
        }
    }
}

// Convenience From implementations

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}
