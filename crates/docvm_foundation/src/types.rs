//! Type tags and type masks.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The closed set of value type tags.
///
/// The discriminant doubles as the wire byte used by `numConvert` and the
/// bit position used by [`TypeMask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum TypeTag {
    /// Absence of a value.
    Nothing = 0,
    /// 32-bit signed integer.
    NumberInt32,
    /// 64-bit signed integer.
    NumberInt64,
    /// 64-bit binary floating point.
    NumberDouble,
    /// Decimal floating point.
    NumberDecimal,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Replication timestamp.
    Timestamp,
    /// Boolean.
    Boolean,
    /// Null.
    Null,
    /// Sorts below every other value.
    MinKey,
    /// Sorts above every other value.
    MaxKey,
    /// UTF-8 string.
    String,
    /// Heap array.
    Array,
    /// Heap array with set semantics.
    ArraySet,
    /// Heap array with multiset semantics.
    ArrayMultiSet,
    /// Heap object.
    Object,
    /// Object view over the compact wire encoding.
    BsonObject,
    /// Array view over the compact wire encoding.
    BsonArray,
    /// Code position of a compiled lambda.
    LocalLambda,
    /// Sort specification handle.
    SortSpec,
    /// Generated sort key components.
    SortKey,
    /// Collator handle.
    Collator,
    /// Timezone database handle.
    TimeZoneDb,
    /// Compiled regular expression.
    Regex,
    /// Column-store cell view.
    CsiCell,
}

impl TypeTag {
    /// All tags in discriminant order.
    pub const ALL: [TypeTag; 25] = [
        Self::Nothing,
        Self::NumberInt32,
        Self::NumberInt64,
        Self::NumberDouble,
        Self::NumberDecimal,
        Self::Date,
        Self::Timestamp,
        Self::Boolean,
        Self::Null,
        Self::MinKey,
        Self::MaxKey,
        Self::String,
        Self::Array,
        Self::ArraySet,
        Self::ArrayMultiSet,
        Self::Object,
        Self::BsonObject,
        Self::BsonArray,
        Self::LocalLambda,
        Self::SortSpec,
        Self::SortKey,
        Self::Collator,
        Self::TimeZoneDb,
        Self::Regex,
        Self::CsiCell,
    ];

    /// Decodes a tag from its byte representation.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Returns true for the numeric family.
    #[must_use]
    pub const fn is_number(self) -> bool {
        matches!(
            self,
            Self::NumberInt32 | Self::NumberInt64 | Self::NumberDouble | Self::NumberDecimal
        )
    }

    /// Returns true for strings.
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String)
    }

    /// Returns true for every array representation.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::Array | Self::ArraySet | Self::ArrayMultiSet | Self::BsonArray
        )
    }

    /// Returns true for every object representation.
    #[must_use]
    pub const fn is_object(self) -> bool {
        matches!(self, Self::Object | Self::BsonObject)
    }

    /// Returns true if the payload has no heap component.
    #[must_use]
    pub const fn is_shallow(self) -> bool {
        matches!(
            self,
            Self::Nothing
                | Self::NumberInt32
                | Self::NumberInt64
                | Self::NumberDouble
                | Self::NumberDecimal
                | Self::Date
                | Self::Timestamp
                | Self::Boolean
                | Self::Null
                | Self::MinKey
                | Self::MaxKey
                | Self::LocalLambda
        )
    }

    /// The bit this tag occupies in a [`TypeMask`].
    #[must_use]
    pub const fn mask(self) -> TypeMask {
        TypeMask(1 << (self as u32))
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::NumberInt32 => "NumberInt32",
            Self::NumberInt64 => "NumberInt64",
            Self::NumberDouble => "NumberDouble",
            Self::NumberDecimal => "NumberDecimal",
            Self::Date => "Date",
            Self::Timestamp => "Timestamp",
            Self::Boolean => "Boolean",
            Self::Null => "Null",
            Self::MinKey => "MinKey",
            Self::MaxKey => "MaxKey",
            Self::String => "String",
            Self::Array => "Array",
            Self::ArraySet => "ArraySet",
            Self::ArrayMultiSet => "ArrayMultiSet",
            Self::Object => "Object",
            Self::BsonObject => "bsonObject",
            Self::BsonArray => "bsonArray",
            Self::LocalLambda => "LocalLambda",
            Self::SortSpec => "sortSpec",
            Self::SortKey => "sortKey",
            Self::Collator => "collator",
            Self::TimeZoneDb => "timeZoneDB",
            Self::Regex => "pcreRegex",
            Self::CsiCell => "csiCell",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of type tags, tested by the `typeMatch` instruction and builtin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeMask(pub u32);

impl TypeMask {
    /// The empty mask.
    pub const NONE: TypeMask = TypeMask(0);

    /// Every numeric tag.
    pub const NUMBERS: TypeMask = TypeMask(
        TypeTag::NumberInt32.mask().0
            | TypeTag::NumberInt64.mask().0
            | TypeTag::NumberDouble.mask().0
            | TypeTag::NumberDecimal.mask().0,
    );

    /// Every array tag.
    pub const ARRAYS: TypeMask = TypeMask(
        TypeTag::Array.mask().0
            | TypeTag::ArraySet.mask().0
            | TypeTag::ArrayMultiSet.mask().0
            | TypeTag::BsonArray.mask().0,
    );

    /// Every object tag.
    pub const OBJECTS: TypeMask =
        TypeMask(TypeTag::Object.mask().0 | TypeTag::BsonObject.mask().0);

    /// Builds a mask from a list of tags.
    #[must_use]
    pub fn of(tags: &[TypeTag]) -> Self {
        tags.iter().fold(Self::NONE, |mask, tag| mask.with(*tag))
    }

    /// Adds a tag to the mask.
    #[must_use]
    pub const fn with(self, tag: TypeTag) -> Self {
        Self(self.0 | tag.mask().0)
    }

    /// Returns true if `tag` is in the mask.
    #[must_use]
    pub const fn contains(self, tag: TypeTag) -> bool {
        self.0 & tag.mask().0 != 0
    }
}
