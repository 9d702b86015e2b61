//! Ownership-tagged values.
//!
//! Every value on the operand stack and every builtin argument and result is
//! an [`Operand`]. `Owned` values belong to their holder and are released
//! when dropped; `Borrowed` values are views of storage owned elsewhere (a
//! frame local, a slot accessor, a parent container). Because heap payloads
//! are shared handles, dropping a borrowed view never frees the owner's data,
//! and release happens exactly once by construction.

use std::fmt;

use crate::value::Value;

/// A value together with its ownership.
#[derive(Clone, PartialEq)]
pub enum Operand {
    /// The holder owns the value and may mutate it in place.
    Owned(Value),
    /// The value is a view of storage owned elsewhere.
    Borrowed(Value),
}

impl Operand {
    /// Returns true for an owned value.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// The value, regardless of ownership.
    #[must_use]
    pub const fn value(&self) -> &Value {
        match self {
            Self::Owned(v) | Self::Borrowed(v) => v,
        }
    }

    /// Takes the value for modification.
    ///
    /// An owned value is moved out. A borrowed view is copied; shared heap
    /// payloads are duplicated lazily on first write, so the owner of the
    /// view never observes the change.
    #[must_use]
    pub fn into_owned(self) -> Value {
        match self {
            Self::Owned(v) | Self::Borrowed(v) => v,
        }
    }

    /// Produces a new owned copy, leaving `self` untouched.
    #[must_use]
    pub fn copy(&self) -> Operand {
        Self::Owned(self.value().clone())
    }

    /// Produces a borrowed view of this operand's value.
    #[must_use]
    pub fn view(&self) -> Operand {
        Self::Borrowed(self.value().clone())
    }

    /// Moves the value out, leaving an owned Nothing in its place.
    pub fn take(&mut self) -> Operand {
        std::mem::replace(self, Self::Owned(Value::Nothing))
    }
}

impl Default for Operand {
    fn default() -> Self {
        Self::Owned(Value::Nothing)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Owned(value)
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(v) => write!(f, "owned {v:?}"),
            Self::Borrowed(v) => write!(f, "borrowed {v:?}"),
        }
    }
}
