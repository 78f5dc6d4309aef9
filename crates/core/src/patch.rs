//! Presence wrapper for partial updates.
//!
//! A JSON body can leave a field out, send it as `null`, or send a value. A bare
//! `Option<T>` collapses the first two, so update inputs use [`Patch`] instead:
//!
//! ```ignore
//! #[derive(Deserialize)]
//! struct UpdateItemInput {
//!     #[serde(default)]
//!     name: Patch<String>,
//! }
//! ```
//!
//! The `#[serde(default)]` is required: it is what turns a missing key into
//! [`Patch::Absent`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// The field was not sent; leave the stored value untouched.
    Absent,
    /// The field was sent as an explicit `null`.
    Null,
    /// The field was sent with a value.
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Null,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the key is present; a missing key goes through `Default`.
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(v) => serializer.serialize_some(v),
            Patch::Absent | Patch::Null => serializer.serialize_none(),
        }
    }
}
