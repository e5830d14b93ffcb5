//! Entity identifiers.

use std::fmt;

/// An entity id as accepted by [`crate::ModelType::lookup`].
///
/// Ids are stored as strings. Integers are formatted in decimal and an
/// absent id (`None`) becomes the empty string, so `lookup(None)` and
/// `lookup("")` name the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ModelId(String);

impl ModelId {
    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id, returning its string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&String> for ModelId {
    fn from(id: &String) -> Self {
        Self(id.clone())
    }
}

impl From<Option<&str>> for ModelId {
    fn from(id: Option<&str>) -> Self {
        id.map(Self::from).unwrap_or_default()
    }
}

impl From<Option<String>> for ModelId {
    fn from(id: Option<String>) -> Self {
        id.map(Self).unwrap_or_default()
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ModelId {
                fn from(id: $ty) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

impl_from_integer!(u32, u64, i32, i64);
