//! Typed field descriptors.
//!
//! A field converts between a native value and the string stored in the
//! entity hash, validates values on the way in, and declares which index
//! structure it feeds.
//!
//! # Field Kinds
//!
//! | field | native value | index kind |
//! |---|---|---|
//! | [`Boolean`] | `bool` | exact |
//! | [`Text`] | `String` | exact |
//! | [`Email`] | `String` | exact (case-insensitive) |
//! | [`Password`] | `String` (digest on read) | exact |
//! | [`Reference`] | [`crate::Entity`] | exact |
//! | [`Integer`] | `i64` | range |
//! | [`Timestamp`] | `DateTime<Utc>` | range |
//!
//! Declaring a field does not index it: call [`Field::indexed`] or
//! [`Field::unique`] on it before registering the model.

mod boolean;
mod integer;
mod reference;
mod text;
mod timestamp;
mod traits;
mod value;

pub use boolean::Boolean;
pub use integer::Integer;
pub use reference::Reference;
pub use text::{Email, Password, Text};
pub use timestamp::Timestamp;
pub use traits::{Field, FieldOptions, FieldSpec, IndexKind, NewValue};
pub use value::FieldValue;

pub(crate) use traits::erase;
