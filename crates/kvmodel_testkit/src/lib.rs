//! # KVModel Testkit
//!
//! Test utilities for KVModel.
//!
//! This crate provides:
//! - Fixtures: registries and a ready-made `User` model over an in-memory store
//! - Property-based test generators using proptest
//! - A harness that replays entity operations against a shadow model
//! - Stress testing utilities for concurrent saves and lookups
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kvmodel_testkit::prelude::*;
//!
//! #[test]
//! fn saves_user() {
//!     with_models(|m| {
//!         let user = m.user("1", "a@b.cd", 30);
//!         assert!(user.exists().unwrap());
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
