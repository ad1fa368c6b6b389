//! Dependency manifest types.
//!
//! The manifest is supplied by the external package manager before a build
//! starts and lists where each sibling library was installed.

mod types;

pub use types::*;
