//! Path and MIME utilities.
//!
//! Pure functions, no side effects.

pub mod mime;
pub mod path;
