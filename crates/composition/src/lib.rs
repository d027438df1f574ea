//! Splice Composition Model
//!
//! Defines the data contracts shared by every export phase:
//! - **Composition:** parallel sequences of clipped media items plus effects
//! - **Format:** the negotiated description of one audio or video track
//! - **Derived compositions:** the narrowed inputs used by the trim and
//!   resume optimizations
//!
//! All timestamps are microseconds. A clip without an end position runs to
//! the end of its source.

pub mod composition;
pub mod derive;
pub mod format;

pub use composition::*;
pub use format::*;
