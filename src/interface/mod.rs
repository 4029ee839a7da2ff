//! Module definitions for the rustkern interface
//!
//! ## Interface Module
//!
//! Wrappers around the concurrency primitive layer the kernel core is built
//! on. Primitives are imported only via `use` statements within these files
//! so that the rest of the crate consumes one small, vetted surface.

pub mod errnos;
mod sync;
mod types;
pub use errnos::*;
pub use sync::*;
pub use types::*;
