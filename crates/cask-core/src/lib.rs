//! Core CASK primitives shared across crates.
//!
//! Includes the namespace key type, the archive error taxonomy, and the
//! cancellation token used by the coordinator loops.

pub mod cancel;
pub mod error;
pub mod namespace;

pub use cancel::{Cancel, CancelWatch};
pub use error::{ArchiveError, Result};
pub use namespace::Namespace;
