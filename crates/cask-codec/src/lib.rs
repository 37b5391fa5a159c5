//! Wire grammar for the archive format.
//!
//! `frame` is the elementary record/terminator codec, `record` the fixed
//! CBOR schemas carried inside framed records, and `parser` the
//! Header→Body*→Terminator block state machine.

pub mod frame;
pub mod parser;
pub mod record;

pub use frame::{Frame, MAGIC_NUMBER, MAX_RECORD_LEN, MIN_RECORD_LEN, TERMINATOR};
pub use parser::{BlockConsumer, BlockParser};
pub use record::{ArchiveInfo, Blob, BlockHeader, CatalogEntry, FORMAT_VERSION};
