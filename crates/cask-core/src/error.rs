use thiserror::Error;

use crate::namespace::Namespace;

/// Shared result alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error taxonomy for the archive subsystem.
///
/// Corruption and protocol violations are always fatal to the stream that
/// raised them; there is no partial-success mode.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Malformed bytes on the wire: bad record length, missing trailing
    /// NUL, terminator where a header was required, and similar.
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    /// The source did not start with the archive magic number.
    #[error("not a recognized archive (bad magic number)")]
    BadMagic,
    /// The source ended in the middle of a record or block.
    #[error("archive truncated: {0}")]
    Truncated(&'static str),
    /// Well-formed bytes arriving in an order the block grammar forbids,
    /// or naming a namespace the coordinator does not know.
    #[error("archive protocol violation: {0}")]
    Protocol(String),
    /// A consumer handed the demultiplexer a buffer smaller than the
    /// incoming body record.
    #[error("read buffer of {buffer} bytes cannot hold a {record}-byte record for {namespace}")]
    BufferTooSmall {
        namespace: Namespace,
        record: usize,
        buffer: usize,
    },
    /// The archive ended cleanly while namespaces were still open.
    #[error("archive ended with {0} namespace(s) still open")]
    UnfinishedNamespaces(usize),
    /// Header or catalog record bytes that do not decode to the fixed schema.
    #[error("record decode error: {0}")]
    Decode(String),
    /// The coordinator loop has already exited; the handle can make no
    /// further progress.
    #[error("archive coordinator shut down")]
    Shutdown,
    /// Aborted by an explicit cancellation token.
    #[error("archive operation cancelled")]
    Cancelled,
    /// Underlying sink/source failure. Never retried.
    #[error("archive i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Wraps an error with block-parsing positional context.
    pub fn in_block(self, block: u64) -> ArchiveError {
        match self {
            ArchiveError::Corrupt(msg) => {
                ArchiveError::Corrupt(format!("{msg} (block {block})"))
            }
            other => other,
        }
    }
}
