use std::io::{ErrorKind, Read, Write};

use cask_core::{ArchiveError, Result};

/// Four-byte constant identifying the archive format, little-endian on the wire.
pub const MAGIC_NUMBER: u32 = 0x8199_e26d;
/// Sentinel length value closing a block.
pub const TERMINATOR: i32 = -1;
/// Smallest legal record: a four-byte length prefix, an empty payload, and
/// the trailing NUL.
pub const MIN_RECORD_LEN: i32 = 5;
/// Largest single record the format supports.
pub const MAX_RECORD_LEN: i32 = 16 * 1024 * 1024;

/// One framed unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Record payload with the length prefix and trailing NUL stripped.
    Record(Vec<u8>),
    /// The block-closing sentinel.
    Terminator,
}

/// Reads the next record or terminator.
///
/// Returns `Ok(None)` when the source ends cleanly before the length prefix.
/// End-of-input anywhere else is a truncation error. The record length
/// counts the prefix itself and the trailing NUL; the returned payload
/// carries neither.
pub fn read_frame<R: Read>(source: &mut R) -> Result<Option<Frame>> {
    let mut prefix = [0_u8; 4];
    if !read_full_or_clean_eof(source, &mut prefix)? {
        return Ok(None);
    }

    let len = i32::from_le_bytes(prefix);
    if len == TERMINATOR {
        return Ok(Some(Frame::Terminator));
    }
    if !(MIN_RECORD_LEN..=MAX_RECORD_LEN).contains(&len) {
        return Err(ArchiveError::Corrupt(format!(
            "record length {len} outside [{MIN_RECORD_LEN}, {MAX_RECORD_LEN}]"
        )));
    }

    // Remaining bytes: payload plus the trailing NUL.
    let mut rest = vec![0_u8; len as usize - 4];
    source.read_exact(&mut rest).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            ArchiveError::Truncated("inside record body")
        } else {
            ArchiveError::Io(err)
        }
    })?;
    match rest.pop() {
        Some(0) => Ok(Some(Frame::Record(rest))),
        _ => Err(ArchiveError::Corrupt(
            "record missing trailing NUL byte".into(),
        )),
    }
}

/// Frames `payload` as one record and writes it.
pub fn write_record<W: Write>(sink: &mut W, payload: &[u8]) -> Result<()> {
    let total = payload.len() + 5;
    if total > MAX_RECORD_LEN as usize {
        return Err(ArchiveError::Corrupt(format!(
            "record length {total} exceeds maximum {MAX_RECORD_LEN}"
        )));
    }
    sink.write_all(&(total as i32).to_le_bytes())?;
    sink.write_all(payload)?;
    sink.write_all(&[0])?;
    Ok(())
}

/// Writes the block-closing sentinel.
pub fn write_terminator<W: Write>(sink: &mut W) -> Result<()> {
    sink.write_all(&TERMINATOR.to_le_bytes())?;
    Ok(())
}

/// Writes the archive magic number.
pub fn write_magic<W: Write>(sink: &mut W) -> Result<()> {
    sink.write_all(&MAGIC_NUMBER.to_le_bytes())?;
    Ok(())
}

/// Reads and checks the archive magic number.
pub fn read_magic<R: Read>(source: &mut R) -> Result<()> {
    let mut magic = [0_u8; 4];
    source.read_exact(&mut magic).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            ArchiveError::BadMagic
        } else {
            ArchiveError::Io(err)
        }
    })?;
    if u32::from_le_bytes(magic) != MAGIC_NUMBER {
        return Err(ArchiveError::BadMagic);
    }
    Ok(())
}

/// Fills `buf`, returning `Ok(false)` if the source was already at
/// end-of-input, and a truncation error if it ends partway through.
fn read_full_or_clean_eof<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(ArchiveError::Truncated("inside record length prefix")),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ArchiveError::Io(err)),
        }
    }
    Ok(true)
}
