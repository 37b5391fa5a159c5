use serde::{Deserialize, Deserializer, Serialize, Serializer};

use cask_core::{ArchiveError, Namespace, Result};

/// Archive format version carried in the prelude envelope.
pub const FORMAT_VERSION: i32 = 1;

/// Opaque byte blob encoded as a CBOR byte string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Serialize for Blob {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(<Vec<u8>>::deserialize(deserializer)?))
    }
}

/// Block header: opens a block for a namespace, or closes the namespace
/// entirely when `eof` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub database: String,
    pub collection: String,
    #[serde(default)]
    pub eof: bool,
}

impl BlockHeader {
    /// Header opening a data block for `namespace`.
    pub fn start(namespace: &Namespace) -> Self {
        Self {
            database: namespace.database().to_string(),
            collection: namespace.collection().to_string(),
            eof: false,
        }
    }

    /// Header closing `namespace` (the empty EOF block).
    pub fn eof(namespace: &Namespace) -> Self {
        Self {
            eof: true,
            ..Self::start(namespace)
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.collection)
    }

    /// Rejects headers with missing name components.
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(ArchiveError::Corrupt(
                "block header with empty database".into(),
            ));
        }
        if self.collection.is_empty() {
            return Err(ArchiveError::Corrupt(
                "block header with empty collection".into(),
            ));
        }
        Ok(())
    }
}

/// Prelude envelope record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub format_version: i32,
    /// Producer-side worker count, a hint for sizing the restore pool.
    pub concurrency_hint: i32,
    pub server_version: String,
}

impl ArchiveInfo {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(ArchiveError::Corrupt(format!(
                "unsupported archive format version {}",
                self.format_version
            )));
        }
        Ok(())
    }
}

/// One per-collection catalog entry in the prelude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub database: String,
    pub collection: String,
    /// Collection metadata (options, indexes), opaque to the archive core.
    pub metadata: Blob,
}

impl CatalogEntry {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.collection)
    }
}

/// Encodes a block header as CBOR after validation.
pub fn encode_header_cbor(header: &BlockHeader) -> Result<Vec<u8>> {
    header.validate()?;
    encode_cbor(header)
}

/// Decodes and validates a block header.
pub fn decode_header_cbor(bytes: &[u8]) -> Result<BlockHeader> {
    let header: BlockHeader = decode_cbor(bytes)?;
    header.validate()?;
    Ok(header)
}

/// Encodes the prelude envelope as CBOR after validation.
pub fn encode_info_cbor(info: &ArchiveInfo) -> Result<Vec<u8>> {
    info.validate()?;
    encode_cbor(info)
}

/// Decodes and validates the prelude envelope.
pub fn decode_info_cbor(bytes: &[u8]) -> Result<ArchiveInfo> {
    let info: ArchiveInfo = decode_cbor(bytes)?;
    info.validate()?;
    Ok(info)
}

/// Encodes a catalog entry as CBOR.
pub fn encode_catalog_entry_cbor(entry: &CatalogEntry) -> Result<Vec<u8>> {
    encode_cbor(entry)
}

/// Decodes a catalog entry.
pub fn decode_catalog_entry_cbor(bytes: &[u8]) -> Result<CatalogEntry> {
    decode_cbor(bytes)
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ArchiveError::Decode(e.to_string()))?;
    Ok(bytes)
}

fn decode_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ArchiveError::Decode(e.to_string()))
}
