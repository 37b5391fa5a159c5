use std::io::{Read, Write};

use cask_codec::frame::{read_magic, write_magic, write_record, write_terminator};
use cask_codec::parser::{BlockConsumer, BlockParser};
use cask_codec::record::{
    decode_catalog_entry_cbor, decode_info_cbor, encode_catalog_entry_cbor, encode_info_cbor,
    ArchiveInfo, CatalogEntry,
};
use cask_core::{ArchiveError, Namespace, Result};

/// Archive-level envelope: the magic number plus one block whose header is
/// the `ArchiveInfo` record and whose bodies are the catalog entries.
///
/// Written once before the multiplexed body; on restore its catalog tells
/// the orchestrator which consumer handles to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prelude {
    pub info: ArchiveInfo,
    pub catalog: Vec<CatalogEntry>,
}

impl Prelude {
    pub fn new(info: ArchiveInfo, catalog: Vec<CatalogEntry>) -> Self {
        Self { info, catalog }
    }

    /// Namespaces declared by the catalog, in catalog order.
    pub fn namespaces(&self) -> impl Iterator<Item = Namespace> + '_ {
        self.catalog.iter().map(CatalogEntry::namespace)
    }

    /// Writes the magic number and the prelude block.
    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        write_magic(sink)?;
        write_record(sink, &encode_info_cbor(&self.info)?)?;
        for entry in &self.catalog {
            write_record(sink, &encode_catalog_entry_cbor(entry)?)?;
        }
        write_terminator(sink)?;
        Ok(())
    }

    /// Reads the magic number and the prelude block, leaving `source`
    /// positioned at the first body block.
    pub fn read<R: Read>(source: &mut R) -> Result<Self> {
        read_magic(source)?;

        #[derive(Default)]
        struct Collect {
            info: Option<ArchiveInfo>,
            catalog: Vec<CatalogEntry>,
        }

        impl BlockConsumer for Collect {
            fn header(&mut self, payload: &[u8]) -> Result<()> {
                self.info = Some(decode_info_cbor(payload)?);
                Ok(())
            }

            fn body(&mut self, payload: &[u8]) -> Result<()> {
                self.catalog.push(decode_catalog_entry_cbor(payload)?);
                Ok(())
            }

            fn end(&mut self) -> Result<()> {
                Err(ArchiveError::Truncated("archive ended before the prelude"))
            }
        }

        let mut collect = Collect::default();
        BlockParser::new(source).read_block(&mut collect)?;
        let info = collect
            .info
            .ok_or(ArchiveError::Truncated("archive ended before the prelude"))?;
        Ok(Self {
            info,
            catalog: collect.catalog,
        })
    }
}
