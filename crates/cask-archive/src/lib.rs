//! Concurrency layer of the archive format.
//!
//! `mux` packs the output of many producer threads into one byte sink,
//! `demux` splits one byte source back into per-namespace streams, and
//! `prelude` is the envelope written once before the multiplexed body.
//! Workers only ever see their own handle; the coordinator thread is the
//! sole owner of the underlying sink/source.

pub mod demux;
pub mod mux;
pub mod prelude;

pub use demux::{Demultiplexer, DemuxOut};
pub use mux::{Multiplexer, MuxIn};
pub use prelude::Prelude;
