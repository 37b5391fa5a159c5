use std::collections::HashMap;
use std::io::Read;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, warn};

use cask_codec::parser::{BlockConsumer, BlockParser};
use cask_codec::record::decode_header_cbor;
use cask_core::{ArchiveError, CancelWatch, Namespace, Result};

/// Per-namespace channel pair between the demultiplexer and one reader.
///
/// Zero-capacity on both sides: handing a body record over is a rendezvous,
/// so a slow reader stalls the demultiplexer (but no data is buffered).
/// The demultiplexer owns the data sender and closes a lane by dropping it;
/// the reader observes the disconnect as end-of-stream.
struct Lane {
    data_tx: Sender<Vec<u8>>,
    ack_rx: Receiver<Result<usize>>,
}

/// Fan-out coordinator: routes each body record of one archive stream to
/// the consumer handle registered for the block's namespace.
///
/// Every expected namespace must be opened before `run`; `run` consumes the
/// demultiplexer.
#[derive(Default)]
pub struct Demultiplexer {
    lanes: HashMap<Namespace, Lane>,
    current: Option<Namespace>,
    cancel: Option<CancelWatch>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like `new`, but `run` aborts with `Cancelled` when the watch fires.
    pub fn with_cancel(cancel: CancelWatch) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }

    /// Registers a consumer handle for `namespace`.
    pub fn open(&mut self, namespace: Namespace) -> Result<DemuxOut> {
        if self.lanes.contains_key(&namespace) {
            return Err(ArchiveError::Protocol(format!(
                "namespace {namespace} already has an open consumer"
            )));
        }
        let (data_tx, data_rx) = bounded(0);
        let (ack_tx, ack_rx) = bounded(0);
        self.lanes.insert(namespace.clone(), Lane { data_tx, ack_rx });
        Ok(DemuxOut {
            namespace,
            data: data_rx,
            acks: ack_tx,
        })
    }

    /// Parses the archive body from `source`, routing records to readers.
    ///
    /// Before returning an error, every lane is dropped so blocked readers
    /// wake with end-of-stream instead of hanging.
    pub fn run<R: Read>(mut self, source: R) -> Result<()> {
        let mut parser = BlockParser::new(source);
        let result = parser.read_all_blocks(&mut self);
        if let Err(ref err) = result {
            warn!(error = %err, "demultiplexer aborted; unblocking consumers");
            self.lanes.clear();
        }
        result
    }

    fn deliver(&self, namespace: &Namespace, payload: &[u8]) -> Result<()> {
        let lane = self.lanes.get(namespace).ok_or_else(|| {
            ArchiveError::Protocol(format!("no open consumer for namespace {namespace}"))
        })?;

        let bytes = payload.to_vec();
        match &self.cancel {
            None => lane.data_tx.send(bytes).map_err(|_| reader_gone(namespace))?,
            Some(watch) => select! {
                send(lane.data_tx, bytes) -> sent => {
                    sent.map_err(|_| reader_gone(namespace))?;
                }
                recv(watch.receiver()) -> _ => return Err(ArchiveError::Cancelled),
            },
        }

        match lane.ack_rx.recv() {
            Ok(Ok(copied)) => {
                debug_assert_eq!(copied, payload.len());
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(reader_gone(namespace)),
        }
    }
}

fn reader_gone(namespace: &Namespace) -> ArchiveError {
    ArchiveError::Protocol(format!("consumer for namespace {namespace} hung up"))
}

impl BlockConsumer for Demultiplexer {
    fn header(&mut self, payload: &[u8]) -> Result<()> {
        let header = decode_header_cbor(payload)?;
        let namespace = header.namespace();
        if !self.lanes.contains_key(&namespace) {
            // Covers both "never declared" and "already closed".
            return Err(ArchiveError::Protocol(format!(
                "unexpected namespace {namespace} in archive"
            )));
        }
        if header.eof {
            // Dropping the lane's data sender is the end-of-stream signal.
            self.lanes.remove(&namespace);
            self.current = None;
            debug!(%namespace, live = self.lanes.len(), "namespace closed");
        } else {
            self.current = Some(namespace);
        }
        Ok(())
    }

    fn body(&mut self, payload: &[u8]) -> Result<()> {
        let namespace = self.current.clone().ok_or_else(|| {
            ArchiveError::Corrupt("body record outside any open block".into())
        })?;
        self.deliver(&namespace, payload)
    }

    fn end(&mut self) -> Result<()> {
        if self.lanes.is_empty() {
            Ok(())
        } else {
            Err(ArchiveError::UnfinishedNamespaces(self.lanes.len()))
        }
    }
}

/// Consumer handle for one namespace.
///
/// `read` blocks until the demultiplexer has a record for this namespace;
/// a handle is owned by exactly one worker thread.
pub struct DemuxOut {
    namespace: Namespace,
    data: Receiver<Vec<u8>>,
    acks: Sender<Result<usize>>,
}

impl DemuxOut {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Receives the next body record into `buf`.
    ///
    /// Returns `Some(n)` with the record length (zero for an empty record)
    /// or `None` once the namespace has been closed. A buffer smaller than
    /// the incoming record fails both this call and the demultiplexer.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let bytes = match self.data.recv() {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };

        if bytes.len() > buf.len() {
            let too_small = || ArchiveError::BufferTooSmall {
                namespace: self.namespace.clone(),
                record: bytes.len(),
                buffer: buf.len(),
            };
            let _ = self.acks.send(Err(too_small()));
            return Err(too_small());
        }

        buf[..bytes.len()].copy_from_slice(&bytes);
        self.acks
            .send(Ok(bytes.len()))
            .map_err(|_| ArchiveError::Shutdown)?;
        Ok(Some(bytes.len()))
    }
}

impl Read for DemuxOut {
    /// `Ok(0)` means the namespace is closed. Callers that may legitimately
    /// receive empty records should use the inherent `read`, which keeps
    /// the two cases apart.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match DemuxOut::read(self, buf) {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0),
            Err(err) => Err(std::io::Error::new(std::io::ErrorKind::Other, err)),
        }
    }
}
