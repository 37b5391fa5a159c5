use std::collections::HashMap;
use std::io::Write;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, warn};

use cask_codec::frame::{write_record, write_terminator};
use cask_codec::record::{encode_header_cbor, BlockHeader};
use cask_core::{ArchiveError, CancelWatch, Namespace, Result};

/// One readiness token pushed by a producer handle.
enum MuxEvent {
    Data { namespace: Namespace, bytes: Vec<u8> },
    Close { namespace: Namespace },
}

/// Fan-in coordinator: serializes the writes of many producer handles into
/// one byte sink, interleaving them at block granularity.
///
/// All handles must be opened before `run` is called; `run` consumes the
/// multiplexer, so late registration is unrepresentable. The order in which
/// producers happen to push data decides the block interleaving (FIFO over
/// the ready queue); per-namespace ordering is always preserved.
pub struct Multiplexer<W: Write> {
    sink: W,
    events_tx: Sender<MuxEvent>,
    events_rx: Receiver<MuxEvent>,
    // Success is acknowledged with the accepted byte count; failure is
    // signalled by dropping the sender, never by sending.
    replies: HashMap<Namespace, Sender<usize>>,
    current: Option<Namespace>,
    cancel: Option<CancelWatch>,
}

impl<W: Write> Multiplexer<W> {
    pub fn new(sink: W) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            sink,
            events_tx,
            events_rx,
            replies: HashMap::new(),
            current: None,
            cancel: None,
        }
    }

    /// Like `new`, but `run` aborts with `Cancelled` when the watch fires.
    pub fn with_cancel(sink: W, cancel: CancelWatch) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::new(sink)
        }
    }

    /// Registers a producer handle for `namespace`.
    ///
    /// Two simultaneously-open producers for one namespace are unsupported.
    pub fn open(&mut self, namespace: Namespace) -> Result<MuxIn> {
        if self.replies.contains_key(&namespace) {
            return Err(ArchiveError::Protocol(format!(
                "namespace {namespace} already has an open producer"
            )));
        }
        // Zero capacity: replying is itself a rendezvous with the writer.
        let (reply_tx, reply_rx) = bounded(0);
        self.replies.insert(namespace.clone(), reply_tx);
        Ok(MuxIn {
            namespace,
            events: self.events_tx.clone(),
            replies: reply_rx,
            closed: false,
        })
    }

    /// Drains producer events until every handle has closed.
    ///
    /// Any sink error aborts the loop; partially-written blocks are not
    /// rolled back. Before returning an error, every producer still blocked
    /// in `write` is woken with a shutdown error.
    pub fn run(mut self) -> Result<()> {
        let result = self.pump();
        if let Err(ref err) = result {
            warn!(error = %err, "multiplexer aborted; unblocking producers");
            // Dropping the reply senders wakes every blocked writer.
            self.replies.clear();
        }
        result
    }

    fn pump(&mut self) -> Result<()> {
        while !self.replies.is_empty() {
            match self.next_event()? {
                MuxEvent::Data { namespace, bytes } => self.write_body(namespace, bytes)?,
                MuxEvent::Close { namespace } => self.close_namespace(namespace)?,
            }
        }
        self.sink.flush()?;
        Ok(())
    }

    fn next_event(&self) -> Result<MuxEvent> {
        match &self.cancel {
            None => self.events_rx.recv().map_err(|_| ArchiveError::Shutdown),
            Some(watch) => select! {
                recv(self.events_rx) -> event => event.map_err(|_| ArchiveError::Shutdown),
                recv(watch.receiver()) -> _ => Err(ArchiveError::Cancelled),
            },
        }
    }

    fn write_body(&mut self, namespace: Namespace, bytes: Vec<u8>) -> Result<()> {
        if self.current.as_ref() != Some(&namespace) {
            if self.current.is_some() {
                write_terminator(&mut self.sink)?;
            }
            let header = encode_header_cbor(&BlockHeader::start(&namespace))?;
            write_record(&mut self.sink, &header)?;
            self.current = Some(namespace.clone());
        }
        write_record(&mut self.sink, &bytes)?;

        if let Some(reply) = self.replies.get(&namespace) {
            // A producer that vanished mid-write just misses its ack.
            let _ = reply.send(bytes.len());
        }
        Ok(())
    }

    fn close_namespace(&mut self, namespace: Namespace) -> Result<()> {
        if self.current.take().is_some() {
            write_terminator(&mut self.sink)?;
        }
        let header = encode_header_cbor(&BlockHeader::eof(&namespace))?;
        write_record(&mut self.sink, &header)?;
        write_terminator(&mut self.sink)?;
        self.replies.remove(&namespace);
        debug!(%namespace, live = self.replies.len(), "producer closed");
        Ok(())
    }
}

/// Producer handle for one namespace.
///
/// `write` blocks until the multiplexer has accepted the bytes; there is no
/// buffering, so a slow sink throttles the producer. A handle is owned by
/// exactly one worker thread.
#[derive(Debug)]
pub struct MuxIn {
    namespace: Namespace,
    events: Sender<MuxEvent>,
    replies: Receiver<usize>,
    closed: bool,
}

impl MuxIn {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Hands one record to the multiplexer and waits for it to be accepted.
    pub fn write(&mut self, record: &[u8]) -> Result<usize> {
        self.events
            .send(MuxEvent::Data {
                namespace: self.namespace.clone(),
                bytes: record.to_vec(),
            })
            .map_err(|_| ArchiveError::Shutdown)?;
        self.replies.recv().map_err(|_| ArchiveError::Shutdown)
    }

    /// Signals end-of-stream; the multiplexer emits the namespace's EOF block.
    pub fn close(mut self) -> Result<()> {
        self.send_close()
    }

    fn send_close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.events
            .send(MuxEvent::Close {
                namespace: self.namespace.clone(),
            })
            .map_err(|_| ArchiveError::Shutdown)
    }
}

impl Write for MuxIn {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        MuxIn::write(self, buf).map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Writes are synchronous; there is nothing buffered to flush.
        Ok(())
    }
}

impl Drop for MuxIn {
    fn drop(&mut self) {
        // An abandoned handle must not stall the coordinator.
        let _ = self.send_close();
    }
}
