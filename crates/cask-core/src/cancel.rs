use crossbeam_channel::{bounded, Receiver, TryRecvError};

/// Cancellation token for the coordinator loops.
///
/// Firing is modelled as channel disconnection: `cancel()` (or dropping the
/// token) closes the channel, and every `CancelWatch` clone observes the
/// disconnect at its next blocking point. The default configuration has no
/// token at all and blocks indefinitely.
pub struct Cancel {
    _tx: crossbeam_channel::Sender<()>,
}

/// Receiving half handed to a coordinator; cheap to clone.
#[derive(Clone)]
pub struct CancelWatch {
    rx: Receiver<()>,
}

impl Cancel {
    /// Creates a token and its watch half.
    pub fn new() -> (Cancel, CancelWatch) {
        let (tx, rx) = bounded(0);
        (Cancel { _tx: tx }, CancelWatch { rx })
    }

    /// Fires the token, waking every watcher.
    pub fn cancel(self) {
        // Dropping the sender disconnects the channel.
    }
}

impl CancelWatch {
    /// Non-blocking check, for use between blocking points.
    pub fn cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The underlying receiver, for `select!` arms.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
