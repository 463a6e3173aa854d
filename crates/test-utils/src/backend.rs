use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_connection::{LinkBackend, PairingSignal, RawChannel};
use tokio::sync::oneshot;

/// Scripted response to a pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// Pairs and fires the completion signal.
    Signal,
    /// Pairs silently, leaving detection to polling.
    Poll,
    /// Never pairs.
    Never,
    /// The request itself fails.
    Fail,
}

/// Two connected in-memory channels.
pub fn memory_channels(label: &str) -> (RawChannel, RawChannel) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (
        RawChannel::from_duplex(format!("{label}/a"), a),
        RawChannel::from_duplex(format!("{label}/b"), b),
    )
}

/// A [`LinkBackend`] over a prepared channel.
pub struct MemoryBackend {
    channel: Mutex<Option<RawChannel>>,
    paired: Arc<AtomicBool>,
    pairing: Pairing,
    pairing_requests: AtomicUsize,
    pending_signals: Mutex<Vec<oneshot::Sender<()>>>,
}

impl MemoryBackend {
    pub fn paired(channel: RawChannel) -> Self {
        Self::new(channel, true, Pairing::Never)
    }

    pub fn unpaired(channel: RawChannel, pairing: Pairing) -> Self {
        Self::new(channel, false, pairing)
    }

    fn new(channel: RawChannel, paired: bool, pairing: Pairing) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            paired: Arc::new(AtomicBool::new(paired)),
            pairing,
            pairing_requests: AtomicUsize::new(0),
            pending_signals: Mutex::new(Vec::new()),
        }
    }

    /// How many times pairing was requested.
    pub fn pairing_requests(&self) -> usize {
        self.pairing_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkBackend for MemoryBackend {
    async fn open_channel(&self) -> io::Result<RawChannel> {
        self.channel
            .lock()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel already opened"))
    }

    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    async fn request_pairing(&self) -> io::Result<PairingSignal> {
        self.pairing_requests.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        match self.pairing {
            Pairing::Signal => {
                self.paired.store(true, Ordering::SeqCst);
                let _ = tx.send(());
            }
            Pairing::Poll => {
                self.paired.store(true, Ordering::SeqCst);
                self.pending_signals.lock().push(tx);
            }
            Pairing::Never => self.pending_signals.lock().push(tx),
            Pairing::Fail => return Err(io::Error::other("pairing refused")),
        }
        Ok(rx)
    }

    fn close(&self) {
        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
    }
}
