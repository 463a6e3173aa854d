use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::RawChannel;

/// Fires once the transport observes that out-of-band pairing completed.
///
/// Dropping the sender without sending means the transport will not report completion; the
/// bonding race then relies on polling.
pub type PairingSignal = oneshot::Receiver<()>;

/// Transport hooks for the unidentified stage of a link.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait LinkBackend: Send + Sync {
    /// Opens the raw byte channel to the peer, or hands over one accepted earlier.
    async fn open_channel(&self) -> std::io::Result<RawChannel>;

    /// True if the transport already trusts the peer (e.g. a bonded radio device).
    fn is_paired(&self) -> bool;

    /// Starts out-of-band pairing.
    async fn request_pairing(&self) -> std::io::Result<PairingSignal>;

    /// Releases a channel prepared by the transport but never opened.
    fn close(&self) {}
}
