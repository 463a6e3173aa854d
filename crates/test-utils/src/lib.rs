//! In-memory backends, transports and recording listeners for tether tests.

mod backend;
pub use backend::{MemoryBackend, Pairing, memory_channels};

mod pair;
pub use pair::{PeerSetup, connect_pair};

mod transport;
pub use transport::{MemoryTransport, memory_transports};

mod recording;
pub use recording::{AcceptingListener, ObservedEvent, RecordingListener, RecordingObserver};

/// Routes `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
