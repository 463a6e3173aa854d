//! Raw byte channel supplied by a transport for one peer.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, watch};

pub type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

/// Byte input stream, byte output stream and a close operation.
///
/// Reads and writes are serialized per direction, so one task may read while another writes.
/// [`RawChannel::close`] is synchronous: pending operations observe it and fail, and both
/// halves are dropped as soon as no operation holds them.
pub struct RawChannel {
    label: String,
    reader: Mutex<Option<ChannelReader>>,
    writer: Mutex<Option<ChannelWriter>>,
    closed: watch::Sender<bool>,
}

impl fmt::Debug for RawChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawChannel")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RawChannel {
    pub fn new(label: impl Into<String>, reader: ChannelReader, writer: ChannelWriter) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            label: label.into(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// Wraps a bidirectional stream such as a TCP socket.
    pub fn from_duplex<T>(label: impl Into<String>, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::new(label, Box::new(reader), Box::new(writer))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the channel is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        // Halves held by an in-flight operation are dropped when it observes the flag.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    /// Exclusive access to both directions, for multi-step exchanges.
    pub async fn io(&self) -> io::Result<ChannelIo<'_>> {
        if self.is_closed() {
            return Err(closed_error());
        }
        let reader = Half::new(self.reader.lock().await, &self.closed);
        let writer = Half::new(self.writer.lock().await, &self.closed);
        Ok(ChannelIo { reader, writer })
    }

    /// Reads some bytes. Returns 0 at end of stream.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut half = Half::new(self.reader.lock().await, &self.closed);
        let reader = half.get()?;
        tokio::select! {
            res = reader.read(buf) => res,
            _ = self.closed() => Err(closed_error()),
        }
    }

    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut half = Half::new(self.writer.lock().await, &self.closed);
        let writer = half.get()?;
        tokio::select! {
            res = async {
                writer.write_all(buf).await?;
                writer.flush().await
            } => res,
            _ = self.closed() => Err(closed_error()),
        }
    }
}

/// One locked direction. Drops the stream on release if the channel was closed meanwhile.
struct Half<'a, T> {
    guard: MutexGuard<'a, Option<T>>,
    closed: &'a watch::Sender<bool>,
}

impl<'a, T> Half<'a, T> {
    fn new(guard: MutexGuard<'a, Option<T>>, closed: &'a watch::Sender<bool>) -> Self {
        Self { guard, closed }
    }

    fn get(&mut self) -> io::Result<&mut T> {
        if *self.closed.borrow() {
            return Err(closed_error());
        }
        self.guard.as_mut().ok_or_else(closed_error)
    }
}

impl<T> Drop for Half<'_, T> {
    fn drop(&mut self) {
        if *self.closed.borrow() {
            self.guard.take();
        }
    }
}

/// Both directions of a [`RawChannel`], locked together.
pub struct ChannelIo<'a> {
    reader: Half<'a, ChannelReader>,
    writer: Half<'a, ChannelWriter>,
}

impl ChannelIo<'_> {
    pub fn split(&mut self) -> io::Result<(&mut ChannelReader, &mut ChannelWriter)> {
        Ok((self.reader.get()?, self.writer.get()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_write() {
        let (a, b) = tokio::io::duplex(64);
        let left = RawChannel::from_duplex("left", a);
        let right = RawChannel::from_duplex("right", b);

        left.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let n = right.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &b"ping"[..n]);
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_read() {
        let (a, _b) = tokio::io::duplex(64);
        let channel = std::sync::Arc::new(RawChannel::from_duplex("pending", a));

        let reader = channel.clone();
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 1];
            reader.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.close();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_close_drops_stream() {
        let (a, mut b) = tokio::io::duplex(64);
        let channel = RawChannel::from_duplex("dropped", a);
        channel.close();
        channel.close();

        // Peer observes end of stream once both halves are gone.
        let mut buf = [0u8; 1];
        assert_eq!(b.read(&mut buf).await.unwrap(), 0);
        assert!(channel.io().await.is_err());
        assert!(channel.write_all(b"x").await.is_err());
    }
}
