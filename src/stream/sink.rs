//! Client-facing NDJSON sink.
//!
//! Adapters write deltas into a [`DeltaSink`]; the HTTP layer drains the
//! paired [`DeltaReceiver`] into the response body. Dropping the receiver
//! (client went away) makes every later write fail with
//! [`ClientDisconnected`] and resolves [`DeltaSink::closed`].

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::protocol::encode_delta_line;

/// Default channel depth between an adapter task and the response body.
pub const DEFAULT_SINK_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client disconnected")]
pub struct ClientDisconnected;

/// Write half handed to adapters.
#[derive(Debug)]
pub struct DeltaSink {
    tx: mpsc::Sender<Bytes>,
    written: u64,
}

/// Read half owned by the response body.
#[derive(Debug)]
pub struct DeltaReceiver {
    rx: mpsc::Receiver<Bytes>,
}

#[must_use]
pub fn delta_channel(capacity: usize) -> (DeltaSink, DeltaReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DeltaSink { tx, written: 0 }, DeltaReceiver { rx })
}

impl DeltaSink {
    /// Write one `{"type":"delta","content":...}` line. Empty text is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ClientDisconnected`] once the receiving side is gone.
    pub async fn write_delta(&mut self, text: &str) -> Result<(), ClientDisconnected> {
        if text.is_empty() {
            return Ok(());
        }
        let line = Bytes::from(encode_delta_line(text));
        self.tx.send(line).await.map_err(|_| ClientDisconnected)?;
        self.written += 1;
        Ok(())
    }

    /// Resolves when the client side has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Whether at least one line has been handed to the client. After this
    /// point the response status is fixed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.written > 0
    }

    #[must_use]
    pub fn lines_written(&self) -> u64 {
        self.written
    }
}

impl DeltaReceiver {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Body stream that yields `first` and then everything still to come.
    pub fn into_body_stream(
        self,
        first: Option<Bytes>,
    ) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> + Send + 'static {
        futures_util::stream::unfold((first, self.rx), |(pending, mut rx)| async move {
            let next = match pending {
                Some(bytes) => bytes,
                None => rx.recv().await?,
            };
            Some((Ok(next), (None, rx)))
        })
    }
}
