//! Dedicated writer task owning the write half of a connection.
//!
//! Calls never touch the socket directly. Every response, stream chunk and
//! fault frame goes through a cloneable [`WriterHandle`] into an mpsc
//! channel, and one task drains it, batching ready frames into a single
//! vectored write. A frame is therefore always written contiguously, no
//! matter how many calls are in flight on the connection.
//!
//! ```text
//! call 1 ─┐
//! call 2 ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► socket
//! call N ─┘
//! ```

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{Result, RpcError};
use crate::protocol::{Header, HEADER_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a frame; the payload length is filled in from `payload`.
    #[inline]
    pub fn new(method_id: u16, frame_flags: u8, request_id: u32, payload: Bytes) -> Self {
        let header = Header::new(method_id, frame_flags, request_id, payload.len() as u32);
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before senders wait.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// How long a sender waits for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Pending-frame accounting shared between handles and the writer task.
#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    drained: Notify,
}

/// Handle for sending frames to the writer task. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<Pending>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Send a frame to the writer task.
    ///
    /// Waits while the pending count is at the limit, failing with
    /// [`RpcError::BackpressureTimeout`] after the configured timeout.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.is_backpressure_active() {
            tokio::time::timeout(self.timeout, self.wait_for_capacity())
                .await
                .map_err(|_| RpcError::BackpressureTimeout)?;
        }

        self.pending.count.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.count.fetch_sub(1, Ordering::Release);
            RpcError::ConnectionClosed
        })
    }

    async fn wait_for_capacity(&self) {
        loop {
            let drained = self.pending.drained.notified();
            if !self.is_backpressure_active() {
                return;
            }
            drained.await;
        }
    }

    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.count.load(Ordering::Acquire) >= self.max_pending
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly once every handle is dropped, or with an error
/// when the underlying write fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(Pending::default());

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        max_pending: config.max_pending_frames,
        timeout: config.backpressure_timeout,
    };

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<Pending>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let result = write_batch(&mut writer, &batch).await;

        pending.count.fetch_sub(batch.len(), Ordering::Release);
        pending.drained.notify_waiters();
        batch.clear();

        if let Err(e) = result {
            tracing::error!(error = %e, "Connection write failed");
            return Err(e);
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of frames with vectored I/O, continuing after short writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut written = 0;

    while written < total_size {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything in `batch` after the first `skip_bytes`.
fn remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}
