//! Response stream handed to handlers.
//!
//! A handler may send any number of typed chunks before it returns. Each
//! chunk becomes a `STREAM_CHUNK` frame with the call's method and request
//! IDs, queued on the connection writer ahead of the final response.
//!
//! ```ignore
//! async fn handler(ctx: CallContext, req: Req, stream: ResponseStream) -> HandlerResult<Done, Err> {
//!     for page in pages(&req) {
//!         stream.send(&page).await.map_err(HandlerError::other)?;
//!     }
//!     Ok(Done)
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{Result, RpcError};
use crate::protocol::flags;
use crate::writer::{OutboundFrame, WriterHandle};

/// Handle for streaming chunks of one call. Cheap to clone.
#[derive(Clone)]
pub struct ResponseStream {
    method_id: u16,
    request_id: u32,
    writer: Option<WriterHandle>,
    closed: Arc<AtomicBool>,
}

impl ResponseStream {
    /// A stream not attached to any connection; chunks are discarded.
    pub fn detached(method_id: u16, request_id: u32) -> Self {
        Self {
            method_id,
            request_id,
            writer: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A stream writing to a connection.
    pub fn with_writer(method_id: u16, request_id: u32, writer: WriterHandle) -> Self {
        Self {
            writer: Some(writer),
            ..Self::detached(method_id, request_id)
        }
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Send one chunk.
    ///
    /// Fails with [`RpcError::StreamClosed`] once the call has ended.
    pub async fn send<T: Serialize + ?Sized>(&self, chunk: &T) -> Result<()> {
        if self.is_closed() {
            return Err(RpcError::StreamClosed);
        }

        let Some(writer) = &self.writer else {
            tracing::trace!(request_id = self.request_id, "Chunk dropped: detached stream");
            return Ok(());
        };

        let payload = Bytes::from(MsgPackCodec::encode(chunk)?);
        writer
            .send(OutboundFrame::new(
                self.method_id,
                flags::STREAM_CHUNK,
                self.request_id,
                payload,
            ))
            .await
    }

    /// Stop accepting chunks. Affects every clone.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("method_id", &self.method_id)
            .field("request_id", &self.request_id)
            .field("attached", &self.writer.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
