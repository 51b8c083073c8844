//! Pull-based incremental results.

use crate::decoders::{self, FrameSchema, IpcFrameDecoder};
use crate::error::{ErrorCode, FusionError, Result};
use crate::handle::OwnedHandle;
use crate::operation;
use crate::registry::{OperationContext, PendingOperation};
use crate::runtime::{Runtime, TransferMode};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use fusion_native::Callback;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// An executing query, read one batch at a time.
///
/// Each [`DataFrameStream::next`] asks the engine for one batch. After the
/// last batch every call returns `Ok(None)`. In zero-copy mode the stream
/// keeps a reference to every batch it hands out and lets go of them all
/// in [`DataFrameStream::close`], so engine memory is returned at a known
/// point.
pub struct DataFrameStream {
    handle: OwnedHandle,
    schema: Arc<FrameSchema>,
    ipc: Arc<IpcFrameDecoder>,
    runtime: Runtime,
    mode: TransferMode,
    retained: Vec<RecordBatch>,
    in_flight: Option<PendingOperation<Option<RecordBatch>>>,
    finished: bool,
}

impl DataFrameStream {
    pub(crate) fn new(handle: OwnedHandle, schema: FrameSchema, runtime: Runtime) -> Self {
        let mode = runtime.config().transfer_mode();
        Self {
            handle,
            schema: Arc::new(schema),
            ipc: Arc::new(IpcFrameDecoder::new()),
            runtime,
            mode,
            retained: Vec::new(),
            in_flight: None,
            finished: false,
        }
    }

    /// Schema every batch conforms to.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema.0
    }

    /// `true` until [`DataFrameStream::close`].
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Batches handed out so far and still held by the stream.
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// The next batch, or `None` once the query is exhausted.
    pub async fn next(&mut self) -> Result<Option<RecordBatch>> {
        std::future::poll_fn(|cx| self.poll_frame(cx)).await
    }

    /// Release the stream and every batch it retained. Idempotent.
    pub fn close(&mut self) -> ErrorCode {
        if !self.retained.is_empty() {
            log::debug!("Stream released {} retained batches", self.retained.len());
        }
        if self.mode == TransferMode::Copy {
            log::debug!("Stream read {} IPC bytes", self.ipc.position());
        }
        self.retained.clear();
        self.in_flight = None;
        self.handle.release()
    }

    fn start_next(&self) -> Result<PendingOperation<Option<RecordBatch>>> {
        let (decoder, context): (Callback, OperationContext) = match self.mode {
            TransferMode::ZeroCopy => (decoders::complete_frame_cdata, self.schema.clone() as OperationContext),
            TransferMode::Copy => (decoders::complete_frame_ipc, self.ipc.clone() as OperationContext),
        };
        let encoding = self.mode.encoding();
        operation::dispatch(self.runtime.registry(), "stream_next", Some(context), |token| {
            self.handle
                .with(|api, stream| api.stream_next(stream, encoding, decoder, token))
        })
    }

    fn poll_frame(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<RecordBatch>>> {
        if !self.handle.is_valid() {
            return Poll::Ready(Err(FusionError::invalid_state("Stream is closed")));
        }
        if self.finished {
            return Poll::Ready(Ok(None));
        }
        let mut pending = match self.in_flight.take() {
            Some(pending) => pending,
            None => match self.start_next() {
                Ok(pending) => pending,
                Err(error) => return Poll::Ready(Err(error)),
            },
        };
        let outcome = match Pin::new(&mut pending).poll(cx) {
            Poll::Pending => {
                self.in_flight = Some(pending);
                return Poll::Pending;
            }
            Poll::Ready(outcome) => outcome,
        };
        match outcome {
            Ok(Some(batch)) => {
                if self.mode == TransferMode::ZeroCopy {
                    self.retained.push(batch.clone());
                }
                Poll::Ready(Ok(Some(batch)))
            }
            Ok(None) => {
                log::debug!("Stream exhausted");
                self.finished = true;
                Poll::Ready(Ok(None))
            }
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

impl Stream for DataFrameStream {
    type Item = Result<RecordBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.handle.is_valid() {
            return Poll::Ready(None);
        }
        this.poll_frame(cx).map(Result::transpose)
    }
}

impl std::fmt::Debug for DataFrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFrameStream")
            .field("valid", &self.is_valid())
            .field("finished", &self.finished)
            .field("retained", &self.retained.len())
            .finish()
    }
}
