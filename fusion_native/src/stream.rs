//! Incremental execution. Each `fusion_stream_next` call pulls one batch
//! from the engine's record batch stream.

use crate::abi::{BatchEncoding, BytesData, Callback, ErrorCode};
use crate::dataframe::batch_to_ffi;
use crate::runtime::RuntimeHandle;
use crate::serialization::IpcFrameWriter;
use crate::{Completion, ErrorInfo};
use arrow_array::RecordBatch;
use arrow_schema::ArrowError;
use datafusion::execution::SendableRecordBatchStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

struct StreamState {
    stream: SendableRecordBatchStream,
    ipc: Option<IpcFrameWriter>,
    /// The most recent IPC frame. Valid until the next call or destroy.
    frame: Vec<u8>,
    finished: bool,
}

impl StreamState {
    fn encode_frame(&mut self, batch: &RecordBatch) -> Result<(), ArrowError> {
        let writer = match self.ipc.take() {
            Some(writer) => writer,
            None => IpcFrameWriter::try_new(&batch.schema())?,
        };
        self.frame = self.ipc.insert(writer).frame(batch)?;
        Ok(())
    }

    async fn next_frame(&mut self, encoding: BatchEncoding, completion: Completion) {
        if self.finished {
            return completion.end_of_stream();
        }
        let batch = match self.stream.next().await {
            None => {
                self.finished = true;
                return completion.end_of_stream();
            }
            Some(Err(e)) => return completion.fail(ErrorInfo::engine(e)),
            Some(Ok(batch)) => batch,
        };
        match encoding {
            BatchEncoding::Ipc => match self.encode_frame(&batch) {
                Ok(()) => completion.succeed(&BytesData::new(&self.frame)),
                Err(e) => completion.fail(ErrorInfo::engine(e)),
            },
            BatchEncoding::CData => {
                let mut array = batch_to_ffi(batch);
                completion.succeed_mut(&mut array);
            }
        }
    }
}

/// A running query. Calls are serialized; the host is expected to await
/// each `next` before issuing the following one.
pub struct RecordBatchStreamWrapper {
    runtime: RuntimeHandle,
    state: Arc<Mutex<StreamState>>,
}

impl RecordBatchStreamWrapper {
    pub(crate) fn new(runtime: RuntimeHandle, stream: SendableRecordBatchStream) -> Self {
        Self {
            runtime,
            state: Arc::new(Mutex::new(StreamState {
                stream,
                ipc: None,
                frame: Vec::new(),
                finished: false,
            })),
        }
    }
}

/// Fetches the next batch. The callback receives:
/// - [`BatchEncoding::Ipc`]: a [`BytesData`] frame. Frames concatenated in
///   order form one IPC stream; the first also carries the schema.
/// - [`BatchEncoding::CData`]: a `*mut FFI_ArrowArray` (a struct array) the
///   host must move out of and import against the stream's schema.
/// - `(null, null)` once the stream is exhausted, on this and every later call.
///
/// # Safety
/// `stream_ptr` must have been produced by `fusion_dataframe_execute_stream`
/// and not yet destroyed; `callback` must be valid to call from any thread.
#[no_mangle]
pub unsafe extern "C" fn fusion_stream_next(
    stream_ptr: *mut RecordBatchStreamWrapper,
    encoding: u32,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let wrapper = ffi_ref!(stream_ptr);
    let Some(encoding) = BatchEncoding::from_repr(encoding) else {
        return ErrorCode::InvalidArgument;
    };
    let state = Arc::clone(&wrapper.state);
    wrapper.runtime.spawn_operation(callback, token, |completion| async move {
        state.lock().await.next_frame(encoding, completion).await;
    })
}

/// Destroys a stream. A `next` call still in flight completes normally.
///
/// # Safety
/// `stream_ptr` must have been produced by `fusion_dataframe_execute_stream`
/// (or be null) and must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn fusion_stream_destroy(stream_ptr: *mut RecordBatchStreamWrapper) -> ErrorCode {
    if !stream_ptr.is_null() {
        log::debug!("Destroying stream {stream_ptr:p}");
        drop(Box::from_raw(stream_ptr));
    }
    ErrorCode::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::test_support::{record_span_len, wait_for, Recorded};
    use crate::runtime::{fusion_runtime_destroy, fusion_runtime_new};
    use arrow_array::Int32Array;
    use arrow_schema::{DataType, Field, Schema};
    use datafusion::physical_plan::stream::RecordBatchStreamAdapter;

    fn one_batch_stream() -> SendableRecordBatchStream {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(vec![1, 2]))]).unwrap();
        Box::pin(RecordBatchStreamAdapter::new(
            schema,
            futures::stream::iter(vec![Ok(batch)]),
        ))
    }

    #[test]
    fn exhausted_stream_keeps_reporting_the_sentinel() {
        let mut runtime = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_runtime_new(1, 0, &mut runtime) }, ErrorCode::Ok);
        let handle = unsafe { Arc::clone(&*runtime) };
        let stream = Box::into_raw(Box::new(RecordBatchStreamWrapper::new(handle, one_batch_stream())));

        let ipc = BatchEncoding::Ipc as u32;
        for (token, expect_frame) in [(8201u64, true), (8202, false), (8203, false)] {
            assert_eq!(unsafe { fusion_stream_next(stream, ipc, record_span_len, token) }, ErrorCode::Ok);
            let seen = wait_for(token, 1);
            assert_eq!(seen.len(), 1);
            match (&seen[0], expect_frame) {
                (Recorded::Value(len), true) => assert!(*len > 0),
                (Recorded::EndOfStream, false) => {}
                (other, _) => panic!("unexpected callback for token {token}: {other:?}"),
            }
        }

        assert_eq!(unsafe { fusion_stream_next(stream, 9, record_span_len, 8204) }, ErrorCode::InvalidArgument);
        assert_eq!(unsafe { fusion_stream_destroy(stream) }, ErrorCode::Ok);
        assert_eq!(unsafe { fusion_runtime_destroy(runtime) }, ErrorCode::Ok);
    }
}
