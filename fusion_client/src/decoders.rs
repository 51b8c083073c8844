//! Result decoders: the `extern "C"` callbacks handed to the engine.
//!
//! Each decoder resolves the registry that issued the token, turns the raw
//! `(result, error)` pair into a host value or a [`FusionError`], and
//! completes the pending operation. The payload is only valid during the
//! callback, so everything is decoded (or ownership moved out) before
//! returning. Decoders never unwind into the engine.

use crate::buffer::{NativeBufferView, NativeMemoryCursor};
use crate::dataframe::CollectedBatches;
use crate::error::{ErrorCode, FusionError, Result};
use crate::handle::HandleReclaim;
use crate::native::RawHandle;
use crate::registry::OperationRegistry;
use arrow::array::{Array, StructArray};
use arrow::ffi::{from_ffi_and_data_type, FFI_ArrowArray, FFI_ArrowSchema};
use arrow_array::{RecordBatch, RecordBatchOptions};
use arrow_ipc::reader::StreamReader;
use arrow_schema::{ArrowError, DataType, Schema, SchemaRef};
use fusion_native::{BytesData, CollectedRecordBatches, ErrorInfoData};
use std::any::Any;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

type BatchIter = Box<dyn Iterator<Item = std::result::Result<RecordBatch, ArrowError>> + Send>;

/// Schema a C data stream frame is imported against.
pub(crate) struct FrameSchema(pub(crate) SchemaRef);

/// Reads IPC stream frames that arrive one callback at a time as a single
/// continuous stream. Lives as the operation context of each `next` call.
pub(crate) struct IpcFrameDecoder {
    cursor: NativeMemoryCursor,
    reader: Mutex<Option<BatchIter>>,
}

impl IpcFrameDecoder {
    pub(crate) fn new() -> Self {
        Self {
            cursor: NativeMemoryCursor::new(),
            reader: Mutex::new(None),
        }
    }

    /// Bytes of the IPC stream consumed so far.
    pub(crate) fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// # Safety
    /// `frame` must be readable for the duration of the call.
    unsafe fn decode(&self, frame: &BytesData) -> Result<RecordBatch> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        self.cursor.rebind(frame.data, frame.len as usize);
        let batch = Self::read_one(&mut reader, &self.cursor);
        self.cursor.unbind();
        batch
    }

    fn read_one(reader: &mut Option<BatchIter>, cursor: &NativeMemoryCursor) -> Result<RecordBatch> {
        if reader.is_none() {
            let stream = StreamReader::try_new(cursor.clone(), None).map_err(FusionError::decode)?;
            *reader = Some(Box::new(stream));
        }
        match reader.as_mut().and_then(|batches| batches.next()) {
            Some(batch) => batch.map_err(FusionError::decode),
            None => Err(FusionError::decode("stream frame held no record batch")),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("decoder panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("decoder panicked: {text}")
    } else {
        "decoder panicked".to_string()
    }
}

fn registry_for(token: u64) -> Option<Arc<OperationRegistry>> {
    let registry = OperationRegistry::resolve(token);
    if registry.is_none() {
        log::warn!("Callback for token {token:#x} arrived after its registry was dropped");
        OperationRegistry::take_orphan(token);
    }
    registry
}

/// A handle produced for a registry that no longer exists is destroyed
/// through the [`HandleReclaim`] the registry parked when it dropped.
unsafe fn reclaim_orphan(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let reclaim = OperationRegistry::take_orphan(token).and_then(|context| context.downcast::<HandleReclaim>().ok());
    if !error.is_null() {
        return;
    }
    let Some(raw) = read_value::<*mut c_void>(result).ok().and_then(|ptr| RawHandle::from_ptr(ptr)) else {
        return;
    };
    match reclaim {
        Some(reclaim) => reclaim.reclaim(raw),
        None => log::warn!("Leaking unclaimed handle {:p} for token {token:#x}", raw.as_ptr()),
    }
}

fn missing_result() -> FusionError {
    FusionError::decode("engine reported success without a result")
}

/// Complete `token` with the native error if there is one, otherwise with
/// whatever `decode` produces. Returns a decoded value nobody received so
/// the caller can dispose of it.
///
/// # Safety
/// `error` must be null or point to a valid payload.
unsafe fn settle<T, F>(registry: &OperationRegistry, token: u64, error: *const ErrorInfoData, decode: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T>,
{
    if let Some(info) = error.as_ref() {
        let error = FusionError::from_native(info);
        log::debug!("Token {token:#x} failed: {error}");
        registry.complete_error::<T>(token, error);
        return None;
    }
    match panic::catch_unwind(AssertUnwindSafe(decode)) {
        Ok(Ok(value)) => registry.complete_result(token, value).err(),
        Ok(Err(error)) => {
            log::debug!("Token {token:#x} could not be decoded: {error}");
            registry.complete_error::<T>(token, error);
            None
        }
        Err(payload) => {
            let error = FusionError::new(ErrorCode::Panic, panic_message(payload));
            log::error!("Token {token:#x}: {error}");
            registry.complete_error::<T>(token, error);
            None
        }
    }
}

/// Read a plain value the engine passed by pointer.
unsafe fn read_value<T: Copy>(result: *const c_void) -> Result<T> {
    let ptr = result.cast::<T>();
    ptr.as_ref().copied().ok_or_else(missing_result)
}

unsafe fn read_span<'a>(result: *const c_void) -> Result<&'a BytesData> {
    result.cast::<BytesData>().as_ref().ok_or_else(missing_result)
}

/// Move a C data interface struct out of engine memory, leaving a released
/// placeholder so the engine's own drop is a no-op.
unsafe fn take_ffi<T>(ptr: *mut T, empty: T) -> Option<T> {
    if ptr.is_null() {
        None
    } else {
        Some(std::ptr::replace(ptr, empty))
    }
}

fn import_schema(ffi_schema: &FFI_ArrowSchema) -> Result<SchemaRef> {
    Schema::try_from(ffi_schema).map(Arc::new).map_err(FusionError::decode)
}

/// Import one exported struct array as a batch of `schema`.
fn import_batch(array: FFI_ArrowArray, schema: &SchemaRef) -> Result<RecordBatch> {
    if array.is_released() {
        return Err(FusionError::decode("exported batch was already released"));
    }
    let data_type = DataType::Struct(schema.fields().clone());
    let data = unsafe { from_ffi_and_data_type(array, data_type) }.map_err(FusionError::decode)?;
    let columns = StructArray::from(data);
    let options = RecordBatchOptions::new().with_row_count(Some(columns.len()));
    RecordBatch::try_new_with_options(Arc::clone(schema), columns.columns().to_vec(), &options)
        .map_err(FusionError::decode)
}

/// Import every array of a collection. On the first failure, everything
/// imported so far and every array not yet reached is released before the
/// error is returned.
fn import_collection(schema: SchemaRef, arrays: Vec<FFI_ArrowArray>) -> Result<CollectedBatches> {
    let mut batches = Vec::with_capacity(arrays.len());
    for (index, array) in arrays.into_iter().enumerate() {
        match import_batch(array, &schema) {
            Ok(batch) => batches.push(batch),
            // Returning drops `batches` and the rest of the iterator.
            Err(error) => return Err(FusionError::decode(format!("batch {index}: {}", error.message()))),
        }
    }
    Ok(CollectedBatches { schema, batches })
}

/// For operations with no result value.
pub(crate) unsafe extern "C" fn complete_void(_result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = registry_for(token) else { return };
    settle::<(), _>(&registry, token, error, || Ok(()));
}

/// For operations producing a `u64`.
pub(crate) unsafe extern "C" fn complete_u64(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || read_value::<u64>(result));
}

/// For operations producing a new native handle. The result is a pointer
/// to the handle. If the caller is gone, the handle is destroyed through
/// the [`HandleReclaim`] registered with the operation.
pub(crate) unsafe extern "C" fn complete_handle(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = OperationRegistry::resolve(token) else {
        log::warn!("Handle for token {token:#x} arrived after its registry was dropped");
        reclaim_orphan(result, error, token);
        return;
    };
    let reclaim = registry.get_context::<HandleReclaim>(token);
    let orphan = settle(&registry, token, error, || {
        let ptr = read_value::<*mut c_void>(result)?;
        RawHandle::from_ptr(ptr).ok_or_else(|| FusionError::decode("engine returned a null handle"))
    });
    if let Some(raw) = orphan {
        match reclaim {
            Some(reclaim) => reclaim.reclaim(raw),
            None => log::warn!("Leaking unclaimed handle {:p} for token {token:#x}", raw.as_ptr()),
        }
    }
}

/// For operations producing UTF-8 text in a span.
pub(crate) unsafe extern "C" fn complete_string(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || {
        let mut view = NativeBufferView::from_span(read_span(result)?);
        String::from_utf8(view.read_to_vec()).map_err(FusionError::decode)
    });
}

/// For schemas sent as an IPC stream header.
pub(crate) unsafe extern "C" fn complete_schema_ipc(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || {
        let view = NativeBufferView::from_span(read_span(result)?);
        let reader = StreamReader::try_new(view, None).map_err(FusionError::decode)?;
        Ok(reader.schema())
    });
}

/// For schemas sent as a `*mut FFI_ArrowSchema`.
pub(crate) unsafe extern "C" fn complete_schema_cdata(
    result: *const c_void,
    error: *const ErrorInfoData,
    token: u64,
) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || {
        let ffi_schema = take_ffi(result.cast_mut().cast::<FFI_ArrowSchema>(), FFI_ArrowSchema::empty())
            .ok_or_else(missing_result)?;
        import_schema(&ffi_schema)
    });
}

/// For collections sent as one IPC stream.
pub(crate) unsafe extern "C" fn complete_collect_ipc(
    result: *const c_void,
    error: *const ErrorInfoData,
    token: u64,
) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || {
        let view = NativeBufferView::from_span(read_span(result)?);
        let reader = StreamReader::try_new(view, None).map_err(FusionError::decode)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>().map_err(FusionError::decode)?;
        Ok(CollectedBatches { schema, batches })
    });
}

/// For collections sent as [`CollectedRecordBatches`]. The schema and every
/// array are moved out first, so the engine releases nothing the host
/// now owns and the host releases everything it took on any failure.
pub(crate) unsafe extern "C" fn complete_collect_cdata(
    result: *const c_void,
    error: *const ErrorInfoData,
    token: u64,
) {
    let Some(registry) = registry_for(token) else { return };
    settle(&registry, token, error, || {
        let collected = result.cast::<CollectedRecordBatches>().as_ref().ok_or_else(missing_result)?;
        let ffi_schema =
            take_ffi(collected.schema, FFI_ArrowSchema::empty()).ok_or_else(|| FusionError::decode("missing schema"))?;
        let arrays: Vec<FFI_ArrowArray> = if collected.batches.is_null() {
            Vec::new()
        } else {
            (0..collected.batch_count as usize)
                .map(|i| std::ptr::replace(collected.batches.add(i), FFI_ArrowArray::empty()))
                .collect()
        };
        let schema = match import_schema(&ffi_schema) {
            Ok(schema) => schema,
            Err(error) => {
                drop(arrays);
                return Err(error);
            }
        };
        import_collection(schema, arrays)
    });
}

/// For stream frames sent as IPC. `(null, null)` is the end of the stream.
/// The operation context must be the stream's [`IpcFrameDecoder`].
pub(crate) unsafe extern "C" fn complete_frame_ipc(result: *const c_void, error: *const ErrorInfoData, token: u64) {
    let Some(registry) = registry_for(token) else { return };
    let decoder = registry.get_context::<IpcFrameDecoder>(token);
    settle(&registry, token, error, || {
        let Some(frame) = result.cast::<BytesData>().as_ref() else {
            return Ok(None);
        };
        let decoder = decoder.ok_or_else(|| {
            FusionError::new(ErrorCode::RuntimeError, "stream frame arrived without a frame decoder")
        })?;
        decoder.decode(frame).map(Some)
    });
}

/// For stream frames sent as a `*mut FFI_ArrowArray`. `(null, null)` is the
/// end of the stream. The operation context must be a [`FrameSchema`].
pub(crate) unsafe extern "C" fn complete_frame_cdata(
    result: *const c_void,
    error: *const ErrorInfoData,
    token: u64,
) {
    let Some(registry) = registry_for(token) else { return };
    let schema = registry.get_context::<FrameSchema>(token);
    settle(&registry, token, error, || {
        let Some(array) = take_ffi(result.cast_mut().cast::<FFI_ArrowArray>(), FFI_ArrowArray::empty()) else {
            return Ok(None);
        };
        let Some(schema) = schema else {
            drop(array);
            return Err(FusionError::new(
                ErrorCode::RuntimeError,
                "stream frame arrived without a schema to import it against",
            ));
        };
        import_batch(array, &schema.0).map(Some)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow_buffer::{Buffer, NullBuffer, ScalarBuffer};
    use arrow_schema::Field;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]))
    }

    /// Keeps a live count of how many of its buffers are still allocated.
    struct Tracked {
        bytes: Vec<i32>,
        live: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn tracked_array(values: Vec<i32>, live: &Arc<AtomicUsize>) -> FFI_ArrowArray {
        live.fetch_add(1, Ordering::SeqCst);
        let len = values.len();
        let owner = Arc::new(Tracked {
            bytes: values,
            live: Arc::clone(live),
        });
        let ptr = NonNull::new(owner.bytes.as_ptr() as *mut u8).unwrap();
        let buffer = unsafe { Buffer::from_custom_allocation(ptr, len * 4, owner) };
        let column = Int32Array::new(ScalarBuffer::new(buffer, 0, len), None::<NullBuffer>);
        let batch = RecordBatch::try_new(schema(), vec![Arc::new(column)]).unwrap();
        FFI_ArrowArray::new(&StructArray::from(batch).to_data())
    }

    fn native_error(code: ErrorCode, message: &str) -> ErrorInfoData {
        ErrorInfoData {
            code: code as i32,
            message: BytesData::new(message.as_bytes()),
        }
    }

    #[tokio::test]
    async fn native_errors_reach_the_caller_verbatim() {
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<u64>();
        let info = native_error(ErrorCode::DataFusionError, "table not found");
        unsafe { complete_u64(std::ptr::null(), &info, token) };
        let error = pending.await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::DataFusionError);
        assert_eq!(error.message(), "table not found");
    }

    #[tokio::test]
    async fn plain_values_decode() {
        let registry = OperationRegistry::new().unwrap();

        let (token, count) = registry.create::<u64>();
        let value = 42u64;
        unsafe { complete_u64((&value as *const u64).cast(), std::ptr::null(), token) };
        assert_eq!(count.await.unwrap(), 42);

        let (token, text) = registry.create::<String>();
        let span = BytesData::new("héllo".as_bytes());
        unsafe { complete_string((&span as *const BytesData).cast(), std::ptr::null(), token) };
        assert_eq!(text.await.unwrap(), "héllo");

        let (token, empty) = registry.create::<String>();
        let span = BytesData::empty();
        unsafe { complete_string((&span as *const BytesData).cast(), std::ptr::null(), token) };
        assert_eq!(empty.await.unwrap(), "");

        let (token, done) = registry.create::<()>();
        unsafe { complete_void(std::ptr::null(), std::ptr::null(), token) };
        done.await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn missing_or_malformed_payloads_are_decode_errors() {
        let registry = OperationRegistry::new().unwrap();

        let (token, count) = registry.create::<u64>();
        unsafe { complete_u64(std::ptr::null(), std::ptr::null(), token) };
        assert_eq!(count.await.unwrap_err().code(), ErrorCode::DecodeError);

        let (token, text) = registry.create::<String>();
        let bytes = [0xffu8, 0xfe];
        let span = BytesData::new(&bytes);
        unsafe { complete_string((&span as *const BytesData).cast(), std::ptr::null(), token) };
        assert_eq!(text.await.unwrap_err().code(), ErrorCode::DecodeError);

        let (token, schema) = registry.create::<SchemaRef>();
        let garbage = BytesData::new(b"not an ipc stream");
        unsafe { complete_schema_ipc((&garbage as *const BytesData).cast(), std::ptr::null(), token) };
        assert_eq!(schema.await.unwrap_err().code(), ErrorCode::DecodeError);
    }

    #[tokio::test]
    async fn both_schema_encodings_agree() {
        let registry = OperationRegistry::new().unwrap();
        let expected = schema();

        let bytes = fusion_native::serialization::schema_to_bytes(&expected).unwrap();
        let span = BytesData::new(&bytes);
        let (token, from_ipc) = registry.create::<SchemaRef>();
        unsafe { complete_schema_ipc((&span as *const BytesData).cast(), std::ptr::null(), token) };

        let mut exported = FFI_ArrowSchema::try_from(expected.as_ref()).unwrap();
        let (token, from_cdata) = registry.create::<SchemaRef>();
        unsafe { complete_schema_cdata((&mut exported as *mut FFI_ArrowSchema).cast_const().cast(), std::ptr::null(), token) };

        assert_eq!(from_ipc.await.unwrap(), expected);
        assert_eq!(from_cdata.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn partial_import_failure_releases_every_batch() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut arrays = vec![
            tracked_array(vec![1, 2], &live),
            tracked_array(vec![3], &live),
            FFI_ArrowArray::empty(),
            tracked_array(vec![4, 5, 6], &live),
            tracked_array(vec![7], &live),
        ];
        assert_eq!(live.load(Ordering::SeqCst), 4);
        let mut ffi_schema = FFI_ArrowSchema::try_from(schema().as_ref()).unwrap();
        let mut collected = CollectedRecordBatches {
            schema: &mut ffi_schema,
            batch_count: arrays.len() as u64,
            batches: arrays.as_mut_ptr(),
        };

        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<CollectedBatches>();
        unsafe { complete_collect_cdata((&mut collected as *mut CollectedRecordBatches).cast_const().cast(), std::ptr::null(), token) };

        let error = pending.await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::DecodeError);
        assert!(error.message().starts_with("batch 2"), "{}", error.message());
        // Every buffer, imported or not, is gone before the caller sees the error.
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(arrays.iter().all(FFI_ArrowArray::is_released));
    }

    #[tokio::test]
    async fn collected_cdata_batches_keep_native_memory_alive() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut arrays = vec![tracked_array(vec![1, 2], &live), tracked_array(vec![3], &live)];
        let mut ffi_schema = FFI_ArrowSchema::try_from(schema().as_ref()).unwrap();
        let mut collected = CollectedRecordBatches {
            schema: &mut ffi_schema,
            batch_count: 2,
            batches: arrays.as_mut_ptr(),
        };

        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<CollectedBatches>();
        unsafe { complete_collect_cdata((&mut collected as *mut CollectedRecordBatches).cast_const().cast(), std::ptr::null(), token) };
        drop(arrays);

        let result = pending.await.unwrap();
        assert_eq!(result.schema.fields().len(), 1);
        assert_eq!(result.num_rows(), 3);
        assert_eq!(live.load(Ordering::SeqCst), 2);
        drop(result);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ipc_frames_decode_as_one_stream() {
        let schema = schema();
        let batch = |values: Vec<i32>| {
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(values))]).unwrap()
        };
        let mut writer = fusion_native::serialization::IpcFrameWriter::try_new(&schema).unwrap();
        let frames = vec![writer.frame(&batch(vec![1, 2])).unwrap(), writer.frame(&batch(vec![3])).unwrap()];

        let registry = OperationRegistry::new().unwrap();
        let decoder = Arc::new(IpcFrameDecoder::new());
        let mut rows = Vec::new();
        for frame in &frames {
            let (token, pending) = registry.create_with_context::<Option<RecordBatch>, _>(Arc::clone(&decoder));
            let span = BytesData::new(frame);
            unsafe { complete_frame_ipc((&span as *const BytesData).cast(), std::ptr::null(), token) };
            rows.push(pending.await.unwrap().unwrap().num_rows());
        }
        assert_eq!(rows, vec![2, 1]);
        assert_eq!(decoder.position(), (frames[0].len() + frames[1].len()) as u64);

        let (token, pending) = registry.create_with_context::<Option<RecordBatch>, _>(Arc::clone(&decoder));
        unsafe { complete_frame_ipc(std::ptr::null(), std::ptr::null(), token) };
        assert!(pending.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cdata_frame_without_schema_is_an_internal_error() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut array = tracked_array(vec![1], &live);
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<Option<RecordBatch>>();
        unsafe { complete_frame_cdata((&mut array as *mut FFI_ArrowArray).cast_const().cast(), std::ptr::null(), token) };
        assert_eq!(pending.await.unwrap_err().code(), ErrorCode::RuntimeError);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn late_handle_is_reclaimed() {
        use crate::handle::test_support::CountingApi;
        use crate::handle::HandleKind;

        let api = Arc::new(CountingApi::default());
        let registry = OperationRegistry::new().unwrap();
        let reclaim = Arc::new(HandleReclaim::new(HandleKind::DataFrame, api.clone()));
        let (token, pending) = registry.create_with_context::<RawHandle, _>(reclaim);
        drop(pending);
        assert_eq!(registry.len(), 1);

        let raw = CountingApi::fake_handle().as_ptr();
        unsafe { complete_handle((&raw as *const *mut c_void).cast(), std::ptr::null(), token) };
        assert_eq!(api.destroyed(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn handle_outliving_its_registry_is_reclaimed() {
        use crate::handle::test_support::CountingApi;
        use crate::handle::HandleKind;

        let api = Arc::new(CountingApi::default());
        let registry = OperationRegistry::new().unwrap();
        let reclaim = Arc::new(HandleReclaim::new(HandleKind::Stream, api.clone()));
        let (token, pending) = registry.create_with_context::<RawHandle, _>(reclaim);
        drop(pending);
        drop(registry);
        assert!(OperationRegistry::resolve(token).is_none());

        let raw = CountingApi::fake_handle().as_ptr();
        unsafe { complete_handle((&raw as *const *mut c_void).cast(), std::ptr::null(), token) };
        assert_eq!(api.destroyed(), 1);
        assert!(OperationRegistry::take_orphan(token).is_none());
    }
}
