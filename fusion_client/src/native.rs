//! The boundary the host talks through.
//!
//! [`NativeApi`] mirrors the C ABI exported by `fusion_native` one method per
//! entry point. [`LinkedNative`] forwards to the statically linked engine;
//! tests substitute scripted doubles to drive failure paths the real engine
//! cannot produce on demand.

use fusion_native::{
    BatchEncoding, BytesData, Callback, DataFrameWrapper, ErrorCode, FileFormat, RecordBatchStreamWrapper,
    RuntimeHandle, SessionContextWrapper,
};
use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

/// An opaque, non-null native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonNull<c_void>);

// Handles are addresses owned by the engine; the engine synchronizes access.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    /// Wrap a pointer produced by a [`NativeApi`]. `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a live handle produced by the API it will be
    /// passed back to, of the kind the receiving method expects.
    pub unsafe fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The address.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    fn cast<T>(self) -> *mut T {
        self.0.as_ptr().cast()
    }
}

/// One method per engine entry point.
///
/// Asynchronous methods follow the dispatch contract: the returned status is
/// [`ErrorCode::Ok`] iff `callback` will later be invoked exactly once with
/// `token`. Handle arguments must be live handles of the right kind,
/// produced by the same implementation.
pub trait NativeApi: Send + Sync + 'static {
    /// Start an engine runtime. `0` thread counts select engine defaults.
    fn runtime_new(&self, worker_threads: u32, max_blocking_threads: u32) -> Result<RawHandle, ErrorCode>;

    /// # Safety
    /// `runtime` must not be used again.
    unsafe fn runtime_destroy(&self, runtime: RawHandle) -> ErrorCode;

    /// Create a session on `runtime`.
    fn context_new(&self, runtime: RawHandle) -> Result<RawHandle, ErrorCode>;

    /// # Safety
    /// `context` must not be used again.
    unsafe fn context_destroy(&self, context: RawHandle) -> ErrorCode;

    /// Register a file source as `table`. `options` is an encoded options
    /// message for `format`, empty for defaults.
    #[allow(clippy::too_many_arguments)]
    fn context_register(
        &self,
        context: RawHandle,
        format: FileFormat,
        table: &CStr,
        path: &CStr,
        options: &[u8],
        callback: Callback,
        token: u64,
    ) -> ErrorCode;

    /// Plan a SQL statement. Completes with a data frame handle.
    fn context_sql(&self, context: RawHandle, sql: &CStr, callback: Callback, token: u64) -> ErrorCode;

    /// # Safety
    /// `dataframe` must not be used again.
    unsafe fn dataframe_destroy(&self, dataframe: RawHandle) -> ErrorCode;

    /// Completes with a `u64`.
    fn dataframe_count(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode;

    /// Completes with no value. `limit == 0` shows every row.
    fn dataframe_show(&self, dataframe: RawHandle, limit: u64, callback: Callback, token: u64) -> ErrorCode;

    /// Completes with a UTF-8 span.
    fn dataframe_to_string(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode;

    /// Completes with a schema in `encoding`.
    fn dataframe_schema(
        &self,
        dataframe: RawHandle,
        encoding: BatchEncoding,
        callback: Callback,
        token: u64,
    ) -> ErrorCode;

    /// Completes with every batch in `encoding`.
    fn dataframe_collect(
        &self,
        dataframe: RawHandle,
        encoding: BatchEncoding,
        callback: Callback,
        token: u64,
    ) -> ErrorCode;

    /// Completes with no value once the sink is written.
    #[allow(clippy::too_many_arguments)]
    fn dataframe_write(
        &self,
        dataframe: RawHandle,
        format: FileFormat,
        path: &CStr,
        options: &[u8],
        callback: Callback,
        token: u64,
    ) -> ErrorCode;

    /// Completes with a stream handle.
    fn dataframe_execute_stream(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode;

    /// Completes with one frame in `encoding`, or the end-of-stream sentinel.
    fn stream_next(&self, stream: RawHandle, encoding: BatchEncoding, callback: Callback, token: u64) -> ErrorCode;

    /// # Safety
    /// `stream` must not be used again.
    unsafe fn stream_destroy(&self, stream: RawHandle) -> ErrorCode;
}

/// The engine linked into this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedNative;

fn out_handle<T>(status: ErrorCode, out: *mut T) -> Result<RawHandle, ErrorCode> {
    if !status.is_ok() {
        return Err(status);
    }
    unsafe { RawHandle::from_ptr(out.cast()) }.ok_or(ErrorCode::NullPointer)
}

fn span(bytes: &[u8]) -> BytesData {
    if bytes.is_empty() {
        BytesData::empty()
    } else {
        BytesData::new(bytes)
    }
}

impl NativeApi for LinkedNative {
    fn runtime_new(&self, worker_threads: u32, max_blocking_threads: u32) -> Result<RawHandle, ErrorCode> {
        let mut out: *mut RuntimeHandle = std::ptr::null_mut();
        let status = unsafe { fusion_native::fusion_runtime_new(worker_threads, max_blocking_threads, &mut out) };
        out_handle(status, out)
    }

    unsafe fn runtime_destroy(&self, runtime: RawHandle) -> ErrorCode {
        fusion_native::fusion_runtime_destroy(runtime.cast())
    }

    fn context_new(&self, runtime: RawHandle) -> Result<RawHandle, ErrorCode> {
        let mut out: *mut SessionContextWrapper = std::ptr::null_mut();
        let status = unsafe { fusion_native::fusion_context_new(runtime.cast(), &mut out) };
        out_handle(status, out)
    }

    unsafe fn context_destroy(&self, context: RawHandle) -> ErrorCode {
        fusion_native::fusion_context_destroy(context.cast())
    }

    fn context_register(
        &self,
        context: RawHandle,
        format: FileFormat,
        table: &CStr,
        path: &CStr,
        options: &[u8],
        callback: Callback,
        token: u64,
    ) -> ErrorCode {
        let ctx = context.cast::<SessionContextWrapper>();
        let (table, path, options) = (table.as_ptr(), path.as_ptr(), span(options));
        unsafe {
            match format {
                FileFormat::Csv => fusion_native::fusion_context_register_csv(ctx, table, path, options, callback, token),
                FileFormat::Json => {
                    fusion_native::fusion_context_register_json(ctx, table, path, options, callback, token)
                }
                FileFormat::Parquet => {
                    fusion_native::fusion_context_register_parquet(ctx, table, path, options, callback, token)
                }
            }
        }
    }

    fn context_sql(&self, context: RawHandle, sql: &CStr, callback: Callback, token: u64) -> ErrorCode {
        unsafe { fusion_native::fusion_context_sql(context.cast(), sql.as_ptr(), callback, token) }
    }

    unsafe fn dataframe_destroy(&self, dataframe: RawHandle) -> ErrorCode {
        fusion_native::fusion_dataframe_destroy(dataframe.cast())
    }

    fn dataframe_count(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_count(dataframe.cast(), callback, token) }
    }

    fn dataframe_show(&self, dataframe: RawHandle, limit: u64, callback: Callback, token: u64) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_show(dataframe.cast(), limit, callback, token) }
    }

    fn dataframe_to_string(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_to_string(dataframe.cast(), callback, token) }
    }

    fn dataframe_schema(
        &self,
        dataframe: RawHandle,
        encoding: BatchEncoding,
        callback: Callback,
        token: u64,
    ) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_schema(dataframe.cast(), encoding as u32, callback, token) }
    }

    fn dataframe_collect(
        &self,
        dataframe: RawHandle,
        encoding: BatchEncoding,
        callback: Callback,
        token: u64,
    ) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_collect(dataframe.cast(), encoding as u32, callback, token) }
    }

    fn dataframe_write(
        &self,
        dataframe: RawHandle,
        format: FileFormat,
        path: &CStr,
        options: &[u8],
        callback: Callback,
        token: u64,
    ) -> ErrorCode {
        let df = dataframe.cast::<DataFrameWrapper>();
        let (path, options) = (path.as_ptr(), span(options));
        unsafe {
            match format {
                FileFormat::Csv => fusion_native::fusion_dataframe_write_csv(df, path, options, callback, token),
                FileFormat::Json => fusion_native::fusion_dataframe_write_json(df, path, options, callback, token),
                FileFormat::Parquet => {
                    fusion_native::fusion_dataframe_write_parquet(df, path, options, callback, token)
                }
            }
        }
    }

    fn dataframe_execute_stream(&self, dataframe: RawHandle, callback: Callback, token: u64) -> ErrorCode {
        unsafe { fusion_native::fusion_dataframe_execute_stream(dataframe.cast(), callback, token) }
    }

    fn stream_next(&self, stream: RawHandle, encoding: BatchEncoding, callback: Callback, token: u64) -> ErrorCode {
        let stream = stream.cast::<RecordBatchStreamWrapper>();
        unsafe { fusion_native::fusion_stream_next(stream, encoding as u32, callback, token) }
    }

    unsafe fn stream_destroy(&self, stream: RawHandle) -> ErrorCode {
        fusion_native::fusion_stream_destroy(stream.cast())
    }
}
