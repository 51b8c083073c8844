//! Data frame operations. A data frame is a logical plan; every operation
//! here executes it (or inspects it) on the owning runtime.

use crate::abi::{BatchEncoding, BytesData, Callback, CollectedRecordBatches, ErrorCode, FileFormat};
use crate::runtime::RuntimeHandle;
use crate::stream::RecordBatchStreamWrapper;
use crate::{mappers, serialization, wire, Completion, ErrorInfo};
use arrow::array::{Array, StructArray};
use arrow::ffi::{FFI_ArrowArray, FFI_ArrowSchema};
use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use datafusion::prelude::DataFrame;
use std::ffi::c_char;
use std::sync::Arc;

/// A planned query and the runtime it executes on.
pub struct DataFrameWrapper {
    runtime: RuntimeHandle,
    inner: DataFrame,
}

impl DataFrameWrapper {
    pub(crate) fn new(runtime: RuntimeHandle, inner: DataFrame) -> Self {
        Self { runtime, inner }
    }

    fn arrow_schema(&self) -> SchemaRef {
        Arc::new(self.inner.schema().as_arrow().clone())
    }

    fn spawn<F, Fut>(&self, callback: Callback, token: u64, work: F) -> ErrorCode
    where
        F: FnOnce(DataFrame, Completion) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let df = self.inner.clone();
        self.runtime.spawn_operation(callback, token, |completion| work(df, completion))
    }
}

/// Export a schema through the C data interface and hand it to the host.
fn report_schema_cdata(schema: &Schema, completion: Completion) {
    match FFI_ArrowSchema::try_from(schema) {
        Ok(mut ffi_schema) => completion.succeed_mut(&mut ffi_schema),
        Err(e) => completion.fail(ErrorInfo::engine(e)),
    }
}

fn report_schema_ipc(schema: &Schema, completion: Completion) {
    match serialization::schema_to_bytes(schema) {
        Ok(bytes) => completion.succeed(&BytesData::new(&bytes)),
        Err(e) => completion.fail(ErrorInfo::engine(e)),
    }
}

/// Export one batch as a struct array.
pub(crate) fn batch_to_ffi(batch: RecordBatch) -> FFI_ArrowArray {
    let array = StructArray::from(batch);
    FFI_ArrowArray::new(&array.to_data())
}

fn report_collected_cdata(schema: &Schema, batches: Vec<RecordBatch>, completion: Completion) {
    let mut ffi_schema = match FFI_ArrowSchema::try_from(schema) {
        Ok(ffi_schema) => ffi_schema,
        Err(e) => return completion.fail(ErrorInfo::engine(e)),
    };
    let mut arrays: Vec<FFI_ArrowArray> = batches.into_iter().map(batch_to_ffi).collect();
    let mut collected = CollectedRecordBatches {
        schema: &mut ffi_schema,
        batch_count: arrays.len() as u64,
        batches: arrays.as_mut_ptr(),
    };
    completion.succeed_mut(&mut collected);
    // Whatever the host did not move out is released here.
    drop(arrays);
    drop(ffi_schema);
}

fn report_collected_ipc(schema: &Schema, batches: &[RecordBatch], completion: Completion) {
    match serialization::batches_to_bytes(schema, batches) {
        Ok(bytes) => completion.succeed(&BytesData::new(&bytes)),
        Err(e) => completion.fail(ErrorInfo::engine(e)),
    }
}

/// Destroys a data frame. Streams created from it stay usable.
///
/// # Safety
/// `dataframe_ptr` must have been produced by `fusion_context_sql` (or be
/// null) and must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_destroy(dataframe_ptr: *mut DataFrameWrapper) -> ErrorCode {
    if !dataframe_ptr.is_null() {
        log::debug!("Destroying data frame {dataframe_ptr:p}");
        drop(Box::from_raw(dataframe_ptr));
    }
    ErrorCode::Ok
}

/// Counts the rows the data frame produces. The callback receives a `u64`.
///
/// # Safety
/// `dataframe_ptr` must be a live data frame; `callback` must be valid to
/// call from any thread.
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_count(
    dataframe_ptr: *mut DataFrameWrapper,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    dataframe.spawn(callback, token, |df, completion| async move {
        let result = df.count().await.map(|n| n as u64).map_err(ErrorInfo::engine);
        completion.finish(result);
    })
}

/// Prints the data frame to the engine's stdout. `limit == 0` prints every
/// row. The callback receives no result data.
///
/// # Safety
/// See [`fusion_dataframe_count`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_show(
    dataframe_ptr: *mut DataFrameWrapper,
    limit: u64,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    dataframe.spawn(callback, token, |df, completion| async move {
        let result = if limit > 0 {
            df.show_limit(limit as usize).await
        } else {
            df.show().await
        };
        completion.finish(result.map_err(ErrorInfo::engine));
    })
}

/// Renders the data frame as a table. The callback receives a
/// [`BytesData`] span of UTF-8, valid only during the callback.
///
/// # Safety
/// See [`fusion_dataframe_count`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_to_string(
    dataframe_ptr: *mut DataFrameWrapper,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    dataframe.spawn(callback, token, |df, completion| async move {
        let rendered = match df.collect().await {
            Ok(batches) => datafusion::arrow::util::pretty::pretty_format_batches(&batches)
                .map(|table| table.to_string())
                .map_err(ErrorInfo::engine),
            Err(e) => Err(ErrorInfo::engine(e)),
        };
        match rendered {
            Ok(text) => completion.succeed(&BytesData::new(text.as_bytes())),
            Err(e) => completion.fail(e),
        }
    })
}

/// Reports the data frame's output schema. With [`BatchEncoding::Ipc`] the
/// callback receives a [`BytesData`] span holding an IPC stream header;
/// with [`BatchEncoding::CData`] it receives a `*mut FFI_ArrowSchema` the
/// host must move out of.
///
/// # Safety
/// See [`fusion_dataframe_count`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_schema(
    dataframe_ptr: *mut DataFrameWrapper,
    encoding: u32,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let Some(encoding) = BatchEncoding::from_repr(encoding) else {
        return ErrorCode::InvalidArgument;
    };
    let schema = dataframe.arrow_schema();
    dataframe.spawn(callback, token, |_, completion| async move {
        match encoding {
            BatchEncoding::Ipc => report_schema_ipc(&schema, completion),
            BatchEncoding::CData => report_schema_cdata(&schema, completion),
        }
    })
}

/// Executes the data frame and reports every batch. With
/// [`BatchEncoding::Ipc`] the callback receives one IPC stream in a
/// [`BytesData`] span; with [`BatchEncoding::CData`] it receives a
/// [`CollectedRecordBatches`] whose members the host must move out of.
///
/// # Safety
/// See [`fusion_dataframe_count`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_collect(
    dataframe_ptr: *mut DataFrameWrapper,
    encoding: u32,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let Some(encoding) = BatchEncoding::from_repr(encoding) else {
        return ErrorCode::InvalidArgument;
    };
    let schema = dataframe.arrow_schema();
    dataframe.spawn(callback, token, |df, completion| async move {
        let batches = match df.collect().await {
            Ok(batches) => batches,
            Err(e) => return completion.fail(ErrorInfo::engine(e)),
        };
        log::debug!("Collected {} batches for token {token}", batches.len());
        let schema = batches.first().map(|b| b.schema()).unwrap_or(schema);
        match encoding {
            BatchEncoding::Ipc => report_collected_ipc(&schema, &batches, completion),
            BatchEncoding::CData => report_collected_cdata(&schema, batches, completion),
        }
    })
}

fn dispatch_write(
    dataframe: &DataFrameWrapper,
    format: FileFormat,
    path: String,
    options: wire::WriteOptions,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    if path.is_empty() {
        return ErrorCode::InvalidArgument;
    }
    log::debug!("Writing {format} to '{path}' for token {token}");
    dataframe.spawn(callback, token, |df, completion| async move {
        let write_options = mappers::write_options(&options);
        let result = match format {
            FileFormat::Csv => df.write_csv(&path, write_options, None).await,
            FileFormat::Json => df.write_json(&path, write_options, None).await,
            FileFormat::Parquet => df.write_parquet(&path, write_options, None).await,
        };
        completion.finish(result.map(|_| ()).map_err(ErrorInfo::engine));
    })
}

/// Executes the data frame and writes CSV to `path`. `options` is an
/// encoded `wire::WriteOptions` (empty span for defaults). The callback
/// receives no result data.
///
/// # Safety
/// See [`fusion_dataframe_count`]; `path_ptr` must be a valid
/// null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_write_csv(
    dataframe_ptr: *mut DataFrameWrapper,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::WriteOptions);
    dispatch_write(dataframe, FileFormat::Csv, path, options, callback, token)
}

/// Executes the data frame and writes newline-delimited JSON to `path`.
///
/// # Safety
/// See [`fusion_dataframe_write_csv`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_write_json(
    dataframe_ptr: *mut DataFrameWrapper,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::WriteOptions);
    dispatch_write(dataframe, FileFormat::Json, path, options, callback, token)
}

/// Executes the data frame and writes Parquet to `path`.
///
/// # Safety
/// See [`fusion_dataframe_write_csv`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_write_parquet(
    dataframe_ptr: *mut DataFrameWrapper,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::WriteOptions);
    dispatch_write(dataframe, FileFormat::Parquet, path, options, callback, token)
}

/// Starts streaming execution. The callback receives a pointer to a
/// `*mut RecordBatchStreamWrapper`, owned by the host and released with
/// `fusion_stream_destroy`.
///
/// # Safety
/// See [`fusion_dataframe_count`].
#[no_mangle]
pub unsafe extern "C" fn fusion_dataframe_execute_stream(
    dataframe_ptr: *mut DataFrameWrapper,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let dataframe = ffi_ref!(dataframe_ptr);
    let runtime = Arc::clone(&dataframe.runtime);
    dataframe.spawn(callback, token, |df, completion| async move {
        match df.execute_stream().await {
            Ok(stream) => {
                let wrapper = Box::into_raw(Box::new(RecordBatchStreamWrapper::new(runtime, stream)));
                completion.succeed(&wrapper);
            }
            Err(e) => completion.fail(ErrorInfo::engine(e)),
        }
    })
}
