//! Session contexts: table registration and SQL planning.

use crate::abi::{BytesData, Callback, ErrorCode};
use crate::dataframe::DataFrameWrapper;
use crate::runtime::RuntimeHandle;
use crate::{mappers, serialization, wire, ErrorInfo};
use datafusion::prelude::SessionContext;
use std::ffi::c_char;
use std::sync::Arc;

/// A DataFusion [`SessionContext`] bound to the runtime it executes on.
pub struct SessionContextWrapper {
    runtime: RuntimeHandle,
    inner: Arc<SessionContext>,
}

impl SessionContextWrapper {
    fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            inner: Arc::new(SessionContext::new()),
        }
    }
}

enum TableSource {
    Csv(wire::CsvReadOptions),
    Json(wire::JsonReadOptions),
    Parquet(wire::ParquetReadOptions),
}

impl TableSource {
    fn kind(&self) -> &'static str {
        match self {
            TableSource::Csv(_) => "CSV",
            TableSource::Json(_) => "JSON",
            TableSource::Parquet(_) => "Parquet",
        }
    }
}

fn schema_from_options(bytes: &[u8]) -> Result<Option<datafusion::arrow::datatypes::Schema>, ErrorInfo> {
    serialization::optional_schema(bytes).map_err(|e| ErrorInfo::new(ErrorCode::InvalidArgument, e))
}

async fn register_source(
    ctx: Arc<SessionContext>,
    table: String,
    path: String,
    source: TableSource,
) -> Result<(), ErrorInfo> {
    match source {
        TableSource::Csv(options) => {
            let schema = schema_from_options(&options.schema)?;
            let read_options =
                mappers::csv_read_options(&options, schema.as_ref()).map_err(ErrorInfo::invalid_argument)?;
            ctx.register_csv(table.as_str(), &path, read_options).await.map_err(ErrorInfo::engine)
        }
        TableSource::Json(options) => {
            let schema = schema_from_options(&options.schema)?;
            let read_options =
                mappers::json_read_options(&options, schema.as_ref()).map_err(ErrorInfo::invalid_argument)?;
            ctx.register_json(table.as_str(), &path, read_options).await.map_err(ErrorInfo::engine)
        }
        TableSource::Parquet(options) => {
            let schema = schema_from_options(&options.schema)?;
            let read_options =
                mappers::parquet_read_options(&options, schema.as_ref()).map_err(ErrorInfo::invalid_argument)?;
            ctx.register_parquet(table.as_str(), &path, read_options).await.map_err(ErrorInfo::engine)
        }
    }
}

fn dispatch_register(
    context: &SessionContextWrapper,
    table: String,
    path: String,
    source: TableSource,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    if table.is_empty() || path.is_empty() {
        return ErrorCode::InvalidArgument;
    }
    let inner = Arc::clone(&context.inner);
    log::debug!("Registering {} table '{table}' from '{path}'", source.kind());

    context.runtime.spawn_operation(callback, token, |completion| async move {
        let result = register_source(inner, table, path, source).await;
        completion.finish(result);
    })
}

/// Creates a new `SessionContext` bound to a runtime.
///
/// # Safety
/// - `runtime_ptr` must be a valid pointer returned by `fusion_runtime_new`
/// - `context_ptr` must be a valid, aligned pointer to a null pointer
/// - Caller must call `fusion_context_destroy` exactly once with the result
#[no_mangle]
pub unsafe extern "C" fn fusion_context_new(
    runtime_ptr: *mut RuntimeHandle,
    context_ptr: *mut *mut SessionContextWrapper,
) -> ErrorCode {
    if context_ptr.is_null() {
        return ErrorCode::NullPointer;
    }
    if !(*context_ptr).is_null() {
        return ErrorCode::AlreadyInitialized;
    }
    let runtime = ffi_ref!(runtime_ptr);
    if runtime.is_closed() {
        return ErrorCode::NotInitialized;
    }

    let context = Box::new(SessionContextWrapper::new(Arc::clone(runtime)));
    *context_ptr = Box::into_raw(context);
    log::debug!("Created context {:p}", *context_ptr);
    ErrorCode::Ok
}

/// Destroys a `SessionContext`. Data frames created from it stay usable.
///
/// # Safety
/// `context_ptr` must have been returned by `fusion_context_new` (or be
/// null) and must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn fusion_context_destroy(context_ptr: *mut SessionContextWrapper) -> ErrorCode {
    if !context_ptr.is_null() {
        log::debug!("Destroying context {context_ptr:p}");
        drop(Box::from_raw(context_ptr));
    }
    ErrorCode::Ok
}

/// Registers a CSV file (or directory) as a table. The callback receives
/// no result data.
///
/// `options` is an encoded `wire::CsvReadOptions`; an empty span uses the
/// engine defaults.
///
/// # Safety
/// - `context_ptr` must be a valid pointer returned by `fusion_context_new`
/// - `table_ptr` and `path_ptr` must be valid null-terminated strings
/// - `options` must describe readable memory for the duration of the call
/// - `callback` must be valid to call from any thread
#[no_mangle]
pub unsafe extern "C" fn fusion_context_register_csv(
    context_ptr: *mut SessionContextWrapper,
    table_ptr: *const c_char,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let context = ffi_ref!(context_ptr);
    let table = ffi_cstr_to_string!(table_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::CsvReadOptions);
    dispatch_register(context, table, path, TableSource::Csv(options), callback, token)
}

/// Registers a newline-delimited JSON file as a table.
///
/// # Safety
/// Same contract as [`fusion_context_register_csv`], with an encoded
/// `wire::JsonReadOptions`.
#[no_mangle]
pub unsafe extern "C" fn fusion_context_register_json(
    context_ptr: *mut SessionContextWrapper,
    table_ptr: *const c_char,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let context = ffi_ref!(context_ptr);
    let table = ffi_cstr_to_string!(table_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::JsonReadOptions);
    dispatch_register(context, table, path, TableSource::Json(options), callback, token)
}

/// Registers a Parquet file as a table.
///
/// # Safety
/// Same contract as [`fusion_context_register_csv`], with an encoded
/// `wire::ParquetReadOptions`.
#[no_mangle]
pub unsafe extern "C" fn fusion_context_register_parquet(
    context_ptr: *mut SessionContextWrapper,
    table_ptr: *const c_char,
    path_ptr: *const c_char,
    options: BytesData,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let context = ffi_ref!(context_ptr);
    let table = ffi_cstr_to_string!(table_ptr);
    let path = ffi_cstr_to_string!(path_ptr);
    let options = ffi_options!(options, wire::ParquetReadOptions);
    dispatch_register(context, table, path, TableSource::Parquet(options), callback, token)
}

/// Plans a SQL statement. The callback receives a pointer to a
/// `*mut DataFrameWrapper`; the host owns the data frame and must release
/// it with `fusion_dataframe_destroy`.
///
/// # Safety
/// - `context_ptr` must be a valid pointer returned by `fusion_context_new`
/// - `sql_ptr` must be a valid null-terminated string
/// - `callback` must be valid to call from any thread
#[no_mangle]
pub unsafe extern "C" fn fusion_context_sql(
    context_ptr: *mut SessionContextWrapper,
    sql_ptr: *const c_char,
    callback: Callback,
    token: u64,
) -> ErrorCode {
    let context = ffi_ref!(context_ptr);
    let sql = ffi_cstr_to_string!(sql_ptr);
    let runtime = Arc::clone(&context.runtime);
    let inner = Arc::clone(&context.inner);
    log::debug!("Planning SQL for token {token}: {sql}");

    context.runtime.spawn_operation(callback, token, |completion| async move {
        match inner.sql(&sql).await {
            Ok(df) => {
                let dataframe = Box::into_raw(Box::new(DataFrameWrapper::new(runtime, df)));
                completion.succeed(&dataframe);
            }
            Err(e) => completion.fail(ErrorInfo::engine(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{fusion_runtime_destroy, fusion_runtime_new};
    use std::ffi::CString;

    #[test]
    fn context_requires_a_live_runtime() {
        let mut runtime = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_runtime_new(1, 0, &mut runtime) }, ErrorCode::Ok);

        let mut context = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_context_new(std::ptr::null_mut(), &mut context) }, ErrorCode::NullPointer);
        assert_eq!(unsafe { fusion_context_new(runtime, &mut context) }, ErrorCode::Ok);
        assert_eq!(unsafe { fusion_context_new(runtime, &mut context) }, ErrorCode::AlreadyInitialized);

        // A context that outlives its runtime refuses new work.
        assert_eq!(unsafe { fusion_runtime_destroy(runtime) }, ErrorCode::Ok);
        let table = CString::new("t").unwrap();
        let path = CString::new("/tmp/t.csv").unwrap();
        let status = unsafe {
            fusion_context_register_csv(
                context,
                table.as_ptr(),
                path.as_ptr(),
                BytesData::empty(),
                crate::callback::test_support::record_u64,
                8001,
            )
        };
        assert_eq!(status, ErrorCode::NotInitialized);
        assert_eq!(unsafe { fusion_context_destroy(context) }, ErrorCode::Ok);
    }

    #[test]
    fn bad_arguments_fail_synchronously() {
        let mut runtime = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_runtime_new(1, 0, &mut runtime) }, ErrorCode::Ok);
        let mut context = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_context_new(runtime, &mut context) }, ErrorCode::Ok);

        let table = CString::new("t").unwrap();
        let empty = CString::new("").unwrap();
        let garbage = [0xffu8, 0xff, 0xff];
        let record = crate::callback::test_support::record_u64;
        unsafe {
            assert_eq!(
                fusion_context_register_csv(context, table.as_ptr(), empty.as_ptr(), BytesData::empty(), record, 8002),
                ErrorCode::InvalidArgument
            );
            assert_eq!(
                fusion_context_register_json(
                    context,
                    table.as_ptr(),
                    table.as_ptr(),
                    BytesData::new(&garbage),
                    record,
                    8003
                ),
                ErrorCode::InvalidArgument
            );
            let bad_utf8 = [0xc3u8, 0x28, 0x00];
            assert_eq!(
                fusion_context_sql(context, bad_utf8.as_ptr().cast(), record, 8004),
                ErrorCode::InvalidUtf8
            );
            assert_eq!(fusion_context_sql(context, std::ptr::null(), record, 8005), ErrorCode::NullPointer);
        }
        for token in 8002..=8005 {
            assert!(crate::callback::test_support::recorded(token).is_empty());
        }

        assert_eq!(unsafe { fusion_context_destroy(context) }, ErrorCode::Ok);
        assert_eq!(unsafe { fusion_runtime_destroy(runtime) }, ErrorCode::Ok);
    }
}
