//! Session contexts: table registration and SQL planning.

use crate::dataframe::DataFrame;
use crate::decoders;
use crate::error::{ErrorCode, FusionError, Result};
use crate::handle::{HandleKind, HandleReclaim, OwnedHandle};
use crate::native::RawHandle;
use crate::operation;
use crate::registry::OperationContext;
use crate::options::{encode_payload, CsvReadOptions, JsonReadOptions, OptionsPayload, ParquetReadOptions};
use crate::runtime::Runtime;
use fusion_native::FileFormat;
use std::ffi::CString;
use std::sync::Arc;

/// Convert a non-empty argument to a C string.
pub(crate) fn c_argument(name: &str, value: &str) -> Result<CString> {
    if value.is_empty() {
        return Err(FusionError::invalid_argument(format!("{name} must not be empty")));
    }
    CString::new(value).map_err(|_| FusionError::invalid_argument(format!("{name} must not contain NUL bytes")))
}

struct SessionInner {
    handle: OwnedHandle,
    runtime: Runtime,
}

/// A session: a table catalog plus the runtime it executes on.
///
/// A session is meant for one logical caller at a time. Clones share the
/// session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    pub(crate) fn new(runtime: Runtime, raw: RawHandle) -> Self {
        let handle = OwnedHandle::new(HandleKind::Session, raw, Arc::clone(runtime.api()));
        Self {
            inner: Arc::new(SessionInner { handle, runtime }),
        }
    }

    /// The runtime this session executes on.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// `true` until [`SessionContext::close`].
    pub fn is_valid(&self) -> bool {
        self.inner.handle.is_valid()
    }

    /// Release the session. Data frames already planned stay usable.
    pub fn close(&self) -> ErrorCode {
        self.inner.handle.release()
    }

    async fn register<O: OptionsPayload>(
        &self,
        format: FileFormat,
        table: &str,
        path: &str,
        options: Option<&O>,
    ) -> Result<()> {
        let table = c_argument("table name", table)?;
        let path = c_argument("path", path)?;
        let payload = encode_payload(options)?;
        let pending = operation::dispatch::<(), _>(self.runtime().registry(), "register", None, |token| {
            self.inner.handle.with(|api, ctx| {
                api.context_register(ctx, format, &table, &path, &payload, decoders::complete_void, token)
            })
        })?;
        pending.await
    }

    /// Register a CSV file or directory as `table`.
    pub async fn register_csv(&self, table: &str, path: &str, options: Option<CsvReadOptions>) -> Result<()> {
        self.register(FileFormat::Csv, table, path, options.as_ref()).await
    }

    /// Register a newline-delimited JSON file or directory as `table`.
    pub async fn register_json(&self, table: &str, path: &str, options: Option<JsonReadOptions>) -> Result<()> {
        self.register(FileFormat::Json, table, path, options.as_ref()).await
    }

    /// Register a Parquet file or directory as `table`.
    pub async fn register_parquet(&self, table: &str, path: &str, options: Option<ParquetReadOptions>) -> Result<()> {
        self.register(FileFormat::Parquet, table, path, options.as_ref()).await
    }

    /// Plan `sql`. Planning errors (unknown tables, bad syntax) surface here.
    pub async fn sql(&self, sql: &str) -> Result<DataFrame> {
        let sql = c_argument("sql", sql)?;
        let reclaim: OperationContext =
            Arc::new(HandleReclaim::new(HandleKind::DataFrame, Arc::clone(self.runtime().api())));
        let raw = operation::execute::<RawHandle, _>(self.runtime().registry(), "sql", Some(reclaim), |token| {
            self.inner
                .handle
                .with(|api, ctx| api.context_sql(ctx, &sql, decoders::complete_handle, token))
        })
        .await?;
        Ok(DataFrame::new(self.clone(), raw))
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").field("valid", &self.is_valid()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_checked_before_dispatch() {
        assert_eq!(c_argument("path", "").unwrap_err().code(), ErrorCode::InvalidArgument);
        let error = c_argument("table name", "a\0b").unwrap_err();
        assert_eq!(error.message(), "table name must not contain NUL bytes");
        assert_eq!(c_argument("sql", "SELECT 1").unwrap().as_bytes(), b"SELECT 1");
    }
}
