//! Data frames: planned queries and the operations that execute them.

use crate::decoders::{self, FrameSchema};
use crate::error::{ErrorCode, FusionError, Result};
use crate::handle::{HandleKind, HandleReclaim, OwnedHandle};
use crate::native::{NativeApi, RawHandle};
use crate::operation;
use crate::options::{encode_payload, WriteOptions};
use crate::registry::OperationContext;
use crate::runtime::TransferMode;
use crate::session::{c_argument, SessionContext};
use crate::stream::DataFrameStream;
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use fusion_native::{Callback, FileFormat};
use std::sync::Arc;

/// Every batch a query produced, with the schema they share.
#[derive(Debug, Clone)]
pub struct CollectedBatches {
    /// Output schema.
    pub schema: SchemaRef,
    /// Batches in execution order.
    pub batches: Vec<RecordBatch>,
}

impl CollectedBatches {
    /// Total rows across every batch.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// A planned query. Executing it does not consume it.
///
/// Not meant for concurrent use by several callers; issue one operation,
/// await it, then issue the next.
pub struct DataFrame {
    handle: OwnedHandle,
    session: SessionContext,
}

impl DataFrame {
    pub(crate) fn new(session: SessionContext, raw: RawHandle) -> Self {
        let handle = OwnedHandle::new(HandleKind::DataFrame, raw, Arc::clone(session.runtime().api()));
        Self { handle, session }
    }

    /// The session that planned this data frame.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// `true` until [`DataFrame::close`].
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Release the data frame. Streams already started stay usable.
    pub fn close(&self) -> ErrorCode {
        self.handle.release()
    }

    fn mode(&self) -> TransferMode {
        self.session.runtime().config().transfer_mode()
    }

    async fn run<T, F>(&self, operation: &str, context: Option<OperationContext>, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn NativeApi, RawHandle, u64) -> fusion_native::ErrorCode,
    {
        let registry = self.session.runtime().registry();
        operation::execute(registry, operation, context, |token| {
            self.handle.with(|api, df| call(api, df, token))
        })
        .await
    }

    /// Count the rows the query produces.
    pub async fn count(&self) -> Result<u64> {
        self.run("count", None, |api, df, token| {
            api.dataframe_count(df, decoders::complete_u64, token)
        })
        .await
    }

    /// Print every row to the engine's stdout.
    pub async fn show(&self) -> Result<()> {
        self.run("show", None, |api, df, token| {
            api.dataframe_show(df, 0, decoders::complete_void, token)
        })
        .await
    }

    /// Print at most `limit` rows. `limit` must be positive.
    pub async fn show_limit(&self, limit: u64) -> Result<()> {
        if limit == 0 {
            return Err(FusionError::invalid_argument("limit must be greater than zero"));
        }
        self.run("show", None, |api, df, token| {
            api.dataframe_show(df, limit, decoders::complete_void, token)
        })
        .await
    }

    /// Render the result as a text table.
    pub async fn to_string_async(&self) -> Result<String> {
        self.run("to_string", None, |api, df, token| {
            api.dataframe_to_string(df, decoders::complete_string, token)
        })
        .await
    }

    /// The output schema.
    pub async fn schema(&self) -> Result<SchemaRef> {
        let mode = self.mode();
        let decoder: Callback = match mode {
            TransferMode::ZeroCopy => decoders::complete_schema_cdata,
            TransferMode::Copy => decoders::complete_schema_ipc,
        };
        self.run("schema", None, |api, df, token| {
            api.dataframe_schema(df, mode.encoding(), decoder, token)
        })
        .await
    }

    /// Execute and gather every batch.
    pub async fn collect(&self) -> Result<CollectedBatches> {
        let mode = self.mode();
        let decoder: Callback = match mode {
            TransferMode::ZeroCopy => decoders::complete_collect_cdata,
            TransferMode::Copy => decoders::complete_collect_ipc,
        };
        let collected: CollectedBatches = self
            .run("collect", None, |api, df, token| {
                api.dataframe_collect(df, mode.encoding(), decoder, token)
            })
            .await?;
        log::debug!(
            "Collected {} rows in {} batches",
            collected.num_rows(),
            collected.batches.len()
        );
        Ok(collected)
    }

    async fn write(&self, format: FileFormat, path: &str, options: Option<WriteOptions>) -> Result<()> {
        let path = c_argument("path", path)?;
        let payload = encode_payload(options.as_ref())?;
        self.run("write", None, |api, df, token| {
            api.dataframe_write(df, format, &path, &payload, decoders::complete_void, token)
        })
        .await
    }

    /// Execute and write CSV to `path`.
    pub async fn write_csv(&self, path: &str, options: Option<WriteOptions>) -> Result<()> {
        self.write(FileFormat::Csv, path, options).await
    }

    /// Execute and write newline-delimited JSON to `path`.
    pub async fn write_json(&self, path: &str, options: Option<WriteOptions>) -> Result<()> {
        self.write(FileFormat::Json, path, options).await
    }

    /// Execute and write Parquet to `path`.
    pub async fn write_parquet(&self, path: &str, options: Option<WriteOptions>) -> Result<()> {
        self.write(FileFormat::Parquet, path, options).await
    }

    /// Start incremental execution.
    pub async fn execute_stream(&self) -> Result<DataFrameStream> {
        let schema = self.schema().await?;
        let reclaim: OperationContext = Arc::new(HandleReclaim::new(
            HandleKind::Stream,
            Arc::clone(self.session.runtime().api()),
        ));
        let raw: RawHandle = self
            .run("execute_stream", Some(reclaim), |api, df, token| {
                api.dataframe_execute_stream(df, decoders::complete_handle, token)
            })
            .await?;
        let handle = OwnedHandle::new(HandleKind::Stream, raw, Arc::clone(self.session.runtime().api()));
        Ok(DataFrameStream::new(
            handle,
            FrameSchema(schema),
            self.session.runtime().clone(),
        ))
    }
}

impl std::fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFrame").field("valid", &self.is_valid()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int32Array;
    use arrow_schema::{DataType, Field, Schema};

    #[test]
    fn row_count_spans_batches() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let batch = |n: usize| {
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(vec![0; n]))]).unwrap()
        };
        let collected = CollectedBatches {
            schema: schema.clone(),
            batches: vec![batch(2), batch(1)],
        };
        assert_eq!(collected.num_rows(), 3);
    }
}
