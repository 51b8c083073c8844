#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]

//! FFI-bindings for DataFusion. This crate provides a C ABI for the
//! DataFusion query engine, suitable for use from other languages (and
//! from the async host binding in the `fusion_client` crate).
//!
//! Every long-running call is asynchronous: the entry point validates its
//! arguments, spawns the work onto the engine's own tokio runtime and
//! returns a synchronous [`ErrorCode`]. `ErrorCode::Ok` means the supplied
//! [`Callback`] will be invoked exactly once with the caller's correlation
//! token; any other code means it never will be.

#[macro_use]
mod macros;

pub mod abi;
mod callback;
mod mappers;
pub mod runtime;
pub mod context;
pub mod dataframe;
pub mod stream;
pub mod serialization;
pub mod wire;

pub use abi::{BatchEncoding, BytesData, Callback, CollectedRecordBatches, ErrorCode, ErrorInfoData, FileFormat};
pub use runtime::{fusion_runtime_destroy, fusion_runtime_new, NativeRuntime, RuntimeHandle};
pub use context::{
    fusion_context_destroy, fusion_context_new, fusion_context_register_csv, fusion_context_register_json,
    fusion_context_register_parquet, fusion_context_sql, SessionContextWrapper,
};
pub use dataframe::{
    fusion_dataframe_collect, fusion_dataframe_count, fusion_dataframe_destroy, fusion_dataframe_execute_stream,
    fusion_dataframe_schema, fusion_dataframe_show, fusion_dataframe_to_string, fusion_dataframe_write_csv,
    fusion_dataframe_write_json, fusion_dataframe_write_parquet, DataFrameWrapper,
};
pub use stream::{fusion_stream_destroy, fusion_stream_next, RecordBatchStreamWrapper};

pub(crate) use callback::{Completion, ErrorInfo};
