#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]

//! Async host binding for the `fusion_native` engine.
//!
//! Every engine call is dispatched with a correlation token and completes
//! later through an `extern "C"` callback on an engine thread. This crate
//! routes those callbacks back to the awaiting task:
//!
//! - [`OperationRegistry`] maps tokens to one-shot channels.
//! - The decoders turn raw callback payloads (integers, byte spans, Arrow C
//!   data interface structs, IPC frames) into host values and errors.
//! - [`Runtime`], [`SessionContext`], [`DataFrame`] and [`DataFrameStream`]
//!   own their native handles and release each exactly once.
//!
//! ```no_run
//! # async fn demo() -> fusion_client::Result<()> {
//! use fusion_client::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::default())?;
//! let session = runtime.create_session()?;
//! session.register_csv("trips", "data/trips.csv", None).await?;
//! let df = session.sql("SELECT count(*) FROM trips").await?;
//! let collected = df.collect().await?;
//! println!("{} rows", collected.num_rows());
//! # Ok(())
//! # }
//! ```

mod buffer;
mod dataframe;
mod decoders;
mod error;
mod handle;
mod native;
mod operation;
mod options;
mod registry;
mod runtime;
mod session;
mod stream;

pub use buffer::{NativeBufferView, NativeMemoryCursor};
pub use dataframe::{CollectedBatches, DataFrame};
pub use error::{ErrorCode, FusionError, Result};
pub use handle::HandleKind;
pub use native::{LinkedNative, NativeApi, RawHandle};
pub use options::{CompressionType, CsvReadOptions, JsonReadOptions, ParquetReadOptions, SortKey, WriteOptions};
pub use registry::{OperationContext, OperationRegistry, PendingOperation};
pub use runtime::{Runtime, RuntimeConfig, TransferMode, DEFAULT_MAX_BLOCKING_THREADS, DEFAULT_WORKER_THREADS};
pub use session::SessionContext;
pub use stream::DataFrameStream;
