//! The host's handle on an engine runtime.

use crate::error::{ErrorCode, FusionError, Result};
use crate::handle::{HandleKind, OwnedHandle};
use crate::native::{LinkedNative, NativeApi};
use crate::registry::OperationRegistry;
use crate::session::SessionContext;
use std::sync::Arc;

/// Default engine worker threads.
pub const DEFAULT_WORKER_THREADS: u32 = 4;
/// Default cap on engine blocking threads.
pub const DEFAULT_MAX_BLOCKING_THREADS: u32 = 512;

/// How schemas and batches cross the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Import Arrow C data interface structs. Batches keep engine memory
    /// alive until they are dropped.
    #[default]
    ZeroCopy,
    /// Copy through the Arrow IPC stream format. Batches own host memory.
    Copy,
}

impl TransferMode {
    pub(crate) fn encoding(self) -> fusion_native::BatchEncoding {
        match self {
            TransferMode::ZeroCopy => fusion_native::BatchEncoding::CData,
            TransferMode::Copy => fusion_native::BatchEncoding::Ipc,
        }
    }
}

/// Engine runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: u32,
    max_blocking_threads: u32,
    transfer_mode: TransferMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            max_blocking_threads: DEFAULT_MAX_BLOCKING_THREADS,
            transfer_mode: TransferMode::default(),
        }
    }
}

impl RuntimeConfig {
    /// The defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine worker threads. Must be non-zero.
    pub fn with_worker_threads(mut self, threads: u32) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Engine blocking thread cap. Must be non-zero.
    pub fn with_max_blocking_threads(mut self, threads: u32) -> Self {
        self.max_blocking_threads = threads;
        self
    }

    /// Schema and batch transfer mode.
    pub fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    /// Engine worker threads.
    pub fn worker_threads(&self) -> u32 {
        self.worker_threads
    }

    /// Engine blocking thread cap.
    pub fn max_blocking_threads(&self) -> u32 {
        self.max_blocking_threads
    }

    /// Schema and batch transfer mode.
    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(FusionError::invalid_argument("worker_threads must be greater than zero"));
        }
        if self.max_blocking_threads == 0 {
            return Err(FusionError::invalid_argument("max_blocking_threads must be greater than zero"));
        }
        Ok(())
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) handle: OwnedHandle,
    pub(crate) registry: Arc<OperationRegistry>,
    config: RuntimeConfig,
}

/// An engine runtime. Cheap to clone; clones share the runtime, which is
/// the one object meant to be used from many tasks at once.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Start a runtime on the linked engine.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_api(config, Arc::new(LinkedNative))
    }

    /// Start a runtime through `api`.
    pub fn with_api(config: RuntimeConfig, api: Arc<dyn NativeApi>) -> Result<Self> {
        config.validate()?;
        let registry = OperationRegistry::new()?;
        let raw = api
            .runtime_new(config.worker_threads, config.max_blocking_threads)
            .map_err(|status| FusionError::rejected("runtime_new", status))?;
        log::info!(
            "Started engine runtime with {} workers ({:?})",
            config.worker_threads,
            config.transfer_mode
        );
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                handle: OwnedHandle::new(HandleKind::Runtime, raw, api),
                registry,
                config,
            }),
        })
    }

    /// Create a session on this runtime.
    pub fn create_session(&self) -> Result<SessionContext> {
        let raw = self
            .inner
            .handle
            .with(|api, runtime| api.context_new(runtime))?
            .map_err(|status| FusionError::rejected("context_new", status))?;
        Ok(SessionContext::new(self.clone(), raw))
    }

    /// Shut the engine down. Work still in flight is cancelled and reported
    /// as failed; every later operation through any child handle fails.
    /// Idempotent.
    pub fn close(&self) -> ErrorCode {
        self.inner.handle.release()
    }

    /// `true` until [`Runtime::close`].
    pub fn is_valid(&self) -> bool {
        self.inner.handle.is_valid()
    }

    /// The settings this runtime was started with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The registry correlating this runtime's operations.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.inner.registry
    }

    pub(crate) fn api(&self) -> &Arc<dyn NativeApi> {
        self.inner.handle.api()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("valid", &self.is_valid())
            .field("config", &self.inner.config)
            .finish()
    }
}
