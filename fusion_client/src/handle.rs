//! Exactly-once ownership of native handles.

use crate::error::{ErrorCode, FusionError, Result};
use crate::native::{NativeApi, RawHandle};
use std::sync::{Arc, PoisonError, RwLock};
use strum::Display;

/// The four kinds of engine object a host can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HandleKind {
    /// An engine thread pool.
    Runtime,
    /// A session context with its table catalog.
    Session,
    /// A planned query.
    DataFrame,
    /// An executing query.
    Stream,
}

impl HandleKind {
    /// Destroy `raw` through `api`.
    ///
    /// # Safety
    /// `raw` must be a live handle of this kind and never used again.
    unsafe fn destroy(self, api: &dyn NativeApi, raw: RawHandle) -> ErrorCode {
        match self {
            HandleKind::Runtime => api.runtime_destroy(raw),
            HandleKind::Session => api.context_destroy(raw),
            HandleKind::DataFrame => api.dataframe_destroy(raw),
            HandleKind::Stream => api.stream_destroy(raw),
        }
    }
}

/// Owns one native handle. The handle is destroyed once: by
/// [`OwnedHandle::release`] or, failing that, on drop.
///
/// Calls made through [`OwnedHandle::with`] hold a read lock for the
/// duration of the synchronous native call, so a concurrent release waits
/// for them instead of destroying the handle underneath.
pub(crate) struct OwnedHandle {
    kind: HandleKind,
    raw: RwLock<Option<RawHandle>>,
    api: Arc<dyn NativeApi>,
}

impl OwnedHandle {
    /// Take ownership of `raw`.
    pub(crate) fn new(kind: HandleKind, raw: RawHandle, api: Arc<dyn NativeApi>) -> Self {
        log::debug!("Acquired {kind} handle {:p}", raw.as_ptr());
        Self {
            kind,
            raw: RwLock::new(Some(raw)),
            api,
        }
    }

    pub(crate) fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.raw.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Run `f` with the live handle, or fail with `InvalidState` once released.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&dyn NativeApi, RawHandle) -> R) -> Result<R> {
        let guard = self.raw.read().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(raw) => Ok(f(self.api.as_ref(), raw)),
            None => Err(FusionError::invalid_state(format!("{} is closed", self.kind))),
        }
    }

    /// Destroy the native object. Later calls are no-ops returning `Ok`.
    /// A failed destroy is logged and returned but not retried.
    pub(crate) fn release(&self) -> ErrorCode {
        let taken = self.raw.write().unwrap_or_else(PoisonError::into_inner).take();
        let Some(raw) = taken else {
            return ErrorCode::Ok;
        };
        let status = unsafe { self.kind.destroy(self.api.as_ref(), raw) };
        if status.is_ok() {
            log::debug!("Released {} handle {:p}", self.kind, raw.as_ptr());
        } else {
            log::warn!("Destroying {} handle {:p} failed: {status}", self.kind, raw.as_ptr());
        }
        status
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Destroys a handle that arrived after its caller stopped waiting.
pub(crate) struct HandleReclaim {
    kind: HandleKind,
    api: Arc<dyn NativeApi>,
}

impl HandleReclaim {
    pub(crate) fn new(kind: HandleKind, api: Arc<dyn NativeApi>) -> Self {
        Self { kind, api }
    }

    /// # Safety
    /// `raw` must be a live handle of this kind that nothing else owns.
    pub(crate) unsafe fn reclaim(&self, raw: RawHandle) {
        log::debug!("Reclaiming orphaned {} handle {:p}", self.kind, raw.as_ptr());
        drop(OwnedHandle::new(self.kind, raw, Arc::clone(&self.api)));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A [`NativeApi`] that hands out fake handles and counts destroys.

    use super::*;
    use fusion_native::{BatchEncoding, Callback, FileFormat};
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingApi {
        pub(crate) destroyed: AtomicUsize,
    }

    impl CountingApi {
        pub(crate) fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }

        pub(crate) fn fake_handle() -> RawHandle {
            unsafe { RawHandle::from_ptr(Box::into_raw(Box::new(0u64)).cast()) }.unwrap()
        }

        unsafe fn free(&self, raw: RawHandle) -> ErrorCode {
            drop(Box::from_raw(raw.as_ptr().cast::<u64>()));
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            ErrorCode::Ok
        }
    }

    impl NativeApi for CountingApi {
        fn runtime_new(&self, _: u32, _: u32) -> std::result::Result<RawHandle, ErrorCode> {
            Ok(Self::fake_handle())
        }
        unsafe fn runtime_destroy(&self, raw: RawHandle) -> ErrorCode {
            self.free(raw)
        }
        fn context_new(&self, _: RawHandle) -> std::result::Result<RawHandle, ErrorCode> {
            Ok(Self::fake_handle())
        }
        unsafe fn context_destroy(&self, raw: RawHandle) -> ErrorCode {
            self.free(raw)
        }
        fn context_register(
            &self,
            _: RawHandle,
            _: FileFormat,
            _: &CStr,
            _: &CStr,
            _: &[u8],
            _: Callback,
            _: u64,
        ) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn context_sql(&self, _: RawHandle, _: &CStr, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        unsafe fn dataframe_destroy(&self, raw: RawHandle) -> ErrorCode {
            self.free(raw)
        }
        fn dataframe_count(&self, _: RawHandle, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_show(&self, _: RawHandle, _: u64, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_to_string(&self, _: RawHandle, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_schema(&self, _: RawHandle, _: BatchEncoding, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_collect(&self, _: RawHandle, _: BatchEncoding, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_write(
            &self,
            _: RawHandle,
            _: FileFormat,
            _: &CStr,
            _: &[u8],
            _: Callback,
            _: u64,
        ) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn dataframe_execute_stream(&self, _: RawHandle, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        fn stream_next(&self, _: RawHandle, _: BatchEncoding, _: Callback, _: u64) -> ErrorCode {
            ErrorCode::RuntimeError
        }
        unsafe fn stream_destroy(&self, raw: RawHandle) -> ErrorCode {
            self.free(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingApi;
    use super::*;

    #[test]
    fn release_is_idempotent_and_invalidates() {
        let api = Arc::new(CountingApi::default());
        let handle = OwnedHandle::new(HandleKind::DataFrame, CountingApi::fake_handle(), api.clone());
        assert!(handle.is_valid());
        assert_eq!(handle.release(), ErrorCode::Ok);
        assert_eq!(handle.release(), ErrorCode::Ok);
        assert!(!handle.is_valid());
        let error = handle.with(|_, _| ()).unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidState);
        assert_eq!(error.message(), "DataFrame is closed");
        drop(handle);
        assert_eq!(api.destroyed(), 1);
    }

    #[test]
    fn drop_releases_once() {
        let api = Arc::new(CountingApi::default());
        drop(OwnedHandle::new(HandleKind::Stream, CountingApi::fake_handle(), api.clone()));
        assert_eq!(api.destroyed(), 1);

        let reclaim = HandleReclaim::new(HandleKind::Session, api.clone());
        unsafe { reclaim.reclaim(CountingApi::fake_handle()) };
        assert_eq!(api.destroyed(), 2);
    }
}
