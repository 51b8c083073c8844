//! The engine's thread pool. DataFusion uses Tokio for asynchronous
//! execution, so every host-visible runtime handle owns a multi-threaded
//! Tokio runtime of its own. Sessions, data frames and streams keep a
//! reference to it and spawn their work onto it.

use crate::abi::{Callback, ErrorCode};
use crate::Completion;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared reference held by every child handle.
pub type RuntimeHandle = Arc<NativeRuntime>;

/// A Tokio runtime plus the "closed" flag that stops new work once the host
/// has asked for shutdown.
pub struct NativeRuntime {
    handle: tokio::runtime::Handle,
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    closed: AtomicBool,
}

impl NativeRuntime {
    fn build(worker_threads: u32, max_blocking_threads: u32) -> std::io::Result<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.thread_name("fusion_native").enable_all();
        if worker_threads > 0 {
            builder.worker_threads(worker_threads as usize);
        }
        if max_blocking_threads > 0 {
            builder.max_blocking_threads(max_blocking_threads as usize);
        }
        let runtime = builder.build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            closed: AtomicBool::new(false),
        })
    }

    /// `true` once [`fusion_runtime_destroy`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Spawn an asynchronous operation. `work` receives the [`Completion`]
    /// for `token` and must consume it; if the task is dropped instead, the
    /// completion reports the failure on its own.
    ///
    /// Returns `NotInitialized` (and never invokes the callback) once the
    /// runtime has been shut down.
    pub(crate) fn spawn_operation<F, Fut>(&self, callback: Callback, token: u64, work: F) -> ErrorCode
    where
        F: FnOnce(Completion) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            log::debug!("Refusing token {token}: runtime is shut down");
            return ErrorCode::NotInitialized;
        }
        let completion = Completion::new(callback, token);
        self.handle.spawn(work(completion));
        ErrorCode::Ok
    }

    fn shutdown(&self) -> ErrorCode {
        self.closed.store(true, Ordering::Release);
        let Ok(mut lock) = self.runtime.lock() else {
            return ErrorCode::LockPoisoned;
        };
        if let Some(runtime) = lock.take() {
            // Outstanding tasks are dropped; their completions report the cancellation.
            runtime.shutdown_background();
        }
        ErrorCode::Ok
    }
}

impl Drop for NativeRuntime {
    fn drop(&mut self) {
        let runtime = match self.runtime.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

/// Creates a new Tokio multi-threaded runtime for DataFusion.
///
/// Parameters:
/// - `worker_threads`: number of worker threads (0 = Tokio default).
/// - `max_blocking_threads`: maximum blocking threads (0 = Tokio default).
/// - `runtime_ptr`: output slot, must point to a null pointer.
///
/// # Safety
/// `runtime_ptr` must be a valid, aligned pointer to writable memory. The
/// caller must call [`fusion_runtime_destroy`] exactly once with the result.
#[no_mangle]
pub unsafe extern "C" fn fusion_runtime_new(
    worker_threads: u32,
    max_blocking_threads: u32,
    runtime_ptr: *mut *mut RuntimeHandle,
) -> ErrorCode {
    if runtime_ptr.is_null() {
        return ErrorCode::NullPointer;
    }
    if !(*runtime_ptr).is_null() {
        return ErrorCode::AlreadyInitialized;
    }

    match NativeRuntime::build(worker_threads, max_blocking_threads) {
        Ok(runtime) => {
            let handle: RuntimeHandle = Arc::new(runtime);
            *runtime_ptr = Box::into_raw(Box::new(handle));
            log::debug!("Created runtime {:p}", *runtime_ptr);
            ErrorCode::Ok
        }
        Err(e) => {
            log::error!("Failed to initialize Tokio runtime: {e}");
            ErrorCode::RuntimeError
        }
    }
}

/// Shuts a runtime down and releases the handle. Work that is still in
/// flight is cancelled (its callbacks fire with `RuntimeError`), and any
/// later dispatch through a child handle fails with `NotInitialized`.
/// A null pointer is accepted and ignored.
///
/// # Safety
/// `runtime_ptr` must have been returned by [`fusion_runtime_new`] and must
/// not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn fusion_runtime_destroy(runtime_ptr: *mut RuntimeHandle) -> ErrorCode {
    if runtime_ptr.is_null() {
        return ErrorCode::Ok;
    }
    log::debug!("Destroying runtime {runtime_ptr:p}");
    let handle = Box::from_raw(runtime_ptr);
    let status = handle.shutdown();
    if Arc::strong_count(&handle) > 1 {
        log::debug!("Runtime {runtime_ptr:p} still referenced by {} child handles", Arc::strong_count(&handle) - 1);
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::test_support::{record_u64, recorded, wait_for, Recorded};

    fn new_runtime() -> *mut RuntimeHandle {
        let mut ptr = std::ptr::null_mut();
        assert_eq!(unsafe { fusion_runtime_new(2, 0, &mut ptr) }, ErrorCode::Ok);
        assert!(!ptr.is_null());
        ptr
    }

    #[test]
    fn occupied_output_slot_is_rejected() {
        let mut ptr = new_runtime();
        assert_eq!(unsafe { fusion_runtime_new(1, 1, &mut ptr) }, ErrorCode::AlreadyInitialized);
        assert_eq!(unsafe { fusion_runtime_destroy(ptr) }, ErrorCode::Ok);
    }

    #[test]
    fn destroying_null_is_a_no_op() {
        assert_eq!(unsafe { fusion_runtime_destroy(std::ptr::null_mut()) }, ErrorCode::Ok);
    }

    #[test]
    fn closed_runtime_refuses_work() {
        let ptr = new_runtime();
        let child = unsafe { Arc::clone(&*ptr) };
        assert_eq!(unsafe { fusion_runtime_destroy(ptr) }, ErrorCode::Ok);

        let status = child.spawn_operation(record_u64, 7001, |completion| async move {
            completion.succeed(&1u64);
        });
        assert_eq!(status, ErrorCode::NotInitialized);
        assert!(recorded(7001).is_empty());
    }

    #[test]
    fn spawned_operation_reports_its_value() {
        let ptr = new_runtime();
        let runtime = unsafe { Arc::clone(&*ptr) };
        let status = runtime.spawn_operation(record_u64, 7002, |completion| async move {
            completion.succeed(&99u64);
        });
        assert_eq!(status, ErrorCode::Ok);

        assert_eq!(wait_for(7002, 1), vec![Recorded::Value(99)]);
        assert_eq!(unsafe { fusion_runtime_destroy(ptr) }, ErrorCode::Ok);
    }

    #[test]
    fn panicking_task_reports_panic() {
        let ptr = new_runtime();
        let runtime = unsafe { Arc::clone(&*ptr) };
        let status = runtime.spawn_operation(record_u64, 7003, |completion| async move {
            let _held = completion;
            panic!("boom");
        });
        assert_eq!(status, ErrorCode::Ok);

        assert_eq!(
            wait_for(7003, 1),
            vec![Recorded::Error(ErrorCode::Panic, "engine task panicked".to_string())]
        );
        assert_eq!(unsafe { fusion_runtime_destroy(ptr) }, ErrorCode::Ok);
    }
}
