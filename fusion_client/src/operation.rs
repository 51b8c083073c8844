//! The one request/response shape every asynchronous operation follows:
//! register a token, make the native call, and either abort on a
//! synchronous rejection or hand back a future for the callback.

use crate::error::{ErrorCode, FusionError, Result};
use crate::registry::{OperationContext, OperationRegistry, PendingOperation};
use std::sync::Arc;

/// Dispatch one operation.
///
/// `call` receives the token and must return the native entry point's
/// synchronous status. On any status but `Ok` the registry entry is removed
/// and the error returned at once; nothing is ever awaited for it.
pub(crate) fn dispatch<T, F>(
    registry: &Arc<OperationRegistry>,
    operation: &str,
    context: Option<OperationContext>,
    call: F,
) -> Result<PendingOperation<T>>
where
    T: Send + 'static,
    F: FnOnce(u64) -> Result<ErrorCode>,
{
    let (token, pending) = registry.register::<T>(context);
    log::debug!("Dispatching {operation} as token {token:#x}");
    let status = match call(token) {
        Ok(status) => status,
        Err(error) => {
            registry.abort(token);
            return Err(error);
        }
    };
    if !status.is_ok() {
        registry.abort(token);
        log::debug!("{operation} rejected synchronously: {status}");
        return Err(FusionError::rejected(operation, status));
    }
    Ok(pending)
}

/// [`dispatch`] then await the callback.
pub(crate) async fn execute<T, F>(
    registry: &Arc<OperationRegistry>,
    operation: &str,
    context: Option<OperationContext>,
    call: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(u64) -> Result<ErrorCode>,
{
    dispatch(registry, operation, context, call)?.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders;

    #[tokio::test]
    async fn rejected_dispatch_leaves_nothing_registered() {
        let registry = OperationRegistry::new().unwrap();
        let error = execute::<u64, _>(&registry, "count", None, |_| Ok(ErrorCode::NotInitialized))
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotInitialized);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn handle_errors_before_the_call_abort_too() {
        let registry = OperationRegistry::new().unwrap();
        let result = dispatch::<u64, _>(&registry, "count", None, |_| {
            Err(FusionError::invalid_state("DataFrame is closed"))
        });
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::InvalidState));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn accepted_dispatch_resolves_through_the_callback() {
        let registry = OperationRegistry::new().unwrap();
        let value = execute::<u64, _>(&registry, "count", None, |token| {
            std::thread::spawn(move || {
                let rows = 3u64;
                unsafe { decoders::complete_u64((&rows as *const u64).cast(), std::ptr::null(), token) };
            });
            Ok(ErrorCode::Ok)
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert!(registry.is_empty());
    }
}
