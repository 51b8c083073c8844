//! Delivery of results to host callbacks.
//!
//! Every accepted token must see exactly one callback. [`Completion`] owns
//! that obligation: it is moved into the spawned task, consumed by the
//! success/failure path, and if it is dropped unconsumed (the task panicked,
//! or the runtime shut down and dropped the task) it reports the failure
//! itself.

use crate::abi::{BytesData, Callback, ErrorCode, ErrorInfoData};
use std::ffi::c_void;

/// An error on its way to the host.
#[derive(Debug, Clone)]
pub(crate) struct ErrorInfo {
    code: ErrorCode,
    message: String,
}

impl ErrorInfo {
    pub(crate) fn new<E: std::fmt::Display>(code: ErrorCode, error: E) -> Self {
        Self {
            code,
            message: error.to_string(),
        }
    }

    pub(crate) fn engine<E: std::fmt::Display>(error: E) -> Self {
        Self::new(ErrorCode::DataFusionError, error)
    }

    /// Option payloads that decoded but could not be applied.
    pub(crate) fn invalid_argument(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InvalidArgument, format!("{error:#}"))
    }

    pub(crate) fn code(&self) -> ErrorCode {
        self.code
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

/// Signal the end of a stream: both pointers null.
fn report_end_of_stream(callback: Callback, token: u64) {
    log::debug!("Reporting end of stream for token {token}");
    unsafe { callback(std::ptr::null(), std::ptr::null(), token) };
}

fn report_value<T>(value: &T, callback: Callback, token: u64) {
    let value_ptr = (value as *const T).cast::<c_void>();
    unsafe { callback(value_ptr, std::ptr::null(), token) };
}

fn report_error(error: &ErrorInfo, callback: Callback, token: u64) {
    log::debug!("Reporting {} for token {token}: {}", error.code(), error.message());
    let info = ErrorInfoData {
        code: error.code() as i32,
        message: BytesData::new(error.message().as_bytes()),
    };
    unsafe { callback(std::ptr::null(), &info as *const ErrorInfoData, token) };
}

/// The one-shot obligation to invoke `callback` for `token`.
pub(crate) struct Completion {
    callback: Callback,
    token: u64,
    fired: bool,
}

impl Completion {
    pub(crate) fn new(callback: Callback, token: u64) -> Self {
        Self {
            callback,
            token,
            fired: false,
        }
    }

    /// Report a value. Borrowing keeps whatever the value points into alive
    /// until the host callback has returned.
    pub(crate) fn succeed<T>(mut self, value: &T) {
        self.fired = true;
        report_value(value, self.callback, self.token);
    }

    /// Report a value the host may move out of (C data interface structs).
    pub(crate) fn succeed_mut<T>(mut self, value: &mut T) {
        self.fired = true;
        let value_ptr = (value as *mut T).cast::<c_void>().cast_const();
        unsafe { (self.callback)(value_ptr, std::ptr::null(), self.token) };
    }

    pub(crate) fn fail(mut self, error: ErrorInfo) {
        self.fired = true;
        report_error(&error, self.callback, self.token);
    }

    pub(crate) fn finish<T>(self, result: Result<T, ErrorInfo>) {
        match result {
            Ok(value) => self.succeed(&value),
            Err(error) => self.fail(error),
        }
    }

    pub(crate) fn end_of_stream(mut self) {
        self.fired = true;
        report_end_of_stream(self.callback, self.token);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        let error = if std::thread::panicking() {
            ErrorInfo::new(ErrorCode::Panic, "engine task panicked")
        } else {
            ErrorInfo::new(ErrorCode::RuntimeError, "operation was cancelled before it completed")
        };
        log::warn!("Token {} completed by drop guard: {}", self.token, error.message());
        report_error(&error, self.callback, self.token);
    }
}
