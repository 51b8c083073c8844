//! Types shared across the C ABI. Everything here is `#[repr(C)]` (or a
//! fixed-width `#[repr]` enum) so that it can be mirrored by any host.

use arrow::ffi::{FFI_ArrowArray, FFI_ArrowSchema};
use std::ffi::c_void;
use strum::{Display, FromRepr};

/// Status codes. Returned synchronously by every entry point, and carried
/// inside [`ErrorInfoData`] when an asynchronous operation fails.
///
/// The codes from `InvalidState` upwards are produced by host bindings only
/// and never cross the boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(i32)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// A panic was caught inside the engine (or inside a host decoder).
    Panic = 1,
    /// A lock protecting native state was poisoned.
    LockPoisoned = 2,
    /// The runtime behind the handle has been shut down.
    NotInitialized = 3,
    /// The output slot already holds an initialized handle.
    AlreadyInitialized = 4,
    /// Generic runtime failure (thread pool creation, cancelled task, ...).
    RuntimeError = 5,
    /// A required pointer argument was null.
    NullPointer = 6,
    /// A string argument was not valid UTF-8.
    InvalidUtf8 = 7,
    /// The query engine reported an error.
    DataFusionError = 8,
    /// An argument failed validation (bad option payload, zero limit, ...).
    InvalidArgument = 9,
    /// Host only: the handle has already been released.
    InvalidState = 10,
    /// Host only: a successful payload could not be decoded.
    DecodeError = 11,
    /// Host only: the completion channel closed without delivering a result.
    Abandoned = 12,
}

impl ErrorCode {
    /// Total conversion from the raw wire value. Unknown values are treated
    /// as a generic runtime error rather than trusted.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_repr(raw).unwrap_or(ErrorCode::RuntimeError)
    }

    /// `true` for [`ErrorCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

/// Non-owning `(pointer, length)` view over a contiguous byte range.
///
/// Who owns the memory depends on the call site: engine allocations are
/// only valid for the duration of a callback (unless documented otherwise),
/// host allocations are pinned by the host for the duration of the call.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct BytesData {
    /// First byte, or null for an empty span.
    pub data: *const u8,
    /// Number of bytes.
    pub len: u64,
}

impl BytesData {
    /// The empty span. Absent option payloads are encoded this way.
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null(),
            len: 0,
        }
    }

    /// Borrow a slice. The returned span is only valid while `s` is.
    pub fn new(s: &[u8]) -> Self {
        Self {
            data: s.as_ptr(),
            len: s.len() as u64,
        }
    }

    /// `true` if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.data.is_null() || self.len == 0
    }

    /// View the span as a slice, `None` when empty.
    ///
    /// # Safety
    /// `data` must point to `len` readable bytes that stay valid for `'a`.
    pub unsafe fn as_opt_slice<'a>(&self) -> Option<&'a [u8]> {
        if self.is_empty() {
            None
        } else {
            Some(std::slice::from_raw_parts(self.data, self.len as usize))
        }
    }
}

/// Error payload handed to a [`Callback`] in place of a result.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct ErrorInfoData {
    /// Raw [`ErrorCode`] value.
    pub code: i32,
    /// UTF-8 message, valid for the duration of the callback.
    pub message: BytesData,
}

/// Completion callback. Invoked exactly once per accepted token, from an
/// engine thread, with either a result pointer or an error pointer. Both
/// null is the end-of-stream sentinel for [`crate::fusion_stream_next`].
pub type Callback = unsafe extern "C" fn(result: *const c_void, error: *const ErrorInfoData, token: u64);

/// Result payload of a zero-copy collect. The importer takes ownership of
/// the schema and every array (moving them out and leaving released structs
/// behind) and becomes responsible for calling their release functions.
#[derive(Debug)]
#[repr(C)]
pub struct CollectedRecordBatches {
    /// Schema shared by every batch.
    pub schema: *mut FFI_ArrowSchema,
    /// Number of elements in `batches`.
    pub batch_count: u64,
    /// Contiguous array of struct arrays, one per record batch.
    pub batches: *mut FFI_ArrowArray,
}

/// How schemas and batches cross the boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u32)]
pub enum BatchEncoding {
    /// Arrow IPC streaming format in a [`BytesData`] span. Always copied.
    Ipc = 0,
    /// Arrow C data interface structs. Zero-copy, explicit release.
    CData = 1,
}

/// File formats accepted as table sources and write sinks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u32)]
pub enum FileFormat {
    /// Comma (or otherwise) separated values.
    Csv = 0,
    /// Newline-delimited JSON.
    Json = 1,
    /// Apache Parquet.
    Parquet = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_map_to_runtime_error() {
        assert_eq!(ErrorCode::from_raw(8), ErrorCode::DataFusionError);
        assert_eq!(ErrorCode::from_raw(-7), ErrorCode::RuntimeError);
        assert_eq!(ErrorCode::from_raw(999), ErrorCode::RuntimeError);
    }

    #[test]
    fn empty_span_has_no_slice() {
        let empty = BytesData::empty();
        assert!(empty.is_empty());
        assert!(unsafe { empty.as_opt_slice() }.is_none());

        let bytes = [1u8, 2, 3];
        let span = BytesData::new(&bytes);
        assert_eq!(unsafe { span.as_opt_slice() }, Some(&bytes[..]));
    }
}
