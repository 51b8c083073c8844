//! Read-only views over engine-owned memory.
//!
//! Engine buffers are only valid for the duration of a callback. The views
//! here let decoders pull bytes straight out of them instead of copying the
//! whole payload into a `Vec` first.

use fusion_native::BytesData;
use std::io::Read;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// A bounded, forward-only reader over a native span.
pub struct NativeBufferView<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> NativeBufferView<'a> {
    /// View `len` bytes at `data`. A null pointer is an empty view.
    ///
    /// # Safety
    /// `data` must point to `len` readable bytes that stay valid and
    /// unmodified for `'a`.
    pub unsafe fn new(data: *const u8, len: usize) -> Self {
        let bytes = if data.is_null() || len == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(data, len)
        };
        Self { bytes, position: 0 }
    }

    /// View a [`BytesData`] span.
    ///
    /// # Safety
    /// Same as [`NativeBufferView::new`].
    pub unsafe fn from_span(span: &BytesData) -> Self {
        Self::new(span.data, span.len as usize)
    }

    /// Total length of the view.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Copy the unread remainder into host memory.
    pub fn read_to_vec(&mut self) -> Vec<u8> {
        let rest = self.bytes[self.position..].to_vec();
        self.position = self.bytes.len();
        rest
    }
}

impl Read for NativeBufferView<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rest = &self.bytes[self.position..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.position += n;
        Ok(n)
    }
}

struct CursorState {
    data: *const u8,
    len: usize,
    local: usize,
    base: u64,
}

// The pointer is only dereferenced under the mutex, while the span it was
// bound to is valid.
unsafe impl Send for CursorState {}

impl CursorState {
    fn retire(&mut self) {
        self.base += self.local as u64;
        self.local = 0;
        self.data = std::ptr::null();
        self.len = 0;
    }
}

/// A reader over a *sequence* of native spans that presents them as one
/// continuous stream. Each span is bound with [`NativeMemoryCursor::rebind`]
/// and the cumulative position carries over.
///
/// Clones share state, so a decoder can keep one clone inside a format
/// reader while rebinding through another.
#[derive(Clone)]
pub struct NativeMemoryCursor {
    state: Arc<Mutex<CursorState>>,
    _not_sync_data: PhantomData<*const u8>,
}

// Access to the raw pointer is serialized by the mutex.
unsafe impl Send for NativeMemoryCursor {}
unsafe impl Sync for NativeMemoryCursor {}

impl Default for NativeMemoryCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeMemoryCursor {
    /// An unbound cursor at position 0. Reads return EOF until bound.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CursorState {
                data: std::ptr::null(),
                len: 0,
                local: 0,
                base: 0,
            })),
            _not_sync_data: PhantomData,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to a new span. Bytes left unread in the previous span are
    /// skipped.
    ///
    /// # Safety
    /// `data` must point to `len` readable bytes that stay valid until the
    /// next `rebind` or [`NativeMemoryCursor::unbind`].
    pub unsafe fn rebind(&self, data: *const u8, len: usize) {
        let mut state = self.lock();
        state.retire();
        state.data = data;
        state.len = if data.is_null() { 0 } else { len };
    }

    /// Forget the current span (it is about to become invalid).
    pub fn unbind(&self) {
        self.lock().retire();
    }

    /// Cumulative position across every span bound so far.
    pub fn position(&self) -> u64 {
        let state = self.lock();
        state.base + state.local as u64
    }
}

impl Read for NativeMemoryCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.lock();
        let available = state.len - state.local;
        let n = available.min(buf.len());
        if n > 0 {
            let src = unsafe { std::slice::from_raw_parts(state.data.add(state.local), n) };
            buf[..n].copy_from_slice(src);
            state.local += n;
        }
        Ok(n)
    }
}
