//! Argument marshalling helpers. These patterns are repeated in every
//! FFI entry point, so they've been abstracted into macros. Each one
//! returns the matching [`crate::ErrorCode`] from the *calling* function
//! when the argument is unusable.

/// Borrow a handle pointer, bailing out with `NullPointer` if it is null.
macro_rules! ffi_ref {
    ($ptr:expr) => {{
        let ptr = $ptr;
        if ptr.is_null() {
            return $crate::ErrorCode::NullPointer;
        }
        unsafe { &*ptr }
    }};
}

/// Copy a C string into an owned `String`, bailing out with `NullPointer`
/// or `InvalidUtf8` as appropriate.
macro_rules! ffi_cstr_to_string {
    ($ptr:expr) => {{
        let ptr = $ptr;
        if ptr.is_null() {
            return $crate::ErrorCode::NullPointer;
        }
        let Ok(s) = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_str().map(|s| s.to_string()) else {
            return $crate::ErrorCode::InvalidUtf8;
        };
        s
    }};
}

/// Copy an option payload out of a host span and decode it. An empty span
/// means "use the defaults".
macro_rules! ffi_options {
    ($bytes:expr, $message:ty) => {{
        match unsafe { $bytes.as_opt_slice() } {
            None => <$message>::default(),
            Some(slice) => match <$message as prost::Message>::decode(slice) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Rejecting undecodable {}: {e}", stringify!($message));
                    return $crate::ErrorCode::InvalidArgument;
                }
            },
        }
    }};
}
