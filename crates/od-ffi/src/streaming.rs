use std::ffi::CString;

use crate::types::ODStreamCallback;

/// Pass one generated token to the callback, if any.
///
/// Fragments that cannot be represented as a C string (interior NUL) are
/// delivered with the NUL bytes removed.
pub fn invoke_callback(
    callback: ODStreamCallback,
    user_data: *mut std::os::raw::c_void,
    token_id: u32,
    fragment: &str,
) {
    if let Some(cb) = callback {
        let text = CString::new(fragment)
            .or_else(|_| CString::new(fragment.replace('\0', "")))
            .unwrap_or_default();
        cb(token_id, text.as_ptr(), user_data);
    }
}
