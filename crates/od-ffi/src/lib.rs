mod context;
mod error;
mod streaming;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::Path;

use od_model::SessionOptions;
use od_runtime::{Runtime, RuntimeError, RuntimeOptions};

/// Execute a closure that returns an `ODStatus`, catching any panics
/// and converting them into `ODStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> ODStatus>(f: F) -> ODStatus {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic");
            ODStatus::ErrorInternal
        }
    }
}

/// Borrow a NUL-terminated UTF-8 argument.
unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, ODStatus> {
    CStr::from_ptr(ptr).to_str().map_err(|e| {
        set_last_error(format!("invalid {}: {}", what, e));
        ODStatus::ErrorInvalidArgument
    })
}

fn generate_status(e: RuntimeError) -> ODStatus {
    set_last_error(e.to_string());
    ODStatus::ErrorGenerate
}

/// Create a new context over the engine compiled into this library.
///
/// On success, writes a heap-allocated `ODContext` pointer into `*ctx_out`.
/// The caller must later call `od_context_destroy` to free it.
#[no_mangle]
pub extern "C" fn od_context_create(ctx_out: *mut *mut ODContext) -> ODStatus {
    catch_panic(|| {
        if ctx_out.is_null() {
            set_last_error("ctx_out is null");
            return ODStatus::ErrorInvalidArgument;
        }
        let ctx = Box::new(ODContext::new());
        unsafe {
            *ctx_out = Box::into_raw(ctx);
        }
        ODStatus::Ok
    })
}

/// Destroy a context previously created by `od_context_create`.
///
/// Passing a null pointer is a no-op and returns `ODStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn od_context_destroy(ctx: *mut ODContext) -> ODStatus {
    if ctx.is_null() {
        return ODStatus::Ok;
    }
    drop(Box::from_raw(ctx));
    ODStatus::Ok
}

/// Load the checkpoint directory `model_dir` into the context.
///
/// `intra_threads` of 0 uses half of the available cores. A previously
/// loaded model is replaced only when loading succeeds.
#[no_mangle]
pub unsafe extern "C" fn od_runtime_load(
    ctx: *mut ODContext,
    model_dir: *const c_char,
    intra_threads: u32,
) -> ODStatus {
    catch_panic(|| {
        if ctx.is_null() || model_dir.is_null() {
            set_last_error("null argument");
            return ODStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *ctx };
        let dir = match unsafe { str_arg(model_dir, "model directory") } {
            Ok(s) => s,
            Err(status) => return status,
        };

        let threads = match intra_threads {
            0 => od_model::default_intra_threads(),
            n => n as usize,
        };
        let options = RuntimeOptions {
            session: SessionOptions {
                intra_threads: Some(threads),
                ..SessionOptions::default()
            },
            capabilities: ctx.capabilities,
            ..RuntimeOptions::default()
        };

        match Runtime::from_dir(Path::new(dir), ctx.engine.as_ref(), &options) {
            Ok(runtime) => {
                ctx.runtime = Some(runtime);
                ODStatus::Ok
            }
            Err(e) => {
                set_last_error(format!("failed to load model: {}", e));
                ODStatus::ErrorModelLoad
            }
        }
    })
}

/// Default generation parameters.
#[no_mangle]
pub extern "C" fn od_generate_params_default() -> ODGenerateParams {
    ODGenerateParams::default()
}

/// Generate a continuation of `prompt`.
///
/// On success, writes the decoded full text (prompt included) into `*output`.
/// The caller must later call `od_free_string` to free it.
#[no_mangle]
pub unsafe extern "C" fn od_generate(
    ctx: *mut ODContext,
    prompt: *const c_char,
    params: ODGenerateParams,
    output: *mut *mut c_char,
) -> ODStatus {
    catch_panic(|| {
        if ctx.is_null() || prompt.is_null() || output.is_null() {
            set_last_error("null argument");
            return ODStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &*ctx };
        let prompt = match unsafe { str_arg(prompt, "prompt") } {
            Ok(s) => s,
            Err(status) => return status,
        };
        let Some(runtime) = ctx.runtime.as_ref() else {
            set_last_error("model not loaded");
            return ODStatus::ErrorNotLoaded;
        };
        let params = match params.to_params() {
            Ok(p) => p,
            Err(status) => return status,
        };

        let result = match runtime.generate_with(prompt, &params) {
            Ok(r) => r,
            Err(e) => return generate_status(e),
        };
        match CString::new(result.text) {
            Ok(c) => {
                unsafe { *output = c.into_raw() };
                ODStatus::Ok
            }
            Err(e) => {
                set_last_error(format!("output encoding error: {}", e));
                ODStatus::ErrorGenerate
            }
        }
    })
}

/// Generate a continuation of `prompt`, reporting each token to `callback`.
///
/// The callback observes tokens as they are produced; it cannot stop
/// generation early. A token holding only part of a multi-byte character is
/// reported with an empty fragment. A `stop_token_id` of 2^32 or more returns
/// `ErrorInvalidArgument`.
#[no_mangle]
pub unsafe extern "C" fn od_generate_streaming(
    ctx: *mut ODContext,
    prompt: *const c_char,
    params: ODGenerateParams,
    callback: ODStreamCallback,
    user_data: *mut c_void,
) -> ODStatus {
    catch_panic(|| {
        if ctx.is_null() || prompt.is_null() {
            set_last_error("null argument");
            return ODStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &*ctx };
        let prompt = match unsafe { str_arg(prompt, "prompt") } {
            Ok(s) => s,
            Err(status) => return status,
        };
        let Some(runtime) = ctx.runtime.as_ref() else {
            set_last_error("model not loaded");
            return ODStatus::ErrorNotLoaded;
        };
        let params = match params.to_params() {
            Ok(p) => p,
            Err(status) => return status,
        };

        let streamed = runtime.generate_streaming(prompt, &params, |id, fragment| {
            streaming::invoke_callback(callback, user_data, id, fragment)
        });
        match streamed {
            Ok(_) => ODStatus::Ok,
            Err(e) => generate_status(e),
        }
    })
}

/// Retrieve the last error message on this thread.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `od_free_string`.
#[no_mangle]
pub extern "C" fn od_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by `od_generate` or `od_last_error`.
#[no_mangle]
pub unsafe extern "C" fn od_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
