#![allow(unused)]

use anyhow::{Result, anyhow};
use std::ffi::CStr;

const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Name of the calling thread as the kernel sees it.
///
/// Reads through `pthread_getname_np`, the counterpart of the
/// `pthread_setname_np` call that `std::thread::Builder::name` performs,
/// so tests observe the name that actually stuck rather than the one
/// that was requested.
#[cfg(target_os = "linux")]
pub(crate) fn current_thread_name() -> Result<String> {
    // Zero-initialized, so the buffer is guaranteed to stay
    // null-terminated.
    let mut c_name_buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];

    let ret = unsafe {
        let thread = libc::pthread_self();
        libc::pthread_getname_np(thread, c_name_buf.as_mut_ptr(), MAX_PTHREAD_NAME_LEN)
    };

    if ret != 0 {
        return Err(anyhow!("pthread_getname_np failed with error code: {ret}"));
    }

    let c_str = unsafe { CStr::from_ptr(c_name_buf.as_ptr()) };
    c_str
        .to_str()
        .map(|s| s.to_string())
        .map_err(|e| anyhow!("thread name is not valid UTF-8: {e}"))
}
