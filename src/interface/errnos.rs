// Error number definitions for the rustkern syscall surface.
//
// Every kernel entry point returns an i32 where a negative value is an
// errno sentinel. No failure is fatal to the kernel itself; callers are
// expected to inspect the sign of the return value.

use std::sync::atomic::{AtomicBool, Ordering};

// Turn on to get a debug log line for every syscall failure. Tests flip
// this when chasing a misbehaving scenario.
pub static VERBOSE_ERRORS: AtomicBool = AtomicBool::new(true);

/// Errors the IPC core can surface, with their conventional Linux values.
///
/// The taxonomy is deliberately small: invalid-descriptor, invalid-state,
/// resource-exhaustion, timeout. End-of-stream is not an error; it is a
/// zero-length read.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(i32)]
pub enum Errno {
    /// Bad file descriptor
    EBADF = 9,
    /// Invalid argument, or operation not legal for the object's state
    EINVAL = 22,
    /// Too many open files
    EMFILE = 24,
    /// Broken pipe: the channel has a vacant endpoint
    EPIPE = 32,
    /// Address already in use: the port already has a listener
    EADDRINUSE = 98,
    /// Transport endpoint is not connected (direction was shut down)
    ENOTCONN = 107,
    /// Connection timed out before an accept admitted it
    ETIMEDOUT = 110,
    /// Connection refused: no listener, or the listener closed underneath us
    ECONNREFUSED = 111,
}

/// Build the negative sentinel for a failed syscall, logging the failure.
///
/// `syscall` names the entry point, `message` says what went wrong; both
/// only reach the log, the caller just sees `-(errno as i32)`.
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> i32 {
    if VERBOSE_ERRORS.load(Ordering::Relaxed) {
        log::debug!("Error in syscall: {} - {:?}: {}", syscall, e, message);
    }
    -(e as i32)
}
