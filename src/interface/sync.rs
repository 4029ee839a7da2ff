// Concurrency and timing primitives for the rustkern interface.
//
// The kernel core runs as a monitor: one mutex per kernel instance guards
// all kernel state, and every blocking operation waits on a condition
// variable tied to that mutex. Everything the core needs from the
// primitive layer is re-exported or wrapped here.

pub use parking_lot::{Condvar, Mutex, MutexGuard};

pub use std::collections::HashMap as RustHashMap;
pub use std::collections::VecDeque as RustDeque;
pub use std::sync::Arc as RustRfc;
pub use std::time::Duration as RustDuration;
pub use std::time::Instant as RustInstant;

use std::thread;

// Spawn a detachable helper thread, used by tests and demo drivers to model
// a second execution context entering the kernel
pub fn helper_thread<F, T>(func: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    thread::spawn(func)
}

// Sleep function to sleep for the specified duration
pub fn sleep(dur: RustDuration) {
    thread::sleep(dur);
}
