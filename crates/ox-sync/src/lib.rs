//! Scoped wrappers around POSIX synchronization primitives
//!
//! Each wrapper owns exactly one native object. Construction initializes it
//! and fails with [`SyncError::Initialization`] if the OS refuses; `Drop`
//! destroys it exactly once. Native objects live on the heap so the wrappers
//! can be moved without invalidating the address the OS knows about.
//!
//! - [`Semaphore`]: counting semaphore (`sem_t`)
//! - [`Mutex`]: non-reentrant lock (`pthread_mutex_t`) exposing its native
//!   handle through [`MutexHandle`]
//! - [`Cond`]: condition variable (`pthread_cond_t`) waiting on a caller-owned
//!   mutex
//!
//! Operation failures are returned as [`SyncError::Operation`]. A timed wait
//! that runs out reports [`WaitOutcome::TimedOut`], which is not an error.

#[cfg(not(unix))]
compile_error!("ox-sync requires a unix target");

pub mod cond;
pub mod mutex;
pub mod semaphore;
mod time;

pub use cond::{Cond, WaitOutcome};
pub use mutex::{Mutex, MutexGuard, MutexHandle};
pub use ox_core::error::{Primitive, Result, SyncError};
pub use semaphore::Semaphore;

/// errno of the last failed libc call on this thread
pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EINVAL)
}

/// Map a pthread return code to a result
#[inline]
pub(crate) fn check(primitive: Primitive, op: &'static str, ret: libc::c_int) -> Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(SyncError::op(primitive, op, ret))
    }
}
