//! Counting semaphore
//!
//! Thin owner of an unnamed, thread-shared POSIX semaphore. The count is not
//! observable; only `wait`, `try_wait` and `post` touch it.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem;

use ox_core::{sync_debug, sync_trace};

use crate::{last_errno, Primitive, Result, SyncError};

/// Counting semaphore backed by `sem_t`
pub struct Semaphore {
    inner: Box<UnsafeCell<libc::sem_t>>,
}

// SAFETY: sem_wait/sem_trywait/sem_post are thread-safe on a shared sem_t,
// and the boxed object never moves while the wrapper is alive.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Create a semaphore with a count of zero
    pub fn new() -> Result<Self> {
        Self::with_count(0)
    }

    /// Create a semaphore with the given initial count
    ///
    /// Fails if the count exceeds `SEM_VALUE_MAX` or the platform does not
    /// support unnamed semaphores.
    pub fn with_count(count: u32) -> Result<Self> {
        // SAFETY: sem_t is plain data; sem_init overwrites it below.
        let inner = Box::new(UnsafeCell::new(unsafe { mem::zeroed::<libc::sem_t>() }));

        // pshared = 0: shared between threads of this process only.
        // SAFETY: the pointer is valid and not yet initialized.
        if unsafe { libc::sem_init(inner.get(), 0, count as libc::c_uint) } != 0 {
            return Err(SyncError::init(Primitive::Semaphore, last_errno()));
        }

        sync_trace!("semaphore created with count {}", count);
        Ok(Self { inner })
    }

    #[inline]
    fn raw(&self) -> *mut libc::sem_t {
        self.inner.get()
    }

    /// Block until the count is positive, then decrement it.
    ///
    /// A wait interrupted by a signal handler (`EINTR`) is restarted, so the
    /// only way out is a successful decrement or a genuine OS failure.
    pub fn wait(&self) -> Result<()> {
        loop {
            // SAFETY: initialized in the constructor, destroyed only in drop.
            if unsafe { libc::sem_wait(self.raw()) } == 0 {
                return Ok(());
            }
            match last_errno() {
                libc::EINTR => continue,
                code => return Err(SyncError::op(Primitive::Semaphore, "wait", code)),
            }
        }
    }

    /// Decrement the count if it is positive without blocking.
    ///
    /// Returns `Ok(false)` when the count is zero.
    pub fn try_wait(&self) -> Result<bool> {
        loop {
            // SAFETY: see `wait`.
            if unsafe { libc::sem_trywait(self.raw()) } == 0 {
                return Ok(true);
            }
            match last_errno() {
                libc::EAGAIN => return Ok(false),
                libc::EINTR => continue,
                code => return Err(SyncError::op(Primitive::Semaphore, "try_wait", code)),
            }
        }
    }

    /// Increment the count, waking one blocked waiter if there is any
    pub fn post(&self) -> Result<()> {
        // SAFETY: see `wait`.
        if unsafe { libc::sem_post(self.raw()) } == 0 {
            Ok(())
        } else {
            Err(SyncError::op(Primitive::Semaphore, "post", last_errno()))
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: exclusive access; no thread can still be waiting.
        if unsafe { libc::sem_destroy(self.raw()) } != 0 {
            sync_debug!("sem_destroy failed: errno {}", last_errno());
        } else {
            sync_trace!("semaphore destroyed");
        }
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").finish_non_exhaustive()
    }
}
