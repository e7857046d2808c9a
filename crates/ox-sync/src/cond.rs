//! Condition variable
//!
//! [`Cond`] owns a `pthread_cond_t` but no mutex. Every wait takes the
//! native handle of a caller-owned [`Mutex`](crate::Mutex), which must be
//! locked by the waiting thread; the OS releases it and suspends the thread
//! atomically, then reacquires it before the wait returns, on wakeup and on
//! timeout alike.
//!
//! Wakeups may be spurious. Callers re-check their predicate in a loop:
//!
//! ```no_run
//! use ox_sync::{Cond, Mutex};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! # fn main() -> ox_sync::Result<()> {
//! let mutex = Mutex::new()?;
//! let cond = Cond::new()?;
//! let ready = AtomicBool::new(false);
//!
//! let mut guard = mutex.guard()?;
//! while !ready.load(Ordering::Relaxed) {
//!     cond.wait_guard(&mut guard)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::{Duration, SystemTime};

use ox_core::{sync_debug, sync_trace};

use crate::mutex::{MutexGuard, MutexHandle};
use crate::time::{deadline_after, deadline_to_timespec};
use crate::{check, Primitive, Result, SyncError};

/// How a timed wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by `signal`, `broadcast` or spuriously
    Signaled,
    /// The deadline passed first
    TimedOut,
}

impl WaitOutcome {
    /// Check if the wait ran out
    #[inline]
    pub fn timed_out(&self) -> bool {
        *self == Self::TimedOut
    }
}

/// Condition variable backed by `pthread_cond_t`
///
/// Bound to the first mutex it is waited on with; a wait with any other
/// mutex fails with `EINVAL` instead of reaching the OS.
pub struct Cond {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
    /// Mutex paired by the first wait, null until then
    mutex: AtomicPtr<libc::pthread_mutex_t>,
}

// SAFETY: pthread condition variable operations are thread-safe on a shared
// object and the boxed object never moves while the wrapper is alive.
unsafe impl Send for Cond {}
unsafe impl Sync for Cond {}

impl Cond {
    /// Create a condition variable using the realtime clock for deadlines
    pub fn new() -> Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));

        // SAFETY: the pointer is valid and not yet in use; null attributes.
        let ret = unsafe { libc::pthread_cond_init(inner.get(), ptr::null()) };
        if ret != 0 {
            return Err(SyncError::init(Primitive::Cond, ret));
        }

        sync_trace!("condition variable created");
        Ok(Self {
            inner,
            mutex: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Pair with `mutex` on first use, reject any other mutex afterwards
    fn verify(&self, mutex: MutexHandle<'_>, op: &'static str) -> Result<()> {
        let raw = mutex.as_ptr();
        match self
            .mutex
            .compare_exchange(ptr::null_mut(), raw, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            Err(paired) if paired == raw => Ok(()),
            Err(_) => Err(SyncError::op(Primitive::Cond, op, libc::EINVAL)),
        }
    }

    /// Release `mutex`, sleep until woken, then reacquire `mutex`.
    ///
    /// # Safety
    ///
    /// The calling thread must hold `mutex`. Waiting with a mutex other than
    /// the one this condition variable was first paired with returns an
    /// `EINVAL` error.
    pub unsafe fn wait(&self, mutex: MutexHandle<'_>) -> Result<()> {
        self.verify(mutex, "wait")?;
        check(
            Primitive::Cond,
            "wait",
            libc::pthread_cond_wait(self.inner.get(), mutex.as_ptr()),
        )
    }

    /// Like [`wait`](Self::wait), but gives up at the absolute `deadline`.
    ///
    /// The mutex is held again when this returns, whatever the outcome. A
    /// deadline that has already passed returns [`WaitOutcome::TimedOut`]
    /// without sleeping.
    ///
    /// # Safety
    ///
    /// Same contract as [`wait`](Self::wait).
    pub unsafe fn timed_wait(
        &self,
        mutex: MutexHandle<'_>,
        deadline: SystemTime,
    ) -> Result<WaitOutcome> {
        self.timed_wait_ts(mutex, &deadline_to_timespec(deadline))
    }

    unsafe fn timed_wait_ts(
        &self,
        mutex: MutexHandle<'_>,
        deadline: &libc::timespec,
    ) -> Result<WaitOutcome> {
        self.verify(mutex, "timed_wait")?;
        match libc::pthread_cond_timedwait(self.inner.get(), mutex.as_ptr(), deadline) {
            0 => Ok(WaitOutcome::Signaled),
            libc::ETIMEDOUT => Ok(WaitOutcome::TimedOut),
            code => Err(SyncError::op(Primitive::Cond, "timed_wait", code)),
        }
    }

    /// [`wait`](Self::wait) on the mutex held by `guard`
    pub fn wait_guard(&self, guard: &mut MutexGuard<'_>) -> Result<()> {
        // SAFETY: the guard proves this thread holds the mutex.
        unsafe { self.wait(guard.handle()) }
    }

    /// [`timed_wait`](Self::timed_wait) on the mutex held by `guard`
    pub fn timed_wait_guard(
        &self,
        guard: &mut MutexGuard<'_>,
        deadline: SystemTime,
    ) -> Result<WaitOutcome> {
        // SAFETY: the guard proves this thread holds the mutex.
        unsafe { self.timed_wait(guard.handle(), deadline) }
    }

    /// Timed wait on the mutex held by `guard`, at most `timeout` from now
    pub fn wait_timeout(
        &self,
        guard: &mut MutexGuard<'_>,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        // SAFETY: the guard proves this thread holds the mutex.
        unsafe { self.timed_wait_ts(guard.handle(), &deadline_after(timeout)) }
    }

    /// Wake at most one waiter. Not remembered if nobody is waiting.
    pub fn signal(&self) -> Result<()> {
        // SAFETY: initialized in `new`, destroyed only in drop.
        check(Primitive::Cond, "signal", unsafe {
            libc::pthread_cond_signal(self.inner.get())
        })
    }

    /// Wake every thread currently waiting
    pub fn broadcast(&self) -> Result<()> {
        // SAFETY: see `signal`.
        check(Primitive::Cond, "broadcast", unsafe {
            libc::pthread_cond_broadcast(self.inner.get())
        })
    }
}

impl Drop for Cond {
    fn drop(&mut self) {
        // SAFETY: exclusive access; no thread can still be waiting.
        let ret = unsafe { libc::pthread_cond_destroy(self.inner.get()) };
        if ret != 0 {
            sync_debug!("pthread_cond_destroy failed: {}", ret);
        } else {
            sync_trace!("condition variable destroyed");
        }
    }
}

impl fmt::Debug for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cond").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mutex;
    use std::time::{Instant, UNIX_EPOCH};

    #[test]
    fn test_signal_without_waiters() {
        let cond = Cond::new().unwrap();
        cond.signal().unwrap();
        cond.broadcast().unwrap();
    }

    #[test]
    fn test_past_deadline_times_out() {
        let mutex = Mutex::new().unwrap();
        let cond = Cond::new().unwrap();

        let mut guard = mutex.guard().unwrap();
        let start = Instant::now();
        let outcome = cond.timed_wait_guard(&mut guard, UNIX_EPOCH).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(outcome.timed_out());
        assert!(start.elapsed() < Duration::from_millis(500));

        // Still held after the timeout.
        assert!(!mutex.try_lock().unwrap());
    }

    #[test]
    fn test_raw_handle_timed_wait() {
        let mutex = Mutex::new().unwrap();
        let cond = Cond::new().unwrap();

        mutex.lock().unwrap();
        let deadline = SystemTime::now() - Duration::from_secs(1);
        let outcome = unsafe { cond.timed_wait(mutex.native_handle(), deadline) }.unwrap();
        assert!(outcome.timed_out());
        unsafe { mutex.unlock().unwrap() };
    }

    #[test]
    fn test_zero_timeout() {
        let mutex = Mutex::new().unwrap();
        let cond = Cond::new().unwrap();

        let mut guard = mutex.guard().unwrap();
        loop {
            if cond.wait_timeout(&mut guard, Duration::ZERO).unwrap().timed_out() {
                break;
            }
        }
    }

    #[test]
    fn test_rejects_second_mutex() {
        let first = Mutex::new().unwrap();
        let second = Mutex::new().unwrap();
        let cond = Cond::new().unwrap();

        {
            let mut guard = first.guard().unwrap();
            assert!(cond.timed_wait_guard(&mut guard, UNIX_EPOCH).unwrap().timed_out());
        }

        let mut guard = second.guard().unwrap();
        let err = cond.timed_wait_guard(&mut guard, UNIX_EPOCH).unwrap_err();
        assert_eq!(err.primitive(), Primitive::Cond);
        assert_eq!(err.code(), libc::EINVAL);
        let err = cond.wait_guard(&mut guard).unwrap_err();
        assert_eq!(err.code(), libc::EINVAL);
        drop(guard);

        // The original pairing still works.
        let mut guard = first.guard().unwrap();
        assert!(cond.wait_timeout(&mut guard, Duration::ZERO).is_ok());
    }
}
