//! Mutual exclusion lock
//!
//! [`Mutex`] owns a `pthread_mutex_t` of type `PTHREAD_MUTEX_NORMAL`: locking
//! it twice from the same thread deadlocks instead of recursing or reporting
//! an error. The native handle is exposed through [`MutexHandle`] so a
//! [`Cond`](crate::Cond) can release and reacquire the same lock atomically.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;

use ox_core::{sync_debug, sync_trace};

use crate::{check, Primitive, Result, SyncError};

/// Scoped `pthread_mutexattr_t`, destroyed when the constructor returns
struct MutexAttr(MaybeUninit<libc::pthread_mutexattr_t>);

impl MutexAttr {
    fn new() -> Result<Self> {
        let mut attr = MaybeUninit::uninit();
        // SAFETY: pthread_mutexattr_init initializes the storage.
        let ret = unsafe { libc::pthread_mutexattr_init(attr.as_mut_ptr()) };
        if ret != 0 {
            return Err(SyncError::init(Primitive::Mutex, ret));
        }
        Ok(Self(attr))
    }

    fn set_normal(&mut self) -> Result<()> {
        // SAFETY: initialized in `new`.
        let ret = unsafe {
            libc::pthread_mutexattr_settype(self.0.as_mut_ptr(), libc::PTHREAD_MUTEX_NORMAL)
        };
        if ret != 0 {
            return Err(SyncError::init(Primitive::Mutex, ret));
        }
        Ok(())
    }

    fn as_ptr(&self) -> *const libc::pthread_mutexattr_t {
        self.0.as_ptr()
    }
}

impl Drop for MutexAttr {
    fn drop(&mut self) {
        // SAFETY: initialized in `new`, destroyed once here.
        unsafe {
            libc::pthread_mutexattr_destroy(self.0.as_mut_ptr());
        }
    }
}

/// Non-reentrant lock backed by `pthread_mutex_t`
pub struct Mutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: pthread mutex operations are thread-safe on a shared object and the
// boxed object never moves while the wrapper is alive.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Create an unlocked mutex
    pub fn new() -> Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));

        let mut attr = MutexAttr::new()?;
        attr.set_normal()?;

        // SAFETY: both pointers are valid; the mutex is not yet in use.
        let ret = unsafe { libc::pthread_mutex_init(inner.get(), attr.as_ptr()) };
        if ret != 0 {
            return Err(SyncError::init(Primitive::Mutex, ret));
        }

        sync_trace!("mutex created");
        Ok(Self { inner })
    }

    /// Block until the calling thread owns the lock.
    ///
    /// Calling this while already holding the lock deadlocks.
    pub fn lock(&self) -> Result<()> {
        // SAFETY: initialized in `new`, destroyed only in drop.
        check(Primitive::Mutex, "lock", unsafe {
            libc::pthread_mutex_lock(self.inner.get())
        })
    }

    /// Take the lock if it is free, without blocking.
    ///
    /// Returns `Ok(false)` if any thread, the caller included, holds it.
    pub fn try_lock(&self) -> Result<bool> {
        // SAFETY: see `lock`.
        match unsafe { libc::pthread_mutex_trylock(self.inner.get()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            code => Err(SyncError::op(Primitive::Mutex, "try_lock", code)),
        }
    }

    /// Release the lock.
    ///
    /// # Safety
    ///
    /// The calling thread must currently hold the lock, taken with
    /// [`lock`](Self::lock) or a successful [`try_lock`](Self::try_lock).
    pub unsafe fn unlock(&self) -> Result<()> {
        check(
            Primitive::Mutex,
            "unlock",
            libc::pthread_mutex_unlock(self.inner.get()),
        )
    }

    /// Lock and return a guard that unlocks when dropped
    pub fn guard(&self) -> Result<MutexGuard<'_>> {
        self.lock()?;
        Ok(MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Native handle of this mutex, for pairing with a condition variable
    #[inline]
    pub fn native_handle(&self) -> MutexHandle<'_> {
        MutexHandle {
            raw: self.inner.get(),
            _mutex: PhantomData,
        }
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // SAFETY: exclusive access. Dropping a locked mutex is the caller's
        // error; the OS reports it and it is ignored here.
        let ret = unsafe { libc::pthread_mutex_destroy(self.inner.get()) };
        if ret != 0 {
            sync_debug!("pthread_mutex_destroy failed: {}", ret);
        } else {
            sync_trace!("mutex destroyed");
        }
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("handle", &self.inner.get())
            .finish()
    }
}

/// Borrowed native handle of a [`Mutex`]
///
/// Valid for as long as the mutex it came from. Passed to
/// [`Cond::wait`](crate::Cond::wait) and [`Cond::timed_wait`](crate::Cond::timed_wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexHandle<'a> {
    raw: *mut libc::pthread_mutex_t,
    _mutex: PhantomData<&'a Mutex>,
}

impl<'a> MutexHandle<'a> {
    /// Raw `pthread_mutex_t` pointer for FFI interop
    #[inline]
    pub fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.raw
    }
}

/// Scoped ownership of a locked [`Mutex`]
///
/// Unlocks on drop. Not `Send`: a POSIX mutex has to be unlocked by the
/// thread that locked it.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MutexGuard<'a> {
    /// The locked mutex
    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }

    /// Native handle of the locked mutex
    pub fn handle(&self) -> MutexHandle<'a> {
        self.mutex.native_handle()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while this thread holds the lock.
        if let Err(e) = unsafe { self.mutex.unlock() } {
            sync_debug!("guard unlock failed: {}", e);
        }
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("mutex", self.mutex)
            .finish()
    }
}
