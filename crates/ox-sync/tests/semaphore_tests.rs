//! Blocking behaviour of the counting semaphore

use ox_sync::Semaphore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_initial_count_waits_without_blocking() {
    for n in [0u32, 1, 5, 64] {
        let sem = Semaphore::with_count(n).unwrap();
        for _ in 0..n {
            sem.wait().unwrap();
        }
        // The next decrement would block.
        assert!(!sem.try_wait().unwrap(), "count {} not exhausted", n);
    }
}

#[test]
fn test_wait_blocks_until_post() {
    let sem = Arc::new(Semaphore::with_count(1).unwrap());
    sem.wait().unwrap();

    let passed = Arc::new(AtomicBool::new(false));
    let waiter = {
        let sem = Arc::clone(&sem);
        let passed = Arc::clone(&passed);
        thread::spawn(move || {
            sem.wait().unwrap();
            passed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!passed.load(Ordering::SeqCst), "wait returned with a zero count");

    sem.post().unwrap();
    waiter.join().unwrap();
    assert!(passed.load(Ordering::SeqCst));
}

#[test]
fn test_post_then_wait_single_thread() {
    let sem = Semaphore::new().unwrap();
    let k = 1000;
    for _ in 0..k {
        sem.post().unwrap();
    }
    for _ in 0..k {
        sem.wait().unwrap();
    }
    assert!(!sem.try_wait().unwrap());
}

#[test]
fn test_one_post_releases_one_waiter() {
    let sem = Arc::new(Semaphore::new().unwrap());
    let (tx, rx) = mpsc::channel();

    let waiters: Vec<_> = (0..2)
        .map(|id| {
            let sem = Arc::clone(&sem);
            let tx = tx.clone();
            thread::spawn(move || {
                sem.wait().unwrap();
                tx.send(id).unwrap();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    sem.post().unwrap();

    rx.recv_timeout(Duration::from_secs(5))
        .expect("no waiter released by post");
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout),
        "a single post released two waiters"
    );

    sem.post().unwrap();
    rx.recv_timeout(Duration::from_secs(5))
        .expect("second waiter never released");

    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn test_concurrent_post_wait_balances() {
    let sem = Arc::new(Semaphore::new().unwrap());
    let per_thread = 500;

    let posters: Vec<_> = (0..4)
        .map(|_| {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    sem.post().unwrap();
                }
            })
        })
        .collect();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    sem.wait().unwrap();
                }
            })
        })
        .collect();

    for handle in posters.into_iter().chain(waiters) {
        handle.join().unwrap();
    }
    assert!(!sem.try_wait().unwrap());
}

#[cfg(target_os = "linux")]
extern "C" fn ignore_signal(_: libc::c_int) {}

#[cfg(target_os = "linux")]
#[test]
fn test_wait_restarts_after_signal() {
    use std::{mem, ptr};

    // No SA_RESTART: sem_wait comes back with EINTR when the handler runs.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = ignore_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        assert_eq!(libc::sigaction(libc::SIGUSR1, &action, ptr::null_mut()), 0);
    }

    let sem = Arc::new(Semaphore::new().unwrap());
    let returned = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let waiter = {
        let sem = Arc::clone(&sem);
        let returned = Arc::clone(&returned);
        thread::spawn(move || {
            tx.send(unsafe { libc::pthread_self() }).unwrap();
            let result = sem.wait();
            returned.store(true, Ordering::SeqCst);
            result
        })
    };

    let tid = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    for _ in 0..3 {
        assert_eq!(unsafe { libc::pthread_kill(tid, libc::SIGUSR1) }, 0);
        thread::sleep(Duration::from_millis(20));
    }

    thread::sleep(Duration::from_millis(100));
    assert!(
        !returned.load(Ordering::SeqCst),
        "wait returned after a signal without a post"
    );

    sem.post().unwrap();
    assert!(waiter.join().unwrap().is_ok());
}
