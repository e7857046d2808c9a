//! Deadline conversion for timed waits

use std::mem;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Convert an absolute `CLOCK_REALTIME` deadline to a timespec.
///
/// Deadlines before the epoch clamp to the epoch, which has always elapsed.
/// Deadlines past the range of `time_t` clamp to the largest representable
/// instant.
pub(crate) fn deadline_to_timespec(deadline: SystemTime) -> libc::timespec {
    match deadline.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => duration_to_timespec(since_epoch),
        Err(_) => duration_to_timespec(Duration::ZERO),
    }
}

/// Absolute deadline `timeout` from now
pub(crate) fn deadline_after(timeout: Duration) -> libc::timespec {
    match SystemTime::now().checked_add(timeout) {
        Some(deadline) => deadline_to_timespec(deadline),
        None => max_timespec(),
    }
}

fn duration_to_timespec(d: Duration) -> libc::timespec {
    match libc::time_t::try_from(d.as_secs()) {
        Ok(secs) => make_timespec(secs, d.subsec_nanos() as libc::c_long),
        Err(_) => max_timespec(),
    }
}

fn max_timespec() -> libc::timespec {
    make_timespec(libc::time_t::MAX, 999_999_999)
}

fn make_timespec(secs: libc::time_t, nanos: libc::c_long) -> libc::timespec {
    // Zeroed first: some targets carry padding fields in timespec.
    // SAFETY: timespec is plain data.
    let mut ts: libc::timespec = unsafe { mem::zeroed() };
    ts.tv_sec = secs;
    ts.tv_nsec = nanos;
    ts
}
