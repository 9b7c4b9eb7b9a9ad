use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

static LAST_EVENT_MS: AtomicU64 = AtomicU64::new(0);

/// return millisecond
pub(crate) fn get_now_as_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock milliseconds that never go backwards within this process.
///
/// A clock step back yields the last value handed out again.
pub(crate) fn monotonic_now_ms() -> u64 {
    let now = get_now_as_millis();
    let prev = LAST_EVENT_MS.fetch_max(now, Ordering::AcqRel);
    prev.max(now)
}
