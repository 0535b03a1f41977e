use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A pending request counts as stalled once it has been outstanding
/// this long. Advisory only: nothing is aborted and the loading state
/// is never cleared because of it.
pub const STALL_THRESHOLD: Duration = Duration::from_secs(20);

/// Process-wide network liveness state, shared via `Arc` and injected
/// into whoever needs it. Start/end pairs interleave across unrelated
/// request lifecycles, so the counter is atomic; the oldest-pending
/// timestamp shares a mutex with counter mutations to keep the
/// "timestamp present iff count > 0" invariant exact.
pub struct NetworkStatus {
    pending_count: AtomicUsize,
    oldest_pending: Mutex<Option<Instant>>,
    health_ok: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl NetworkStatus {
    pub fn new() -> Self {
        Self {
            pending_count: AtomicUsize::new(0),
            oldest_pending: Mutex::new(None),
            health_ok: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    fn oldest_lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.oldest_pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn error_lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn on_request_start(&self) {
        let mut oldest = self.oldest_lock();
        let count = self.pending_count.load(Ordering::SeqCst) + 1;
        self.pending_count.store(count, Ordering::SeqCst);
        if count == 1 {
            *oldest = Some(Instant::now());
        }
    }

    pub fn on_request_end(&self) {
        let mut oldest = self.oldest_lock();
        let count = self.pending_count.load(Ordering::SeqCst).saturating_sub(1);
        self.pending_count.store(count, Ordering::SeqCst);
        if count == 0 {
            *oldest = None;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count.load(Ordering::SeqCst)
    }

    pub fn oldest_pending_started_at(&self) -> Option<Instant> {
        *self.oldest_lock()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn is_stalled(&self) -> bool {
        self.is_stalled_at(Instant::now())
    }

    fn is_stalled_at(&self, now: Instant) -> bool {
        self.oldest_pending_started_at()
            .map(|t| now.duration_since(t) > STALL_THRESHOLD)
            .unwrap_or(false)
    }

    pub fn set_health(&self, ok: bool) {
        self.health_ok.store(ok, Ordering::SeqCst);
    }

    pub fn health_ok(&self) -> bool {
        self.health_ok.load(Ordering::SeqCst)
    }

    pub fn set_error(&self, msg: Option<String>) {
        *self.error_lock() = msg;
    }

    pub fn last_error(&self) -> Option<String> {
        self.error_lock().clone()
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new()
    }
}
