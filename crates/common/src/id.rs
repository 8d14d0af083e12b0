//! ID generation utilities.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Last identity handed out in this process.
static LAST_LOCAL_ID: AtomicI64 = AtomicI64::new(0);

/// ID generator for records created by the local backend.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a numeric record identity from the wall clock.
    ///
    /// Identities are Unix milliseconds, bumped by one when two are requested
    /// within the same millisecond, so they are unique and strictly increasing
    /// within the process.
    #[must_use]
    pub fn next_local_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = LAST_LOCAL_ID
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }
}
