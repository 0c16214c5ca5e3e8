//! The dispatch-side rate limiter contract. Internals (refill scheduling,
//! burst shaping) are out of scope here — this crate only needs a
//! best-effort, non-blocking permit check to call through to.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait DispatchRateLimiter: Send + Sync {
    /// Whether a limiter is configured at all. The dispatcher skips the
    /// permit check entirely when this is `false`.
    fn is_present(&self) -> bool;

    /// Best-effort, non-blocking: never awaits, just reports whether the
    /// requested counts fit under the current allowance.
    fn try_dispatch_permit(&self, msg_count: usize, byte_count: usize) -> bool;
}

/// No limiter configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRateLimiter;

impl DispatchRateLimiter for NoRateLimiter {
    fn is_present(&self) -> bool {
        false
    }

    fn try_dispatch_permit(&self, _msg_count: usize, _byte_count: usize) -> bool {
        true
    }
}

/// A simple non-refilling-by-itself token bucket, for tests and the demo
/// binary. Call [`refill`](TokenBucketRateLimiter::refill) from a timer in
/// a real deployment; this crate doesn't schedule that itself.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    msg_tokens: AtomicI64,
    byte_tokens: AtomicI64,
}

impl TokenBucketRateLimiter {
    pub fn new(msg_tokens: i64, byte_tokens: i64) -> Self {
        Self {
            msg_tokens: AtomicI64::new(msg_tokens),
            byte_tokens: AtomicI64::new(byte_tokens),
        }
    }

    pub fn refill(&self, msgs: i64, bytes: i64) {
        self.msg_tokens.fetch_add(msgs, Ordering::Relaxed);
        self.byte_tokens.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl DispatchRateLimiter for TokenBucketRateLimiter {
    fn is_present(&self) -> bool {
        true
    }

    fn try_dispatch_permit(&self, msg_count: usize, byte_count: usize) -> bool {
        let msg_count = msg_count as i64;
        let byte_count = byte_count as i64;
        if self.msg_tokens.load(Ordering::Relaxed) < msg_count
            || self.byte_tokens.load(Ordering::Relaxed) < byte_count
        {
            return false;
        }
        self.msg_tokens.fetch_sub(msg_count, Ordering::Relaxed);
        self.byte_tokens.fetch_sub(byte_count, Ordering::Relaxed);
        true
    }
}
