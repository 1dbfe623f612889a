//! Rate limiting for periodic senders

use crate::sender::{OscSender, SendError};
use crate::types::OscValue;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Accepts at most one send per interval
#[derive(Debug, Clone)]
pub struct SendThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl SendThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Build from an interval in seconds. Non-positive or non-finite values disable throttling.
    pub fn from_secs_f32(seconds: f32) -> Self {
        let interval = if seconds.is_finite() && seconds > 0.0 {
            Duration::from_secs_f32(seconds)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a send is allowed at `now`. Records `now` when it is.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// [`SendThrottle::ready_at`] with the current time
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Forget the last send so the next check passes
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Sender that drops sends arriving faster than its interval
#[derive(Debug)]
pub struct PeriodicSender {
    sender: Arc<OscSender>,
    throttle: SendThrottle,
}

impl PeriodicSender {
    pub fn new(sender: Arc<OscSender>, interval: Duration) -> Self {
        Self {
            sender,
            throttle: SendThrottle::new(interval),
        }
    }

    pub fn sender(&self) -> &Arc<OscSender> {
        &self.sender
    }

    /// Send if the interval has elapsed. Returns `Ok(false)` when throttled or undeliverable.
    pub fn send_if_due(
        &mut self,
        address: &str,
        value: impl Into<OscValue>,
    ) -> Result<bool, SendError> {
        self.send_if_due_at(Instant::now(), address, value)
    }

    /// [`PeriodicSender::send_if_due`] against an explicit clock reading
    pub fn send_if_due_at(
        &mut self,
        now: Instant,
        address: &str,
        value: impl Into<OscValue>,
    ) -> Result<bool, SendError> {
        if !self.throttle.ready_at(now) {
            return Ok(false);
        }
        self.sender.send_value(address, value)
    }
}
