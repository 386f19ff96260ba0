//! Outbound send discipline for the observer.
//!
//! Two independent suppressions bound downstream message volume: structural
//! equality with the last admitted message, and a minimum inter-send
//! interval that holds even when content differs. A rate-limited message is
//! not lost: the observer re-derives state on its next poll and offers it
//! again, so only change-free noise is permanently dropped.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Why a message was (or was not) admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Send it; the gate recorded it as the last admitted message.
    Send,

    /// Structurally identical to the last admitted message.
    Duplicate,

    /// Content differs but the minimum inter-send interval has not elapsed.
    RateLimited,
}

struct GateState<M> {
    last_sent: Option<M>,
    last_sent_at: Option<Instant>,
}

/// De-duplication + rate limiting for one page instance's outbound stream.
pub struct OutboundGate<M>
where
    M: PartialEq + Clone,
{
    min_interval: Duration,
    state: Mutex<GateState<M>>,
}

impl<M> OutboundGate<M>
where
    M: PartialEq + Clone,
{
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(GateState {
                last_sent: None,
                last_sent_at: None,
            }),
        }
    }

    /// Decide whether `message` may be sent now.
    pub fn admit(&self, message: &M) -> GateDecision {
        self.admit_at(message, Instant::now())
    }

    /// Clock-explicit variant used by tests.
    pub fn admit_at(&self, message: &M, now: Instant) -> GateDecision {
        let mut state = self.state.lock();

        if state.last_sent.as_ref() == Some(message) {
            return GateDecision::Duplicate;
        }

        if let Some(sent_at) = state.last_sent_at {
            if now.duration_since(sent_at) < self.min_interval {
                return GateDecision::RateLimited;
            }
        }

        state.last_sent = Some(message.clone());
        state.last_sent_at = Some(now);
        GateDecision::Send
    }

    /// Forget the last admitted message (page navigated away).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_sent = None;
        state.last_sent_at = None;
    }
}
