//! Access-token lifecycle state machine.
//!
//! Pure bookkeeping: no timers, no I/O. The [`TokenLifecycleManager`] feeds
//! it ticks from two 1-second countdowns and acts on the outcomes.
//!
//! ```text
//! Unauthenticated --activate--> Active --remaining <= threshold--> RenewalWarning
//!        ^                        |  ^                                  |
//!        |                        |  +-----------activate---------------+
//!        |                        v                                     v
//!        +-------reset-------- Expired <--------visible countdown = 0---+
//! ```
//!
//! [`TokenLifecycleManager`]: super::TokenLifecycleManager

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// Access tokens are valid for 15 minutes after login or renewal.
pub const VALIDITY_WINDOW_SECS: u64 = 15 * 60;

/// Remaining time at which the renewal prompt is shown.
pub const WARNING_THRESHOLD_SECS: u64 = 60;

/// Length of the visible countdown shown with the renewal prompt.
pub const WARNING_COUNTDOWN_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unauthenticated,
    Active,
    RenewalWarning,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    pub validity_window_secs: u64,
    pub warning_threshold_secs: u64,
    pub warning_countdown_secs: u64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            validity_window_secs: VALIDITY_WINDOW_SECS,
            warning_threshold_secs: WARNING_THRESHOLD_SECS,
            warning_countdown_secs: WARNING_COUNTDOWN_SECS,
        }
    }
}

impl LifecyclePolicy {
    pub fn validity_window(&self) -> Duration {
        Duration::from_secs(self.validity_window_secs)
    }
}

/// Outcome of a tick of the underlying token countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainTick {
    Countdown { remaining_secs: u64 },
    /// Threshold crossed for the first time; the visible countdown should start
    EnterWarning {
        remaining_secs: u64,
        countdown_secs: u64,
    },
    Expire,
    /// Not in a live state; the timer should stop
    Inactive,
}

/// Outcome of a tick of the visible renewal countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningTick {
    Countdown { remaining_secs: u64 },
    Expire,
    Inactive,
}

#[derive(Debug, Clone)]
pub struct TokenLifecycle {
    policy: LifecyclePolicy,
    state: LifecycleState,
    deadline: Option<Instant>,
    expires_at: Option<DateTime<Utc>>,
    warned: bool,
    warning_remaining: u64,
}

impl TokenLifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self {
            policy,
            state: LifecycleState::Unauthenticated,
            deadline: None,
            expires_at: None,
            warned: false,
            warning_remaining: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    pub fn warning_remaining(&self) -> Option<u64> {
        (self.state == LifecycleState::RenewalWarning).then_some(self.warning_remaining)
    }

    /// Login or successful renewal. `now` and `wall_now` are the same moment
    /// on the monotonic and wall clocks.
    pub fn activate(&mut self, now: Instant, wall_now: DateTime<Utc>) {
        let window = self.policy.validity_window();
        self.state = LifecycleState::Active;
        self.deadline = Some(now + window);
        self.expires_at = chrono::Duration::from_std(window)
            .ok()
            .map(|w| wall_now + w);
        self.warned = false;
        self.warning_remaining = 0;
    }

    pub fn main_tick(&mut self, now: Instant) -> MainTick {
        if !matches!(
            self.state,
            LifecycleState::Active | LifecycleState::RenewalWarning
        ) {
            return MainTick::Inactive;
        }
        let Some(remaining) = self.remaining(now) else {
            return MainTick::Inactive;
        };

        if remaining.is_zero() {
            self.state = LifecycleState::Expired;
            return MainTick::Expire;
        }

        let remaining_secs = remaining.as_secs();
        if self.state == LifecycleState::Active
            && !self.warned
            && remaining_secs <= self.policy.warning_threshold_secs
        {
            self.warned = true;
            self.state = LifecycleState::RenewalWarning;
            self.warning_remaining = self.policy.warning_countdown_secs;
            return MainTick::EnterWarning {
                remaining_secs,
                countdown_secs: self.warning_remaining,
            };
        }

        MainTick::Countdown { remaining_secs }
    }

    pub fn warning_tick(&mut self) -> WarningTick {
        if self.state != LifecycleState::RenewalWarning {
            return WarningTick::Inactive;
        }
        self.warning_remaining = self.warning_remaining.saturating_sub(1);
        if self.warning_remaining == 0 {
            self.state = LifecycleState::Expired;
            WarningTick::Expire
        } else {
            WarningTick::Countdown {
                remaining_secs: self.warning_remaining,
            }
        }
    }

    /// Back to `Unauthenticated`, forgetting the deadline.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }
}

// ============================================================================
// Tests
// ============================================================================
