//! Events published to the UI layer.
//!
//! The lifecycle manager and the session controller never touch a view
//! directly; they emit `SessionEvent`s on a bounded channel and the frontend
//! renders them (countdown label, renewal prompt, notifications, login vs
//! dashboard screen).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::LifecycleState;
use crate::models::UserProfile;

/// Default capacity for the event channel.
/// One countdown tick per second plus occasional notifications; 256 gives a
/// slow frontend several minutes of headroom.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// User asked to log out (or declined the renewal prompt)
    UserRequested,
    /// Countdown ran out
    Expired,
    /// Server rejected the session and renewal could not recover it
    AuthRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(LifecycleState),
    /// Underlying token countdown, once per second
    Countdown { remaining_secs: u64 },
    /// Renewal prompt should be shown with a visible countdown of `seconds`
    RenewalPrompt { seconds: u64 },
    RenewalCountdown { remaining_secs: u64 },
    /// Switch to the dashboard view
    Authenticated { user: UserProfile },
    /// Switch to the login view
    LoggedOut { reason: LogoutReason },
    Notification {
        level: NotificationLevel,
        message: String,
    },
}

impl SessionEvent {
    /// Events that switch the view (login, dashboard, lifecycle state).
    /// Losing one leaves the frontend on the wrong screen.
    pub fn changes_view(&self) -> bool {
        matches!(
            self,
            SessionEvent::StateChanged(_)
                | SessionEvent::Authenticated { .. }
                | SessionEvent::LoggedOut { .. }
        )
    }
}

/// Slots for view-changing events that arrived while the channel was full.
const OVERFLOW_CAPACITY: usize = 16;

type Overflow = Arc<Mutex<VecDeque<SessionEvent>>>;

fn lock_overflow(overflow: &Overflow) -> MutexGuard<'_, VecDeque<SessionEvent>> {
    overflow.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sending half of the event channel. Never blocks. When the channel is full,
/// countdown ticks and notifications are dropped with a warning, while
/// view-changing events go to a small overflow queue read after the channel.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<SessionEvent>>,
    overflow: Overflow,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let overflow = Overflow::default();
        let stream = EventStream {
            rx,
            overflow: overflow.clone(),
        };
        (
            Self {
                tx: Some(tx),
                overflow,
            },
            stream,
        )
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SessionEvent) {
        let Some(ref tx) = self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) if event.changes_view() => {
                let mut overflow = lock_overflow(&self.overflow);
                if overflow.len() == OVERFLOW_CAPACITY {
                    let dropped = overflow.pop_front();
                    warn!(?dropped, "Event overflow full, dropping oldest view event");
                }
                debug!(?event, "Event channel full, queued in overflow");
                overflow.push_back(event);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped");
            }
        }
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.emit(SessionEvent::Notification {
            level,
            message: message.into(),
        });
    }
}

/// Receiving half of the event channel.
///
/// Yields everything that made it into the channel first, then any
/// view-changing events that overflowed it.
pub struct EventStream {
    rx: mpsc::Receiver<SessionEvent>,
    overflow: Overflow,
}

impl EventStream {
    /// Next event without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(_) => lock_overflow(&self.overflow).pop_front(),
        }
    }

    /// Wait for the next event. `None` once every sink is dropped and
    /// nothing is left.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        match self.rx.recv().await {
            Some(event) => Some(event),
            None => lock_overflow(&self.overflow).pop_front(),
        }
    }
}
