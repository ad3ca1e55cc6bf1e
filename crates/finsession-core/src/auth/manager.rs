//! Timer-driven token lifecycle manager.
//!
//! Owns the two 1-second countdowns (the underlying token countdown and the
//! visible renewal countdown) as tokio tasks and drives [`TokenLifecycle`]
//! from their ticks. Every timer carries the generation it was started in;
//! `start`, `stop` and `terminate` bump the generation under the same lock
//! that aborts the tasks, so a tick from an old countdown can never change
//! state after a restart.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::lifecycle::{LifecyclePolicy, LifecycleState, MainTick, TokenLifecycle, WarningTick};
use super::session::SessionState;
use crate::events::{LogoutReason, SessionEvent};

/// Countdown resolution
const TICK: Duration = Duration::from_secs(1);

/// Snapshot of timer bookkeeping, used to verify no timer is ever leaked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCounts {
    pub started: usize,
    /// Timers aborted or retired
    pub cancelled: usize,
    pub live: usize,
}

#[derive(Default)]
struct TimerStats {
    started: AtomicUsize,
    cancelled: AtomicUsize,
}

struct Machine {
    lifecycle: TokenLifecycle,
    generation: u64,
    main_timer: Option<JoinHandle<()>>,
    warning_timer: Option<JoinHandle<()>>,
}

struct Inner {
    machine: Mutex<Machine>,
    session: Arc<SessionState>,
    stats: TimerStats,
}

#[derive(Clone, Copy)]
enum Countdown {
    Main,
    Warning,
}

/// Tracks access-token expiry and forces logout when it runs out.
///
/// Cheap to clone; clones share the same state. Timer tasks hold only a weak
/// reference, so dropping every handle stops the countdowns.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<Inner>,
}

impl TokenLifecycleManager {
    pub fn new(session: Arc<SessionState>, policy: LifecyclePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(Machine {
                    lifecycle: TokenLifecycle::new(policy),
                    generation: 0,
                    main_timer: None,
                    warning_timer: None,
                }),
                session,
                stats: TimerStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.inner
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().lifecycle.state()
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.lock().lifecycle.policy()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock().lifecycle.expires_at()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.lock().lifecycle.remaining(Instant::now())
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.inner.session
    }

    pub fn timer_counts(&self) -> TimerCounts {
        let machine = self.lock();
        let live =
            usize::from(machine.main_timer.is_some()) + usize::from(machine.warning_timer.is_some());
        TimerCounts {
            started: self.inner.stats.started.load(Ordering::SeqCst),
            cancelled: self.inner.stats.cancelled.load(Ordering::SeqCst),
            live,
        }
    }

    /// Enter `Active` with a fresh validity window after login or renewal.
    ///
    /// Cancels both countdowns and starts a new underlying countdown. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) {
        {
            let mut machine = self.lock();
            self.activate(&mut machine);
        }
        debug!(expires_at = ?self.expires_at(), "Token countdown started");
        self.emit(SessionEvent::StateChanged(LifecycleState::Active));
    }

    /// Current timer generation. Bumped by every `start`, `stop` and `terminate`.
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// `start`, but only if nothing started, stopped or terminated the
    /// lifecycle since `generation` was read. Returns whether it restarted.
    pub(crate) fn restart_from(&self, generation: u64) -> bool {
        {
            let mut machine = self.lock();
            if machine.generation != generation {
                return false;
            }
            self.activate(&mut machine);
        }
        debug!(expires_at = ?self.expires_at(), "Token countdown restarted");
        self.emit(SessionEvent::StateChanged(LifecycleState::Active));
        true
    }

    fn activate(&self, machine: &mut Machine) {
        let now = Instant::now();
        self.cancel_timers(machine);
        machine.generation += 1;
        machine.lifecycle.activate(now, Utc::now());
        let generation = machine.generation;
        machine.main_timer = Some(self.spawn_countdown(Countdown::Main, generation, now));
    }

    /// Cancel all timers and return to `Unauthenticated` without touching the
    /// store. Synchronous: no tick fires after this returns.
    pub fn stop(&self) {
        let mut machine = self.lock();
        self.cancel_timers(&mut machine);
        machine.generation += 1;
        machine.lifecycle.reset();
    }

    /// Full logout: stop timers, clear the session state, switch the UI to login.
    pub fn terminate(&self, reason: LogoutReason) {
        self.stop();
        if let Err(e) = self.inner.session.reset() {
            error!(error = %e, "Failed to clear credential store during logout");
        }
        info!(?reason, "Session ended");
        self.emit(SessionEvent::StateChanged(LifecycleState::Unauthenticated));
        self.emit(SessionEvent::LoggedOut { reason });
    }

    fn emit(&self, event: SessionEvent) {
        self.inner.session.events().emit(event);
    }

    fn cancel_timers(&self, machine: &mut Machine) {
        for handle in [machine.main_timer.take(), machine.warning_timer.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
            self.inner.stats.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spawn_countdown(&self, which: Countdown, generation: u64, start: Instant) -> JoinHandle<()> {
        self.inner.stats.started.fetch_add(1, Ordering::SeqCst);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut ticker = interval_at(start + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = TokenLifecycleManager { inner };
                let keep_going = match which {
                    Countdown::Main => manager.on_main_tick(generation),
                    Countdown::Warning => manager.on_warning_tick(generation),
                };
                if !keep_going {
                    break;
                }
            }
        })
    }

    /// Returns false when the countdown should stop.
    fn on_main_tick(&self, generation: u64) -> bool {
        let outcome = {
            let mut machine = self.lock();
            if machine.generation != generation {
                return false;
            }
            let outcome = machine.lifecycle.main_tick(Instant::now());
            if let MainTick::EnterWarning { .. } = outcome {
                let handle = self.spawn_countdown(Countdown::Warning, generation, Instant::now());
                machine.warning_timer = Some(handle);
            }
            outcome
        };

        match outcome {
            MainTick::Countdown { remaining_secs } => {
                self.emit(SessionEvent::Countdown { remaining_secs });
                true
            }
            MainTick::EnterWarning {
                remaining_secs,
                countdown_secs,
            } => {
                info!(remaining_secs, "Access token about to expire, prompting for renewal");
                self.emit(SessionEvent::Countdown { remaining_secs });
                self.emit(SessionEvent::StateChanged(LifecycleState::RenewalWarning));
                self.emit(SessionEvent::RenewalPrompt {
                    seconds: countdown_secs,
                });
                true
            }
            MainTick::Expire => {
                self.expire();
                false
            }
            MainTick::Inactive => false,
        }
    }

    fn on_warning_tick(&self, generation: u64) -> bool {
        let outcome = {
            let mut machine = self.lock();
            if machine.generation != generation {
                return false;
            }
            machine.lifecycle.warning_tick()
        };

        match outcome {
            WarningTick::Countdown { remaining_secs } => {
                self.emit(SessionEvent::RenewalCountdown { remaining_secs });
                true
            }
            WarningTick::Expire => {
                self.emit(SessionEvent::RenewalCountdown { remaining_secs: 0 });
                self.expire();
                false
            }
            WarningTick::Inactive => false,
        }
    }

    fn expire(&self) {
        info!("Access token expired without renewal");
        self.emit(SessionEvent::StateChanged(LifecycleState::Expired));
        self.terminate(LogoutReason::Expired);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, Session};
    use crate::events::{EventSink, EventStream};
    use crate::models::{AccountStatus, Role, UserProfile};

    fn manager_with_events() -> (TokenLifecycleManager, EventStream) {
        let (events, rx) = EventSink::channel(4096);
        let session = SessionState::init(CredentialStore::in_memory(), events);
        (TokenLifecycleManager::new(session, LifecyclePolicy::default()), rx)
    }

    fn sample_session() -> Session {
        Session {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            user: UserProfile {
                id: "u1".into(),
                display_name: "Ana".into(),
                email: "ana@example.com".into(),
                photo_url: None,
                role: Role::Standard,
                status: AccountStatus::Active,
                created_at: None,
            },
        }
    }

    /// Advance the paused clock one second at a time, letting timer tasks run.
    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(TICK).await;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }
    }

    fn drain(rx: &mut EventStream) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_leaves_one_live_timer() {
        let (manager, _rx) = manager_with_events();
        for _ in 0..5 {
            manager.start();
        }
        let counts = manager.timer_counts();
        assert_eq!(counts.started, 5);
        assert_eq!(counts.cancelled, 4);
        assert_eq!(counts.live, 1);
        assert_eq!(manager.state(), LifecycleState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_decrease() {
        let (manager, mut rx) = manager_with_events();
        manager.start();
        advance_secs(10).await;

        let remaining: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Countdown { remaining_secs } => Some(remaining_secs),
                _ => None,
            })
            .collect();
        assert_eq!(remaining.len(), 10);
        assert!(remaining.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(remaining[0], 899);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_then_expiry_logs_out() {
        let (manager, mut rx) = manager_with_events();
        manager.session().establish(&sample_session()).unwrap();
        assert!(!manager.session().store().is_empty().unwrap());
        manager.start();

        advance_secs(840).await;
        assert_eq!(manager.state(), LifecycleState::RenewalWarning);
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::RenewalPrompt { seconds: 60 }));
        assert_eq!(manager.timer_counts().live, 2);

        advance_secs(60).await;
        assert_eq!(manager.state(), LifecycleState::Unauthenticated);
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::StateChanged(LifecycleState::Expired)));
        let logouts = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::LoggedOut { .. }))
            .count();
        assert_eq!(logouts, 1);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::LoggedOut {
                reason: LogoutReason::Expired
            })
        );
        assert_eq!(manager.timer_counts().live, 0);
        assert!(manager.session().store().is_empty().unwrap());
        assert!(manager.session().current_user().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_from_stale_generation_is_ignored() {
        let (manager, mut rx) = manager_with_events();
        manager.start();
        let generation = manager.generation();

        // Logout lands while a renewal is finishing
        manager.terminate(LogoutReason::UserRequested);
        drain(&mut rx);

        assert!(!manager.restart_from(generation));
        assert_eq!(manager.state(), LifecycleState::Unauthenticated);
        assert_eq!(manager.timer_counts().live, 0);

        advance_secs(5).await;
        assert!(drain(&mut rx).is_empty());

        manager.start();
        assert!(manager.restart_from(manager.generation()));
        assert_eq!(manager.state(), LifecycleState::Active);
        assert_eq!(manager.timer_counts().live, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_warning_cancels_both() {
        let (manager, mut rx) = manager_with_events();
        manager.start();
        advance_secs(845).await;
        assert_eq!(manager.state(), LifecycleState::RenewalWarning);

        manager.start();
        drain(&mut rx);
        let counts = manager.timer_counts();
        assert_eq!(counts.live, 1);
        assert_eq!(counts.started - counts.cancelled, 1);

        // The old visible countdown would have hit zero here
        advance_secs(60).await;
        assert_eq!(manager.state(), LifecycleState::Active);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::RenewalCountdown { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::LoggedOut { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_synchronous() {
        let (manager, mut rx) = manager_with_events();
        manager.start();
        advance_secs(2).await;
        manager.stop();
        drain(&mut rx);

        advance_secs(5).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(manager.timer_counts().live, 0);
        assert_eq!(manager.state(), LifecycleState::Unauthenticated);
    }
}
