//! Practice-session timer.
//!
//! Tracks elapsed wall-clock time for one session, but only while the session is
//! visible. Hiding folds the running window into the accumulated total and stops the
//! 1 Hz ticker; showing starts a new window. The final duration is handed to the
//! session recorder exactly once: on `end`, or on drop if `end` never happened.
//!
//! Time comes from `tokio::time::Instant`, so tests drive it with a paused clock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The learner ended the session.
    Explicit,
    /// The session was torn down without an explicit end.
    Teardown,
}

/// Final duration handed to the session recorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedSession {
    pub duration_seconds: u64,
    pub reason: EndReason,
}

#[derive(Debug, Default)]
struct TimerState {
    /// Start of the current visible window; `None` while hidden or finished.
    anchor: Option<Instant>,
    /// Visible time from closed windows.
    accumulated: Duration,
    finished: bool,
}

impl TimerState {
    fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated + self.anchor.map(|a| now.saturating_duration_since(a)).unwrap_or_default()
    }

    fn fold(&mut self, now: Instant) {
        if let Some(a) = self.anchor.take() {
            self.accumulated += now.saturating_duration_since(a);
        }
    }
}

pub struct SessionTimer {
    state: Arc<Mutex<TimerState>>,
    elapsed_tx: Arc<watch::Sender<u64>>,
    ticker: Option<JoinHandle<()>>,
    report_tx: mpsc::UnboundedSender<FinishedSession>,
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionTimer {
    /// Start a visible session. Must be called from within a tokio runtime.
    pub fn start(report_tx: mpsc::UnboundedSender<FinishedSession>) -> Self {
        let state = TimerState { anchor: Some(Instant::now()), ..Default::default() };
        let (elapsed_tx, _) = watch::channel(0);
        let mut timer = Self {
            state: Arc::new(Mutex::new(state)),
            elapsed_tx: Arc::new(elapsed_tx),
            ticker: None,
            report_tx,
        };
        timer.spawn_ticker();
        timer
    }

    /// Whole seconds of visible time so far.
    pub fn elapsed_secs(&self) -> u64 {
        lock(&self.state).elapsed(Instant::now()).as_secs()
    }

    /// Receiver of the once-per-second elapsed updates.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.state).anchor.is_some()
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.state).finished
    }

    /// Visibility transition. Repeating the current state is a no-op.
    pub fn set_visible(&mut self, visible: bool) {
        let now = Instant::now();
        let secs = {
            let mut st = lock(&self.state);
            if st.finished || st.anchor.is_some() == visible {
                return;
            }
            if visible {
                st.anchor = Some(now);
            } else {
                st.fold(now);
            }
            st.elapsed(now).as_secs()
        };
        if visible {
            self.spawn_ticker();
        } else {
            self.cancel_ticker();
        }
        self.elapsed_tx.send_replace(secs);
        debug!(target: "practice", visible, elapsed_secs = secs, "Session visibility changed");
    }

    /// Explicit end. Returns the submitted duration, or `None` when nothing was
    /// submitted (already finished, or zero seconds elapsed).
    pub fn end(&mut self) -> Option<u64> {
        self.finish(EndReason::Explicit)
    }

    fn finish(&mut self, reason: EndReason) -> Option<u64> {
        let now = Instant::now();
        let secs = {
            let mut st = lock(&self.state);
            if st.finished {
                return None;
            }
            st.finished = true;
            st.fold(now);
            st.accumulated.as_secs()
        };
        self.cancel_ticker();
        self.elapsed_tx.send_replace(secs);

        if secs == 0 {
            debug!(target: "practice", ?reason, "Session ended with no elapsed time; nothing to record");
            return None;
        }
        let record = FinishedSession { duration_seconds: secs, reason };
        if self.report_tx.send(record).is_err() {
            debug!(target: "practice", ?reason, "Session recorder already gone; duration dropped");
            return None;
        }
        info!(target: "practice", duration_seconds = secs, ?reason, "Session duration submitted");
        Some(secs)
    }

    fn spawn_ticker(&mut self) {
        self.cancel_ticker();
        let state = self.state.clone();
        let tx = self.elapsed_tx.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let secs = {
                    let st = lock(&state);
                    if st.finished || st.anchor.is_none() {
                        break;
                    }
                    st.elapsed(Instant::now()).as_secs()
                };
                tx.send_replace(secs);
            }
        }));
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.finish(EndReason::Teardown);
    }
}
