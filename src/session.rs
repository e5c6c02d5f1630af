//! Per-session tracker state.
//!
//! Each logical client session owns an absence timer and an optional
//! reference identity. State lives in a keyed store so concurrent sessions
//! never interfere with each other's timer or reference.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::identity::FaceEncoding;

/// Default idle window after which a session is evicted.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

/// Tracker state for a single session.
#[derive(Debug)]
pub struct SessionState {
    reference: Option<FaceEncoding>,
    absence_started: Option<Instant>,
    last_seen: Instant,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            reference: None,
            absence_started: None,
            last_seen: now,
        }
    }

    /// Feed the face count observed in a frame at `now`.
    ///
    /// Returns true when zero faces have been observed continuously for at
    /// least `threshold`. The timer starts on the first zero-face frame and
    /// is cleared the instant a face reappears, so the timer is set only
    /// while every frame since it started had zero faces.
    pub fn observe_faces(&mut self, face_count: usize, now: Instant, threshold: Duration) -> bool {
        if face_count > 0 {
            self.absence_started = None;
            return false;
        }
        match self.absence_started {
            None => {
                self.absence_started = Some(now);
                false
            }
            Some(started) => now.saturating_duration_since(started) >= threshold,
        }
    }

    /// Stored reference identity, if any.
    pub fn reference(&self) -> Option<&FaceEncoding> {
        self.reference.as_ref()
    }

    /// Store a reference identity, replacing any previous one.
    pub fn set_reference(&mut self, encoding: FaceEncoding) {
        self.reference = Some(encoding);
    }

    /// True while the absence timer is running.
    pub fn absence_timer_running(&self) -> bool {
        self.absence_started.is_some()
    }
}

/// Keyed store of session states with idle eviction.
pub struct SessionStore {
    sessions: HashMap<String, SessionState>,
    max_idle: Duration,
}

impl SessionStore {
    pub fn new(max_idle: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_idle,
        }
    }

    /// Fetch the state for `id`, creating it on first contact. Sessions idle
    /// longer than the configured window are evicted first.
    pub fn state(&mut self, id: &str, now: Instant) -> &mut SessionState {
        let max_idle = self.max_idle;
        self.sessions
            .retain(|_, s| now.saturating_duration_since(s.last_seen) <= max_idle);

        let state = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionState::new(now));
        state.last_seen = now;
        state
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(5);

    #[test]
    fn absence_below_threshold_is_not_looking_away() {
        let t0 = Instant::now();
        let mut state = SessionState::new(t0);

        assert!(!state.observe_faces(0, t0, THRESHOLD));
        assert!(!state.observe_faces(0, t0 + Duration::from_secs(4), THRESHOLD));
    }

    #[test]
    fn sustained_absence_reports_looking_away() {
        let t0 = Instant::now();
        let mut state = SessionState::new(t0);

        assert!(!state.observe_faces(0, t0, THRESHOLD));
        assert!(state.observe_faces(0, t0 + Duration::from_secs(5), THRESHOLD));
        assert!(state.observe_faces(0, t0 + Duration::from_secs(60), THRESHOLD));
    }

    #[test]
    fn face_reappearing_resets_the_timer() {
        let t0 = Instant::now();
        let mut state = SessionState::new(t0);

        assert!(!state.observe_faces(0, t0, THRESHOLD));
        assert!(!state.observe_faces(1, t0 + Duration::from_secs(10), THRESHOLD));
        assert!(!state.absence_timer_running());

        // Next zero-face frame starts a fresh timer.
        assert!(!state.observe_faces(0, t0 + Duration::from_secs(11), THRESHOLD));
        assert!(state.observe_faces(0, t0 + Duration::from_secs(16), THRESHOLD));
    }

    #[test]
    fn faces_never_report_looking_away() {
        let t0 = Instant::now();
        let mut state = SessionState::new(t0);

        for i in 0..10 {
            assert!(!state.observe_faces(2, t0 + Duration::from_secs(i * 10), THRESHOLD));
        }
    }

    #[test]
    fn zero_threshold_trips_on_second_zero_face_frame() {
        let t0 = Instant::now();
        let mut state = SessionState::new(t0);

        assert!(!state.observe_faces(0, t0, Duration::ZERO));
        assert!(state.observe_faces(0, t0, Duration::ZERO));
    }

    #[test]
    fn store_keys_state_per_session() {
        let t0 = Instant::now();
        let mut store = SessionStore::default();

        store.state("a", t0).observe_faces(0, t0, THRESHOLD);
        assert!(store.state("a", t0).absence_timer_running());
        assert!(!store.state("b", t0).absence_timer_running());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn store_keeps_reference_per_session() {
        let t0 = Instant::now();
        let mut store = SessionStore::default();

        store
            .state("a", t0)
            .set_reference(FaceEncoding::new(vec![1.0; 4]));
        assert!(store.state("a", t0).reference().is_some());
        assert!(store.state("b", t0).reference().is_none());
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let t0 = Instant::now();
        let mut store = SessionStore::new(Duration::from_secs(30));

        store
            .state("stale", t0)
            .set_reference(FaceEncoding::new(vec![1.0; 4]));
        let later = t0 + Duration::from_secs(31);
        store.state("fresh", later);

        assert_eq!(store.len(), 1);
        assert!(store.state("stale", later).reference().is_none());
    }
}
