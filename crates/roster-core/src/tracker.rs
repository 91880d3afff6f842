//! Per-camera confirmation debounce.
//!
//! Each (camera, identity) pair moves through
//! `absent → accumulating → confirmed → cooling_down → absent`.
//! `confirmed` is instantaneous: it is reported as a [`Confirmation`] and the
//! state moves straight to cooling down. A single frame in which the
//! identity is not matched drops accumulated progress back to zero.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Debounce settings for one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Consecutive matched frames needed to confirm. Values below 1 act as 1.
    pub frames_required: u32,
    /// Quiet period after a confirmation. Zero disables it; a period that
    /// runs past the clock's range never ends.
    pub cooldown: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            frames_required: 5,
            cooldown: Duration::ZERO,
        }
    }
}

/// Observable state of one identity on this camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Accumulating { frames: u32 },
    CoolingDown { remaining: Duration },
}

/// An identity matched in the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMatch {
    pub identity_id: String,
    pub display_name: String,
    pub confidence: f32,
}

/// Emitted once when an identity has been matched for enough consecutive frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub camera_id: String,
    pub identity_id: String,
    pub display_name: String,
    /// Confidence of the frame that completed the streak.
    pub confidence: f32,
    pub frames: u32,
    pub confirmed_at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Accumulating,
    /// `None` cools down forever.
    CoolingDown { until: Option<Instant> },
}

fn still_cooling(until: Option<Instant>, now: Instant) -> bool {
    until.map_or(true, |until| now < until)
}

#[derive(Debug, Clone)]
struct ConfirmationState {
    stage: Stage,
    consecutive_frames: u32,
    last_seen: Instant,
    last_confirmed: Option<Instant>,
}

impl ConfirmationState {
    fn fresh(now: Instant, last_confirmed: Option<Instant>) -> Self {
        Self {
            stage: Stage::Accumulating,
            consecutive_frames: 0,
            last_seen: now,
            last_confirmed,
        }
    }
}

/// Confirmation state for every identity seen by one camera.
///
/// Owned by a single camera worker; needs no synchronization.
#[derive(Debug)]
pub struct ConfirmationTracker {
    camera_id: String,
    policy: ConfirmationPolicy,
    states: HashMap<String, ConfirmationState>,
}

impl ConfirmationTracker {
    pub fn new(camera_id: impl Into<String>, policy: ConfirmationPolicy) -> Self {
        Self {
            camera_id: camera_id.into(),
            policy,
            states: HashMap::new(),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Feed the identities matched in one frame.
    ///
    /// Identities absent from `matches` lose any accumulated progress. A frame
    /// with no faces, or only unknown faces, is an empty `matches` slice.
    /// Returns the confirmations completed by this frame, in match order.
    pub fn observe(&mut self, matches: &[FrameMatch], now: Instant) -> Vec<Confirmation> {
        let frame = dedup_by_identity(matches);

        self.states.retain(|identity_id, state| {
            if frame.iter().any(|m| &m.identity_id == identity_id) {
                return true;
            }
            match state.stage {
                Stage::Accumulating => false,
                Stage::CoolingDown { until } => still_cooling(until, now),
            }
        });

        let frames_required = self.policy.frames_required.max(1);
        let mut confirmations = Vec::new();

        for m in frame {
            let state = self
                .states
                .entry(m.identity_id.clone())
                .or_insert_with(|| ConfirmationState::fresh(now, None));
            state.last_seen = now;

            if let Stage::CoolingDown { until } = state.stage {
                if still_cooling(until, now) {
                    continue;
                }
                *state = ConfirmationState::fresh(now, state.last_confirmed);
            }

            state.consecutive_frames += 1;
            if state.consecutive_frames < frames_required {
                continue;
            }

            tracing::debug!(
                camera = %self.camera_id,
                identity = %m.identity_id,
                frames = state.consecutive_frames,
                "identity confirmed"
            );
            confirmations.push(Confirmation {
                camera_id: self.camera_id.clone(),
                identity_id: m.identity_id.clone(),
                display_name: m.display_name.clone(),
                confidence: m.confidence,
                frames: state.consecutive_frames,
                confirmed_at: now,
            });
            state.last_confirmed = Some(now);
            state.consecutive_frames = 0;
            state.stage = Stage::CoolingDown {
                until: now.checked_add(self.policy.cooldown),
            };
        }

        confirmations
    }

    /// Current phase of `identity_id` as of `now`.
    pub fn phase(&self, identity_id: &str, now: Instant) -> Phase {
        match self.states.get(identity_id) {
            None => Phase::Absent,
            Some(state) => match state.stage {
                Stage::Accumulating => Phase::Accumulating {
                    frames: state.consecutive_frames,
                },
                Stage::CoolingDown { until } if still_cooling(until, now) => Phase::CoolingDown {
                    remaining: until.map_or(Duration::MAX, |until| until - now),
                },
                Stage::CoolingDown { .. } => Phase::Absent,
            },
        }
    }

    /// When `identity_id` was last confirmed on this camera, if still tracked.
    pub fn last_confirmed(&self, identity_id: &str) -> Option<Instant> {
        self.states.get(identity_id).and_then(|s| s.last_confirmed)
    }

    /// Number of identities with live state (accumulating or cooling down).
    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

/// Collapse repeated identities within one frame, keeping the most confident.
fn dedup_by_identity(matches: &[FrameMatch]) -> Vec<&FrameMatch> {
    let mut out: Vec<&FrameMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        match out.iter_mut().find(|kept| kept.identity_id == m.identity_id) {
            Some(kept) if m.confidence > kept.confidence => *kept = m,
            Some(_) => {}
            None => out.push(m),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, confidence: f32) -> FrameMatch {
        FrameMatch {
            identity_id: id.into(),
            display_name: id.to_uppercase(),
            confidence,
        }
    }

    fn tracker(frames_required: u32, cooldown_secs: u64) -> ConfirmationTracker {
        ConfirmationTracker::new(
            "cam0",
            ConfirmationPolicy {
                frames_required,
                cooldown: Duration::from_secs(cooldown_secs),
            },
        )
    }

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_n_consecutive_matches_confirm_once() {
        let mut t = tracker(5, 0);
        let base = Instant::now();
        let mut confirmed = Vec::new();
        for i in 0..5 {
            confirmed.extend(t.observe(&[hit("x", 0.8)], at(base, i * 100)));
        }
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].identity_id, "x");
        assert_eq!(confirmed[0].camera_id, "cam0");
        assert_eq!(confirmed[0].frames, 5);
    }

    #[test]
    fn test_miss_before_threshold_resets() {
        let mut t = tracker(5, 0);
        let base = Instant::now();
        for i in 0..4 {
            assert!(t.observe(&[hit("x", 0.8)], at(base, i * 100)).is_empty());
        }
        assert_eq!(t.phase("x", at(base, 350)), Phase::Accumulating { frames: 4 });

        assert!(t.observe(&[hit("y", 0.9)], at(base, 400)).is_empty());
        assert_eq!(t.phase("x", at(base, 400)), Phase::Absent);

        // Progress restarts from one.
        assert!(t.observe(&[hit("x", 0.8)], at(base, 500)).is_empty());
        assert_eq!(t.phase("x", at(base, 500)), Phase::Accumulating { frames: 1 });
    }

    #[test]
    fn test_no_face_frame_resets_everything() {
        // [A, A, <no face>, A, A, A] with three frames required.
        let mut t = tracker(3, 0);
        let base = Instant::now();
        let frames: Vec<Vec<FrameMatch>> = vec![
            vec![hit("alice", 0.7)],
            vec![hit("alice", 0.7)],
            vec![],
            vec![hit("alice", 0.7)],
            vec![hit("alice", 0.7)],
            vec![hit("alice", 0.7)],
        ];

        let mut fired_at = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            if !t.observe(frame, at(base, i as u64 * 100)).is_empty() {
                fired_at.push(i);
            }
        }
        assert_eq!(fired_at, vec![5]);
    }

    #[test]
    fn test_cooldown_suppresses_reconfirmation() {
        let mut t = tracker(2, 10);
        let base = Instant::now();

        assert!(t.observe(&[hit("x", 0.8)], at(base, 0)).is_empty());
        assert_eq!(t.observe(&[hit("x", 0.8)], at(base, 1_000)).len(), 1);

        // Still in view for the whole cooldown: nothing fires.
        for s in 2..=10 {
            assert!(t.observe(&[hit("x", 0.8)], at(base, s * 1_000)).is_empty());
        }
        assert!(matches!(
            t.phase("x", at(base, 10_500)),
            Phase::CoolingDown { .. }
        ));

        // Cooldown elapsed at 11s: tracking resumes fresh.
        assert!(t.observe(&[hit("x", 0.8)], at(base, 11_000)).is_empty());
        assert_eq!(t.phase("x", at(base, 11_000)), Phase::Accumulating { frames: 1 });
        assert_eq!(t.observe(&[hit("x", 0.8)], at(base, 11_100)).len(), 1);
    }

    #[test]
    fn test_cooldown_survives_leaving_the_frame() {
        let mut t = tracker(1, 30);
        let base = Instant::now();

        assert_eq!(t.observe(&[hit("x", 0.8)], at(base, 0)).len(), 1);
        t.observe(&[], at(base, 1_000));
        assert!(t.observe(&[hit("x", 0.8)], at(base, 2_000)).is_empty());
        assert_eq!(t.last_confirmed("x"), Some(at(base, 0)));

        // Expired cooldown entries are dropped once the identity is gone.
        t.observe(&[], at(base, 31_000));
        assert_eq!(t.tracked(), 0);
        assert_eq!(t.observe(&[hit("x", 0.8)], at(base, 32_000)).len(), 1);
    }

    #[test]
    fn test_zero_cooldown_restarts_accumulation() {
        let mut t = tracker(2, 0);
        let base = Instant::now();
        let mut fired = 0;
        for i in 0..6 {
            fired += t.observe(&[hit("x", 0.8)], at(base, i * 100)).len();
        }
        assert_eq!(fired, 3);
    }

    #[test]
    fn test_identities_tracked_independently() {
        let mut t = tracker(2, 0);
        let base = Instant::now();

        assert!(t.observe(&[hit("a", 0.9), hit("b", 0.8)], at(base, 0)).is_empty());
        let confirmed = t.observe(&[hit("b", 0.8), hit("a", 0.9)], at(base, 100));
        let ids: Vec<&str> = confirmed.iter().map(|c| c.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        // Only `a` stays in view; `b` resets without affecting `a`.
        t.observe(&[hit("a", 0.9)], at(base, 200));
        assert_eq!(t.phase("b", at(base, 200)), Phase::Absent);
        assert_eq!(t.phase("a", at(base, 200)), Phase::Accumulating { frames: 1 });
    }

    #[test]
    fn test_duplicate_identity_in_one_frame_counts_once() {
        let mut t = tracker(3, 0);
        let base = Instant::now();

        t.observe(&[hit("x", 0.6), hit("x", 0.9)], at(base, 0));
        assert_eq!(t.phase("x", at(base, 0)), Phase::Accumulating { frames: 1 });

        t.observe(&[hit("x", 0.7)], at(base, 100));
        let confirmed = t.observe(&[hit("x", 0.65), hit("x", 0.95)], at(base, 200));
        assert_eq!(confirmed.len(), 1);
        assert!((confirmed[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_frames_required_zero_behaves_as_one() {
        let mut t = tracker(0, 0);
        assert_eq!(t.observe(&[hit("x", 0.8)], Instant::now()).len(), 1);
    }

    #[test]
    fn test_unbounded_cooldown_never_expires() {
        let mut t = tracker(1, u64::MAX);
        let base = Instant::now();

        assert_eq!(t.observe(&[hit("x", 0.8)], base).len(), 1);
        assert_eq!(
            t.phase("x", at(base, 1_000)),
            Phase::CoolingDown { remaining: Duration::MAX }
        );
        t.observe(&[], at(base, 2_000));
        assert!(t.observe(&[hit("x", 0.8)], at(base, 3_000)).is_empty());
        assert_eq!(t.tracked(), 1);
    }
}
