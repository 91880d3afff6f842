use roster_core::{EventSink, RosterEvent};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Bounded in-memory history of runtime events, also written to the log.
pub struct EventLog {
    capacity: usize,
    history: Mutex<VecDeque<RosterEvent>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<RosterEvent> {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: RosterEvent) {
        match &event {
            RosterEvent::FaceDetected { camera_id, faces } => {
                tracing::debug!(camera = %camera_id, faces, "faces detected");
            }
            RosterEvent::IdentityConfirmed {
                camera_id,
                identity_id,
                display_name,
                confidence,
            } => {
                tracing::info!(
                    camera = %camera_id,
                    identity = %identity_id,
                    name = %display_name,
                    confidence,
                    "identity confirmed"
                );
            }
            RosterEvent::AttendanceCommitted {
                camera_id,
                identity_id,
                period_key,
                outcome,
            } => {
                tracing::info!(
                    camera = %camera_id,
                    identity = %identity_id,
                    period = %period_key,
                    outcome = ?outcome,
                    "attendance event"
                );
            }
        }

        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }
}
