//! Events produced by the recognition runtime for UI and telemetry consumers.

use crate::attendance::PeriodKey;
use crate::store::CommitOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RosterEvent {
    FaceDetected {
        camera_id: String,
        faces: usize,
    },
    IdentityConfirmed {
        camera_id: String,
        identity_id: String,
        display_name: String,
        confidence: f32,
    },
    AttendanceCommitted {
        camera_id: String,
        identity_id: String,
        period_key: PeriodKey,
        outcome: CommitOutcome,
    },
}

impl RosterEvent {
    pub fn camera_id(&self) -> &str {
        match self {
            RosterEvent::FaceDetected { camera_id, .. }
            | RosterEvent::IdentityConfirmed { camera_id, .. }
            | RosterEvent::AttendanceCommitted { camera_id, .. } => camera_id,
        }
    }
}

/// Receives events from camera workers. Must not block for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RosterEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = RosterEvent::AttendanceCommitted {
            camera_id: "cam0".into(),
            identity_id: "a1".into(),
            period_key: PeriodKey::parse("2024-01-01").unwrap(),
            outcome: CommitOutcome::AlreadyPresent,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "attendance_committed");
        assert_eq!(json["period_key"], "2024-01-01");
        assert_eq!(json["outcome"], "already_present");
        assert_eq!(event.camera_id(), "cam0");
    }
}
