use crate::config::BusKind;
use crate::events::EventLog;
use crate::supervisor::SupervisorHandle;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.roster.Attendance1";
pub const OBJECT_PATH: &str = "/org/roster/Attendance1";

/// Upper bound on events returned by one `RecentEvents` call.
const MAX_RECENT_EVENTS: u32 = 1024;

/// D-Bus control interface for the attendance daemon.
///
/// Bus name: org.roster.Attendance1
/// Object path: /org/roster/Attendance1
pub struct RosterService {
    supervisor: SupervisorHandle,
    events: Arc<EventLog>,
}

impl RosterService {
    pub fn new(supervisor: SupervisorHandle, events: Arc<EventLog>) -> Self {
        Self { supervisor, events }
    }
}

#[interface(name = "org.roster.Attendance1")]
impl RosterService {
    /// Gallery and per-camera status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.supervisor.status())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Reload the gallery now. Returns once the request is queued.
    async fn refresh_gallery(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("gallery refresh requested over D-Bus");
        self.supervisor.request_refresh();
        Ok(true)
    }

    /// Most recent runtime events as a JSON array, oldest first.
    async fn recent_events(&self, limit: u32) -> zbus::fdo::Result<String> {
        let limit = limit.min(MAX_RECENT_EVENTS) as usize;
        serde_json::to_string(&self.events.recent(limit))
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}

/// Register the service on the configured bus. `BusKind::None` skips D-Bus.
pub async fn serve(bus: BusKind, service: RosterService) -> zbus::Result<Option<zbus::Connection>> {
    let builder = match bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::None => return Ok(None),
    };
    let connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;
    tracing::info!(bus = ?bus, name = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");
    Ok(Some(connection))
}
