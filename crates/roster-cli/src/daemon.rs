use anyhow::{bail, Context, Result};

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and
// `AttendanceProxyBlocking`; only the async one is used.
#[zbus::proxy(
    interface = "org.roster.Attendance1",
    default_service = "org.roster.Attendance1",
    default_path = "/org/roster/Attendance1"
)]
pub(crate) trait Attendance {
    async fn status(&self) -> zbus::Result<String>;
    async fn refresh_gallery(&self) -> zbus::Result<bool>;
    async fn recent_events(&self, limit: u32) -> zbus::Result<String>;
}

/// Connect to the daemon on `bus` ("session" or "system").
pub async fn connect(bus: &str) -> Result<AttendanceProxy<'static>> {
    let connection = match bus {
        "session" => zbus::Connection::session().await,
        "system" => zbus::Connection::system().await,
        other => bail!("unknown bus {other:?} (expected session or system)"),
    }
    .with_context(|| format!("cannot connect to the {bus} bus"))?;

    AttendanceProxy::new(&connection)
        .await
        .context("cannot reach rosterd")
}

/// Ask a running daemon to reload its gallery. Failures are reported, not fatal.
pub async fn notify_refresh(bus: &str) {
    let result = async {
        let proxy = connect(bus).await?;
        Ok::<bool, anyhow::Error>(proxy.refresh_gallery().await?)
    }
    .await;

    match result {
        Ok(_) => println!("rosterd: gallery refresh requested"),
        Err(err) => {
            tracing::debug!(error = %err, "refresh notification failed");
            println!("rosterd not reachable; it will pick up the change on its next refresh");
        }
    }
}
