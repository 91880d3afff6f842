use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roster_core::{Embedding, PeriodKey};
use roster_hw::Camera;
use roster_store::SqliteStore;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

mod daemon;
mod export;

#[derive(Parser)]
#[command(name = "roster", about = "Roster camera attendance CLI")]
struct Cli {
    /// Database path (default: $ROSTER_DB_PATH or $XDG_DATA_HOME/roster/roster.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Bus the daemon listens on: session or system (default: $ROSTER_DBUS_BUS or session)
    #[arg(long, global = true)]
    bus: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from a precomputed embedding
    Enroll {
        /// Display name shown in events and reports
        #[arg(short, long)]
        name: Option<String>,
        /// Identity id (default: random UUID)
        #[arg(long)]
        id: Option<String>,
        /// JSON file holding the embedding as an array of numbers ("-" for stdin)
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// List enrolled identities
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove an enrolled identity
    Remove {
        /// Identity id to remove
        id: String,
    },
    /// Show attendance for one day
    Attendance {
        /// Day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Export attendance for a range of days as CSV
    Export {
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Mark everyone without a record as absent for a day
    Finalize {
        /// Day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show daemon status
    Status,
    /// Ask the daemon to reload the gallery now
    Refresh,
    /// Show recent daemon events
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// List V4L2 capture devices
    Cameras,
    /// Capture a few frames directly from a camera (bypasses the daemon)
    Test {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        #[arg(short, long, default_value_t = 5)]
        frames: u32,
    },
}

/// Embedding file contents: a bare array or `{"embedding": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingFile {
    Bare(Vec<f32>),
    Wrapped { embedding: Vec<f32> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bus = cli
        .bus
        .clone()
        .or_else(|| std::env::var("ROSTER_DBUS_BUS").ok())
        .unwrap_or_else(|| "session".to_string());

    match cli.command {
        Commands::Enroll {
            name,
            id,
            embedding,
        } => {
            let values = read_embedding(&embedding)?;
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let store = open_store(cli.db.as_deref())?;
            store
                .enroll_identity(&id, name.as_deref(), &Embedding::new(values))
                .with_context(|| format!("failed to enroll {id}"))?;
            println!("Enrolled {id}");
            daemon::notify_refresh(&bus).await;
        }
        Commands::List { json } => {
            let store = open_store(cli.db.as_deref())?;
            let identities = store.identity_summaries()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&identities)?);
            } else if identities.is_empty() {
                println!("No identities enrolled");
            } else {
                println!("{:<38} {:<24} {:>5}  ENROLLED", "ID", "NAME", "DIM");
                for identity in identities {
                    println!(
                        "{:<38} {:<24} {:>5}  {}",
                        identity.id,
                        identity.display_name.as_deref().unwrap_or("-"),
                        identity.dim,
                        identity.created_at
                    );
                }
            }
        }
        Commands::Remove { id } => {
            let store = open_store(cli.db.as_deref())?;
            if !store.remove_identity(&id)? {
                bail!("no identity with id {id}");
            }
            println!("Removed {id}");
            daemon::notify_refresh(&bus).await;
        }
        Commands::Attendance { date } => {
            let period = period_arg(date.as_deref())?;
            let store = open_store(cli.db.as_deref())?;
            let records = store.records_for_period(&period)?;
            println!("Attendance for {period}: {} present", records.len());
            for record in &records {
                println!("  {}  {}", record.committed_at.to_rfc3339(), record.identity_id);
            }
            let absent = store.absentees(&period)?;
            if !absent.is_empty() {
                println!("Absent: {}", absent.len());
                for id in absent {
                    println!("  {id}");
                }
            }
        }
        Commands::Export { from, to, output } => {
            let from = PeriodKey::parse(&from).with_context(|| format!("invalid --from date {from:?}"))?;
            let to = PeriodKey::parse(&to).with_context(|| format!("invalid --to date {to:?}"))?;
            if from > to {
                bail!("--from {from} is after --to {to}");
            }
            let store = open_store(cli.db.as_deref())?;
            let rows = store.export_range(&from, &to)?;
            match output {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    export::write_csv(&mut file, &rows)?;
                    eprintln!("Wrote {} rows to {}", rows.len(), path.display());
                }
                None => export::write_csv(&mut std::io::stdout().lock(), &rows)?,
            }
        }
        Commands::Finalize { date } => {
            let period = period_arg(date.as_deref())?;
            let store = open_store(cli.db.as_deref())?;
            let report = store.finalize_period(&period)?;
            println!(
                "Finalized {period}: {} enrolled, {} marked absent",
                report.total, report.marked_absent
            );
        }
        Commands::Status => {
            let proxy = daemon::connect(&bus).await?;
            let status = proxy.status().await.context("Status call failed")?;
            let value: serde_json::Value = serde_json::from_str(&status)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Refresh => {
            let proxy = daemon::connect(&bus).await?;
            proxy
                .refresh_gallery()
                .await
                .context("RefreshGallery call failed")?;
            println!("Gallery refresh requested");
        }
        Commands::Events { limit } => {
            let proxy = daemon::connect(&bus).await?;
            let events = proxy
                .recent_events(limit)
                .await
                .context("RecentEvents call failed")?;
            let value: serde_json::Value = serde_json::from_str(&events)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Cameras => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
        }
        Commands::Test { device, frames } => {
            let mut camera = Camera::open(&device, roster_hw::frame::DEFAULT_DARK_RATIO)
                .with_context(|| format!("cannot open {device}"))?;
            println!("Opened {device}: {}x{} {:?}", camera.width, camera.height, camera.fourcc);
            for _ in 0..frames {
                let frame = camera.capture()?;
                println!(
                    "  frame {:>4}  brightness {:>6.1}  {}",
                    frame.sequence,
                    frame.avg_brightness(),
                    if frame.is_dark { "dark" } else { "ok" }
                );
            }
        }
    }

    Ok(())
}

fn open_store(db: Option<&Path>) -> Result<SqliteStore> {
    let path = db
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("ROSTER_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(roster_store::default_db_path);
    SqliteStore::open(&path).with_context(|| format!("cannot open database {}", path.display()))
}

fn period_arg(date: Option<&str>) -> Result<PeriodKey> {
    match date {
        Some(date) => PeriodKey::parse(date).with_context(|| format!("invalid date {date:?}, expected YYYY-MM-DD")),
        None => Ok(PeriodKey::today()),
    }
}

fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let mut text = String::new();
    if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut text)?;
    } else {
        text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
    }
    parse_embedding(&text)
}

fn parse_embedding(text: &str) -> Result<Vec<f32>> {
    let values = match serde_json::from_str(text).context("embedding must be a JSON array of numbers")? {
        EmbeddingFile::Bare(values) | EmbeddingFile::Wrapped { embedding: values } => values,
    };
    if values.is_empty() {
        bail!("embedding is empty");
    }
    Ok(values)
}
