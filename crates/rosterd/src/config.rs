use roster_core::{threshold_from_confidence, ConfirmationPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid camera list entry: {0:?}")]
    CameraEntry(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One camera worker: a stable id plus the V4L2 device it reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub device: String,
}

/// Which message bus the control interface registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    Session,
    None,
}

impl FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "session" => Ok(Self::Session),
            "none" | "off" => Ok(Self::None),
            other => Err(ConfigError::Invalid(format!("unknown bus {other:?}"))),
        }
    }
}

/// Daemon configuration.
///
/// Layered as defaults, then an optional TOML file, then `ROSTER_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cameras: Vec<CameraConfig>,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Extractor sidecar command line (program followed by arguments).
    pub extractor_command: Vec<String>,
    /// Minimum match confidence in [0, 1]; the distance threshold is `1 - confidence`.
    pub confidence_threshold: f32,
    /// Consecutive matching frames needed to confirm an identity.
    pub frames_required: u32,
    /// Quiet period after a confirmation before the same identity may confirm again.
    pub cooldown_secs: u64,
    pub gallery_refresh_interval_secs: u64,
    /// Expected embedding dimension; 0 accepts any.
    pub embedding_dim: usize,
    /// Consecutive capture failures after which a worker gives up.
    pub max_capture_failures: u32,
    pub dark_frame_ratio: f32,
    /// Number of recent events kept for the control interface.
    pub event_history: usize,
    pub dbus_bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cameras: vec![CameraConfig {
                id: "cam0".to_string(),
                device: "/dev/video0".to_string(),
            }],
            db_path: roster_store::default_db_path(),
            extractor_command: vec!["roster-extractor".to_string()],
            confidence_threshold: 0.6,
            frames_required: 5,
            cooldown_secs: 0,
            gallery_refresh_interval_secs: 5,
            embedding_dim: 128,
            max_capture_failures: 10,
            dark_frame_ratio: roster_hw::frame::DEFAULT_DARK_RATIO,
            event_history: 256,
            dbus_bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load the full configuration stack from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = match config_file_path(&env) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `ROSTER_*` overrides read through `get`.
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = get("ROSTER_CAMERAS") {
            self.cameras = parse_cameras(&list)?;
        }
        if let Some(path) = get("ROSTER_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(cmd) = get("ROSTER_EXTRACTOR_CMD") {
            self.extractor_command = cmd.split_whitespace().map(str::to_string).collect();
        }
        if let Some(bus) = get("ROSTER_DBUS_BUS") {
            self.dbus_bus = bus.parse()?;
        }

        self.confidence_threshold = env_parse(&get, "ROSTER_CONFIDENCE_THRESHOLD", self.confidence_threshold);
        self.frames_required = env_parse(&get, "ROSTER_FRAMES_REQUIRED", self.frames_required);
        self.cooldown_secs = env_parse(&get, "ROSTER_COOLDOWN_SECS", self.cooldown_secs);
        self.gallery_refresh_interval_secs = env_parse(
            &get,
            "ROSTER_GALLERY_REFRESH_SECS",
            self.gallery_refresh_interval_secs,
        );
        self.embedding_dim = env_parse(&get, "ROSTER_EMBEDDING_DIM", self.embedding_dim);
        self.max_capture_failures =
            env_parse(&get, "ROSTER_MAX_CAPTURE_FAILURES", self.max_capture_failures);
        self.dark_frame_ratio = env_parse(&get, "ROSTER_DARK_FRAME_RATIO", self.dark_frame_ratio);
        self.event_history = env_parse(&get, "ROSTER_EVENT_HISTORY", self.event_history);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.frames_required == 0 {
            return Err(ConfigError::Invalid("frames_required must be at least 1".into()));
        }
        if self.gallery_refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "gallery_refresh_interval_secs must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dark_frame_ratio) {
            return Err(ConfigError::Invalid(format!(
                "dark_frame_ratio must be within [0, 1], got {}",
                self.dark_frame_ratio
            )));
        }
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() || camera.device.trim().is_empty() {
                return Err(ConfigError::CameraEntry(format!("{}={}", camera.id, camera.device)));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate camera id {:?}", camera.id)));
            }
        }
        if self.extractor_command.is_empty() {
            return Err(ConfigError::Invalid("extractor_command is empty".into()));
        }
        Ok(())
    }

    /// Euclidean distance threshold derived from `confidence_threshold`.
    pub fn distance_threshold(&self) -> f32 {
        threshold_from_confidence(self.confidence_threshold)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            frames_required: self.frames_required,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.gallery_refresh_interval_secs)
    }

    pub fn expected_dim(&self) -> Option<usize> {
        (self.embedding_dim > 0).then_some(self.embedding_dim)
    }
}

/// Parse `cam0=/dev/video0,cam1=/dev/video2`. Bare device paths get ids
/// `cam<index>`.
pub fn parse_cameras(list: &str) -> Result<Vec<CameraConfig>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| match entry.split_once('=') {
            Some((id, device)) if !id.trim().is_empty() && !device.trim().is_empty() => {
                Ok(CameraConfig {
                    id: id.trim().to_string(),
                    device: device.trim().to_string(),
                })
            }
            Some(_) => Err(ConfigError::CameraEntry(entry.to_string())),
            None => Ok(CameraConfig {
                id: format!("cam{index}"),
                device: entry.to_string(),
            }),
        })
        .collect()
}

/// `ROSTER_CONFIG`, else `$XDG_CONFIG_HOME/roster/rosterd.toml` when present.
fn config_file_path<F>(get: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = get("ROSTER_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let base = get("XDG_CONFIG_HOME").map(PathBuf::from).or_else(|| {
        get("HOME").map(|home| PathBuf::from(home).join(".config"))
    })?;
    let path = base.join("roster").join("rosterd.toml");
    path.exists().then_some(path)
}

fn env_parse<T, F>(get: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            default
        }),
        None => default,
    }
}
