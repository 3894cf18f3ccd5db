use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::store::ClaimPolicy;

/// Directory layout the daemon works against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folders {
    /// Library roots scanned for media files
    pub include: Vec<PathBuf>,
    /// Directories skipped during the scan
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
    /// Where originals are backed up before replacement
    pub backup: PathBuf,
    /// Worker-local scratch area for in-progress transcodes
    pub scratch: PathBuf,
}

/// When to scan and when conversions may run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Fixed UTC offset of the schedule, e.g. "+01:00"
    pub timezone: String,
    /// Minutes between catalog reconciliation passes
    pub scan_interval_minutes: u64,
    /// Optional fixed daily scan time "HH:MM"; overrides the interval when set
    #[serde(default)]
    pub scan_time: Option<String>,
    /// Daily conversion window start, "HH:MM" local to `timezone`
    pub start_conversion: String,
    /// Daily conversion window end, "HH:MM" local to `timezone`
    pub end_conversion: String,
}

impl Schedule {
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.timezone
            .parse()
            .with_context(|| format!("invalid timezone offset: {}", self.timezone))
    }

    pub fn daily_scan_time(&self) -> Result<Option<NaiveTime>> {
        self.scan_time
            .as_deref()
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M")
                    .with_context(|| format!("invalid scan_time: {s}"))
            })
            .transpose()
    }

    pub fn conversion_window(&self) -> Result<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.start_conversion, "%H:%M")
            .with_context(|| format!("invalid start_conversion time: {}", self.start_conversion))?;
        let end = NaiveTime::parse_from_str(&self.end_conversion, "%H:%M")
            .with_context(|| format!("invalid end_conversion time: {}", self.end_conversion))?;
        Ok((start, end))
    }
}

fn default_stale_claim_hours() -> u64 {
    12
}

/// Claim-selection policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Restrict claiming to paths under this prefix
    #[serde(default)]
    pub path_filter: Option<String>,
    /// Claim the smallest file first instead of the highest bit rate
    #[serde(default)]
    pub prefer_smallest: bool,
    /// Claims older than this are treated as abandoned and released
    #[serde(default = "default_stale_claim_hours")]
    pub stale_claim_hours: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            path_filter: None,
            prefer_smallest: false,
            stale_claim_hours: default_stale_claim_hours(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_bin() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Configuration for the conversion daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    pub folders: Folders,
    pub schedule: Schedule,
    #[serde(default)]
    pub policy: Policy,
    /// Shared catalog database; all cooperating workers point at the same file
    pub store_path: PathBuf,
    /// Only the main worker reconciles the catalog; every worker converts
    #[serde(default = "default_true")]
    pub main_worker: bool,
    /// Stable worker identity; falls back to $WORKER_NAME, then a generated name
    #[serde(default)]
    pub worker_name: Option<String>,
    /// Webhook for push notifications; unset disables them
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: PathBuf,
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: PathBuf,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConvertConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        ConvertConfig {
            folders: Folders {
                include: vec![PathBuf::from("/media")],
                exclude: vec![],
                backup: PathBuf::from("/media/.hevcd-backup"),
                scratch: PathBuf::from("/tmp/hevcd-work"),
            },
            schedule: Schedule {
                timezone: "+00:00".to_string(),
                scan_interval_minutes: 10,
                scan_time: None,
                start_conversion: "00:00".to_string(),
                end_conversion: "23:59".to_string(),
            },
            policy: Policy::default(),
            store_path: PathBuf::from("/media/.hevcd/catalog.db"),
            main_worker: true,
            worker_name: None,
            notify_url: None,
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or
    /// the file doesn't exist.
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path).with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content).with_context(|| {
                        format!("Failed to parse TOML config: {}", config_path.display())
                    })?;
                } else {
                    config = serde_json::from_str(&content).with_context(|| {
                        format!("Failed to parse JSON config: {}", config_path.display())
                    })?;
                }
            }
        }

        Ok(config)
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.folders.include.is_empty() {
            bail!("at least one include folder is required");
        }
        self.schedule.utc_offset()?;
        self.schedule.daily_scan_time()?;
        let (start, end) = self.schedule.conversion_window()?;
        if start == end {
            bail!("conversion window start and end must differ");
        }
        if self.policy.stale_claim_hours == 0 {
            bail!("stale_claim_hours must be at least 1");
        }
        Ok(())
    }

    /// Resolve this process's worker identity: explicit config, then the
    /// WORKER_NAME environment variable, then a generated name.
    pub fn resolve_worker_name(&self) -> String {
        if let Some(name) = &self.worker_name {
            return name.clone();
        }
        if let Ok(name) = std::env::var("WORKER_NAME") {
            if !name.is_empty() {
                return name;
            }
        }
        format!("worker-{}", uuid::Uuid::new_v4().simple())
    }

    pub fn claim_policy(&self) -> ClaimPolicy {
        ClaimPolicy {
            prefer_smallest: self.policy.prefer_smallest,
            path_prefix: self.policy.path_filter.clone(),
        }
    }
}
