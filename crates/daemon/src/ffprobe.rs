use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Why probing a single file failed.
///
/// A probe failure is always scoped to one file: the caller logs it, skips
/// the record and retries on the next reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe for {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ffprobe exited with code {code} for {path}: {stderr}")]
    Tool {
        path: String,
        code: i32,
        stderr: String,
    },
    #[error("unparsable ffprobe output for {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parsed ffprobe output: the streams array plus container-level format data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeData {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: ProbeFormat,
}

impl ProbeData {
    /// Conversion policy: a file needs converting unless one of its streams
    /// is already HEVC.
    pub fn needs_conversion(&self) -> bool {
        !self
            .streams
            .iter()
            .any(|s| s.codec_name.as_deref() == Some("hevc"))
    }

    /// Height of the first video stream, when known.
    pub fn video_height(&self) -> Option<i64> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .and_then(|s| s.height)
    }
}

/// One entry of the ffprobe streams array. ffprobe reports numeric fields
/// like bit_rate as JSON strings, so they stay strings here and are parsed
/// on access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeStream {
    pub index: u32,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

impl ProbeStream {
    /// Language tag of the stream ("eng", "und", ...).
    pub fn language(&self) -> Option<&str> {
        self.tags
            .as_ref()
            .and_then(|t| t.get("language"))
            .map(|s| s.as_str())
    }

    pub fn bit_rate_bps(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|s| s.parse().ok())
    }

    #[cfg(test)]
    pub fn test_stream(index: u32, codec_type: &str, codec_name: &str) -> Self {
        ProbeStream {
            index,
            codec_type: Some(codec_type.to_string()),
            codec_name: Some(codec_name.to_string()),
            width: None,
            height: None,
            bit_rate: None,
            tags: None,
        }
    }

    #[cfg(test)]
    pub fn set_language(&mut self, language: &str) {
        self.tags
            .get_or_insert_with(HashMap::new)
            .insert("language".to_string(), language.to_string());
    }
}

/// Container-level metadata from ffprobe's format object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

impl ProbeFormat {
    /// Container duration in seconds, 0.0 when ffprobe did not report one.
    pub fn duration_secs(&self) -> f64 {
        self.duration
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn bit_rate_bps(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|s| s.parse().ok())
    }

    #[cfg(test)]
    pub fn test_format(duration_secs: f64, bit_rate: Option<u64>) -> Self {
        ProbeFormat {
            duration: Some(format!("{duration_secs:.6}")),
            bit_rate: bit_rate.map(|b| b.to_string()),
            size: None,
        }
    }
}

/// Run ffprobe against a file and parse its JSON output.
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<ProbeData, ProbeError> {
    let path = file_path.display().to_string();

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(file_path)
        .output()
        .await
        .map_err(|source| ProbeError::Spawn {
            path: path.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProbeError::Tool {
            path,
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|source| ProbeError::Parse { path, source })
}
