use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::quality::EncodingParams;

/// One progress report from the transcode tool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Output timestamp reached so far
    pub elapsed: Duration,
    /// Encoding speed relative to realtime (1.0 = realtime)
    pub speed: f64,
}

/// Why a transcode failed. Every variant is terminal for the job but
/// non-fatal for the scheduler loop.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("invalid encoding parameter: {0}")]
    Parameter(String),
    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to read ffmpeg progress output: {0}")]
    Decode(#[source] std::io::Error),
    #[error("ffmpeg exited with code {code}: {stderr}")]
    Tool { code: i32, stderr: String },
    #[error("transcode cancelled")]
    Cancelled,
}

/// Accumulates ffmpeg `-progress` key=value lines into progress events.
///
/// ffmpeg writes blocks of `key=value` lines terminated by a `progress=`
/// line; an event is emitted per block so the caller sees a consistent
/// (elapsed, speed) pair.
#[derive(Debug, Default)]
struct ProgressParser {
    elapsed: Duration,
    speed: f64,
}

impl ProgressParser {
    fn push_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if let Some(value) = line.strip_prefix("out_time_us=") {
            if let Ok(us) = value.trim().parse::<u64>() {
                self.elapsed = Duration::from_micros(us);
            }
        } else if let Some(value) = line.strip_prefix("speed=") {
            if let Ok(speed) = value.trim().trim_end_matches('x').parse::<f64>() {
                self.speed = speed;
            }
        } else if line.starts_with("progress=") {
            return Some(ProgressEvent {
                elapsed: self.elapsed,
                speed: self.speed,
            });
        }
        None
    }
}

/// Build the ffmpeg argument list for one conversion.
///
/// Video is re-encoded to HEVC; audio and subtitle streams are copied.
/// `-progress pipe:1 -stats_period 1` surfaces structured progress on
/// stdout at most once per second.
fn build_args(input: &Path, output: &Path, params: &EncodingParams) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-stats_period".to_string(),
        "1".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
        "-map".to_string(),
        "0:s?".to_string(),
        "-c:v".to_string(),
        "libx265".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-c:s".to_string(),
        "copy".to_string(),
        "-crf".to_string(),
        params.crf.to_string(),
        "-preset".to_string(),
        params.preset.to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Run one transcode to completion, reporting progress as it goes.
///
/// Cancellation kills the ffmpeg process and returns
/// `TranscodeError::Cancelled`; the caller owns cleanup of the partial
/// output file.
pub async fn transcode(
    ffmpeg_bin: &Path,
    input: &Path,
    output: &Path,
    params: &EncodingParams,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(ProgressEvent),
) -> Result<(), TranscodeError> {
    if params.crf > 51 {
        return Err(TranscodeError::Parameter(format!(
            "crf {} out of range 0-51",
            params.crf
        )));
    }

    let args = build_args(input, output, params);
    let mut child = Command::new(ffmpeg_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(TranscodeError::Spawn)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TranscodeError::Decode(std::io::Error::other("ffmpeg stdout missing")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TranscodeError::Decode(std::io::Error::other("ffmpeg stderr missing")))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf).await;
        buf
    });

    let mut parser = ProgressParser::default();
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(TranscodeError::Cancelled);
            }
            line = lines.next_line() => {
                match line.map_err(TranscodeError::Decode)? {
                    Some(line) => {
                        if let Some(event) = parser.push_line(&line) {
                            on_progress(event);
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let status = child.wait().await.map_err(TranscodeError::Spawn)?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(TranscodeError::Tool {
            code: status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality;

    #[test]
    fn progress_parser_emits_per_block() {
        let mut parser = ProgressParser::default();
        assert!(parser.push_line("frame=100").is_none());
        assert!(parser.push_line("out_time_us=1500000").is_none());
        assert!(parser.push_line("speed=2.5x").is_none());

        let event = parser.push_line("progress=continue").unwrap();
        assert_eq!(event.elapsed, Duration::from_micros(1_500_000));
        assert_eq!(event.speed, 2.5);

        // Values persist between blocks until overwritten.
        let event = parser.push_line("progress=end").unwrap();
        assert_eq!(event.elapsed, Duration::from_micros(1_500_000));
    }

    #[test]
    fn progress_parser_tolerates_na_values() {
        let mut parser = ProgressParser::default();
        parser.push_line("out_time_us=N/A");
        parser.push_line("speed=N/A");
        let event = parser.push_line("progress=continue").unwrap();
        assert_eq!(event.elapsed, Duration::ZERO);
        assert_eq!(event.speed, 0.0);
    }

    #[test]
    fn args_encode_video_and_copy_the_rest() {
        let params = quality::params_for_source(Some(1080));
        let args = build_args(
            Path::new("/scratch/in.mkv"),
            Path::new("/scratch/out.hevc.mkv"),
            &params,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx265"));
        assert!(joined.contains("-c:a copy"));
        assert!(joined.contains("-c:s copy"));
        assert!(joined.contains("-crf 28"));
        assert!(joined.contains("-preset medium"));
        assert!(joined.contains("-progress pipe:1"));
        assert_eq!(args.last().unwrap(), "/scratch/out.hevc.mkv");
    }

    #[tokio::test]
    async fn out_of_range_crf_is_a_parameter_error() {
        let params = EncodingParams {
            crf: 99,
            preset: "medium",
        };
        let err = transcode(
            Path::new("ffmpeg"),
            Path::new("/nope/in.mkv"),
            Path::new("/nope/out.mkv"),
            &params,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranscodeError::Parameter(_)));
    }
}
