use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use humansize::{format_size, BINARY};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::ConvertConfig;
use crate::ffmpeg::{self, ProgressEvent, TranscodeError};
use crate::notify::Notifier;
use crate::quality;
use crate::store::{CatalogStore, ClaimPolicy, StoreResult};

/// What a single `convert()` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// No eligible record in the backlog
    Idle,
    /// Transcode finished and the original was swapped for the smaller output
    Converted(String),
    /// Transcode finished but the output was not smaller; original kept
    NoReduction(String),
    /// Job abandoned without an error flag (source vanished, scratch copy
    /// failed); the claim was released for a later retry
    Aborted(String),
    /// Terminal failure: claim released and the record flagged with an error
    Failed(String),
    /// Shutdown arrived mid-job; claim released, everything cleaned up
    Cancelled,
}

/// Computes persisted progress values from raw transcode events.
///
/// Enforces the two persistence rules: percent is monotone non-decreasing
/// for the lifetime of one conversion, and writes are spaced at least
/// `min_interval` apart.
struct ProgressTracker {
    duration_secs: f64,
    min_interval: Duration,
    last_percent: f64,
    last_persist: Option<Instant>,
}

impl ProgressTracker {
    fn new(duration_secs: f64) -> Self {
        ProgressTracker {
            duration_secs,
            min_interval: Duration::from_secs(1),
            last_percent: 0.0,
            last_persist: None,
        }
    }

    fn observe(&mut self, event: ProgressEvent) -> Option<(f64, f64)> {
        let percent = if self.duration_secs > 0.0 {
            (event.elapsed.as_secs_f64() / self.duration_secs * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        if percent < self.last_percent {
            return None;
        }
        if let Some(last) = self.last_persist {
            if last.elapsed() < self.min_interval {
                return None;
            }
        }

        self.last_percent = percent;
        self.last_persist = Some(Instant::now());
        Some((percent, event.speed))
    }
}

fn scratch_source_path(scratch_dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    scratch_dir.join(name)
}

fn scratch_output_path(scratch_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    scratch_dir.join(format!("{stem}.hevc.mkv"))
}

/// Put a recoverable copy of the original into the backup location.
///
/// Hard-link first (free on the same filesystem), full copy as the
/// cross-device fallback. A partial copy is removed so a failed backup
/// leaves nothing misleading behind.
fn backup_original(original: &Path, backup: &Path) -> std::io::Result<()> {
    if backup.exists() {
        std::fs::remove_file(backup)?;
    }
    if std::fs::hard_link(original, backup).is_ok() {
        return Ok(());
    }
    match std::fs::copy(original, backup) {
        Ok(_) => Ok(()),
        Err(e) => {
            std::fs::remove_file(backup).ok();
            Err(e)
        }
    }
}

/// Swap the transcoded output into the original's path.
///
/// Rename is atomic when scratch and library share a filesystem; otherwise
/// fall back to copy-then-delete. Only called after `backup_original`
/// succeeded, so a failure here never loses data.
fn replace_original(original: &Path, scratch_output: &Path) -> std::io::Result<()> {
    if std::fs::rename(scratch_output, original).is_ok() {
        return Ok(());
    }
    std::fs::copy(scratch_output, original)?;
    std::fs::remove_file(scratch_output).ok();
    Ok(())
}

/// Claims one record at a time and runs it through the conversion state
/// machine: claim, scratch copy, transcode, then the backup → verify → swap
/// replacement protocol. The original file is never overwritten before a
/// recoverable copy exists elsewhere.
pub struct Converter {
    store: Arc<dyn CatalogStore>,
    notifier: Arc<Notifier>,
    cancel: CancellationToken,
    policy: ClaimPolicy,
    worker_name: String,
    scratch_dir: PathBuf,
    backup_dir: PathBuf,
    ffmpeg_bin: PathBuf,
}

impl Converter {
    pub fn new(
        config: &ConvertConfig,
        store: Arc<dyn CatalogStore>,
        notifier: Arc<Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Converter {
            store,
            notifier,
            cancel,
            policy: config.claim_policy(),
            worker_name: config.resolve_worker_name(),
            scratch_dir: config.folders.scratch.clone(),
            backup_dir: config.folders.backup.clone(),
            ffmpeg_bin: config.ffmpeg_bin.clone(),
        }
    }

    /// Claim and fully process at most one record.
    ///
    /// Only the claim itself propagates store errors (the scheduler skips
    /// the tick); every later store write is best-effort — an unreachable
    /// store at worst leaves a claim for the staleness pass to release.
    pub async fn convert(&self) -> StoreResult<ConvertOutcome> {
        let claimed = self
            .store
            .claim_next(&self.policy, &self.worker_name, Utc::now())?;
        let Some(record) = claimed else {
            return Ok(ConvertOutcome::Idle);
        };

        let path = record.path.clone();
        let source = PathBuf::from(&path);
        let name = display_name(&source);

        info!(
            "Claimed {} ({}, container bit rate {} b/s)",
            path,
            format_size(record.size_before_bytes, BINARY),
            record.container_bit_rate()
        );

        // The file may have been deleted or moved since the last scan; the
        // reconciler will catch up on its next pass.
        if !source.exists() {
            info!("Source vanished before conversion: {path}");
            self.release_quietly(&path);
            return Ok(ConvertOutcome::Aborted(path));
        }

        self.notifier
            .send(
                "Conversion started",
                &format!(
                    "{name} ({})",
                    format_size(record.size_before_bytes, BINARY)
                ),
            )
            .await;

        let scratch_src = scratch_source_path(&self.scratch_dir, &source);
        let scratch_out = scratch_output_path(&self.scratch_dir, &source);

        // Work on a scratch copy so the transcode never touches the original
        // and a flaky network mount cannot corrupt it mid-read.
        if let Err(e) = tokio::fs::copy(&source, &scratch_src).await {
            warn!("Failed to copy {path} into scratch: {e}");
            self.cleanup_scratch(&scratch_src, &scratch_out);
            self.release_quietly(&path);
            return Ok(ConvertOutcome::Aborted(path));
        }

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(&path, &scratch_src, &scratch_out));
        }

        let params = quality::params_for_source(record.probe.video_height());
        let duration = record.probe.format.duration_secs();
        debug!(
            "Transcoding {path} with crf {} preset {} (duration {duration:.0}s)",
            params.crf, params.preset
        );

        let mut tracker = ProgressTracker::new(duration);
        let progress_store = Arc::clone(&self.store);
        let progress_path = path.clone();
        let on_progress = move |event: ProgressEvent| {
            if let Some((percent, speed)) = tracker.observe(event) {
                if let Err(e) = progress_store.update_progress(&progress_path, percent, speed) {
                    debug!("Progress update skipped for {progress_path}: {e}");
                }
            }
        };

        match ffmpeg::transcode(
            &self.ffmpeg_bin,
            &scratch_src,
            &scratch_out,
            &params,
            &self.cancel,
            on_progress,
        )
        .await
        {
            Ok(()) => {}
            Err(TranscodeError::Cancelled) => {
                return Ok(self.cancelled(&path, &scratch_src, &scratch_out));
            }
            Err(e) => {
                error!("Transcode failed for {path}: {e}");
                self.cleanup_scratch(&scratch_src, &scratch_out);
                self.mark_error_quietly(&path);
                self.notifier
                    .send("Conversion failed", &format!("{name}: {e}"))
                    .await;
                return Ok(ConvertOutcome::Failed(path));
            }
        }

        let source_size = std::fs::metadata(&scratch_src)
            .map(|m| m.len())
            .unwrap_or(record.size_before_bytes);
        let output_size = std::fs::metadata(&scratch_out).map(|m| m.len()).unwrap_or(0);

        if output_size == 0 {
            error!("Transcode produced no output for {path}");
            self.cleanup_scratch(&scratch_src, &scratch_out);
            self.mark_error_quietly(&path);
            self.notifier
                .send("Conversion failed", &format!("{name}: empty output"))
                .await;
            return Ok(ConvertOutcome::Failed(path));
        }

        if output_size >= source_size {
            // A success outcome: the record is done, the original stays.
            info!(
                "No reduction for {path}: output {} >= source {}",
                format_size(output_size, BINARY),
                format_size(source_size, BINARY)
            );
            self.cleanup_scratch(&scratch_src, &scratch_out);
            self.finish_quietly(&path, record.size_before_bytes);
            self.notifier
                .send(
                    "Conversion complete",
                    &format!("{name}: output not smaller, original kept"),
                )
                .await;
            return Ok(ConvertOutcome::NoReduction(path));
        }

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(&path, &scratch_src, &scratch_out));
        }

        let backup_path = self.backup_dir.join(
            source
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "backup".into()),
        );

        if let Err(e) = backup_original(&source, &backup_path) {
            error!("Backup failed for {path}: {e}; original untouched");
            self.cleanup_scratch(&scratch_src, &scratch_out);
            self.mark_error_quietly(&path);
            self.notifier
                .send("Backup failed", &format!("{name}: {e}"))
                .await;
            return Ok(ConvertOutcome::Failed(path));
        }

        if self.cancel.is_cancelled() {
            // Original untouched; the backup is redundant, drop it.
            std::fs::remove_file(&backup_path).ok();
            return Ok(self.cancelled(&path, &scratch_src, &scratch_out));
        }

        if let Err(e) = replace_original(&source, &scratch_out) {
            error!(
                "Replace failed for {path}: {e}; backup kept at {}",
                backup_path.display()
            );
            self.cleanup_scratch(&scratch_src, &scratch_out);
            self.mark_error_quietly(&path);
            self.notifier
                .send("Restore failed", &format!("{name}: {e}"))
                .await;
            return Ok(ConvertOutcome::Failed(path));
        }

        self.cleanup_scratch(&scratch_src, &scratch_out);

        let final_size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(output_size);
        self.finish_quietly(&path, final_size);

        let saved_percent =
            100.0 * (1.0 - final_size as f64 / record.size_before_bytes.max(1) as f64);
        info!(
            "Converted {path}: {} -> {} ({saved_percent:.0}% saved)",
            format_size(record.size_before_bytes, BINARY),
            format_size(final_size, BINARY)
        );
        self.notifier
            .send(
                "Conversion complete",
                &format!(
                    "{name}: saved {saved_percent:.0}% ({})",
                    format_size(record.size_before_bytes.saturating_sub(final_size), BINARY)
                ),
            )
            .await;

        Ok(ConvertOutcome::Converted(path))
    }

    fn cancelled(&self, path: &str, scratch_src: &Path, scratch_out: &Path) -> ConvertOutcome {
        info!("Conversion of {path} cancelled; releasing claim");
        self.cleanup_scratch(scratch_src, scratch_out);
        self.release_quietly(path);
        ConvertOutcome::Cancelled
    }

    fn cleanup_scratch(&self, scratch_src: &Path, scratch_out: &Path) {
        for file in [scratch_src, scratch_out] {
            if file.exists() {
                if let Err(e) = std::fs::remove_file(file) {
                    warn!("Failed to remove scratch file {}: {e}", file.display());
                }
            }
        }
    }

    fn release_quietly(&self, path: &str) {
        if let Err(e) = self.store.release_claim(path) {
            warn!("Failed to release claim on {path}: {e}");
        }
    }

    fn mark_error_quietly(&self, path: &str) {
        if let Err(e) = self.store.mark_error(path, Utc::now()) {
            warn!("Failed to record conversion error for {path}: {e}");
        }
    }

    fn finish_quietly(&self, path: &str, size_after: u64) {
        if let Err(e) = self.store.finish_converted(path, size_after, Utc::now()) {
            warn!("Failed to record conversion result for {path}: {e}");
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffprobe::{ProbeData, ProbeFormat, ProbeStream};
    use crate::record::FileRecord;
    use crate::store::MemoryStore;
    use std::fs;

    fn probe(bit_rate: u64) -> ProbeData {
        ProbeData {
            streams: vec![ProbeStream::test_stream(0, "video", "h264")],
            format: ProbeFormat::test_format(3600.0, Some(bit_rate)),
        }
    }

    struct Fixture {
        _dirs: tempfile::TempDir,
        store: Arc<MemoryStore>,
        config: ConvertConfig,
        library: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dirs = tempfile::tempdir().unwrap();
            let library = dirs.path().join("library");
            let scratch = dirs.path().join("scratch");
            let backup = dirs.path().join("backup");
            for dir in [&library, &scratch, &backup] {
                fs::create_dir_all(dir).unwrap();
            }

            let mut config = ConvertConfig::default_config();
            config.folders.scratch = scratch;
            config.folders.backup = backup;
            config.worker_name = Some("test-worker".to_string());

            Fixture {
                _dirs: dirs,
                store: Arc::new(MemoryStore::new()),
                config,
                library,
            }
        }

        fn add_file(&self, name: &str, contents: &[u8], bit_rate: u64) -> PathBuf {
            let path = self.library.join(name);
            fs::write(&path, contents).unwrap();
            let record = FileRecord::new(
                path.to_string_lossy().to_string(),
                1,
                contents.len() as u64,
                probe(bit_rate),
            );
            self.store.upsert(&record).unwrap();
            path
        }

        fn converter(&self, cancel: CancellationToken) -> Converter {
            Converter::new(
                &self.config,
                Arc::clone(&self.store) as Arc<dyn CatalogStore>,
                Arc::new(Notifier::new(None)),
                cancel,
            )
        }
    }

    /// Install a fake ffmpeg: a shell script that writes `output_bytes`
    /// bytes to its last argument and emits one progress block.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, output_bytes: usize, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-ffmpeg");
        let body = format!(
            "#!/bin/sh\n\
             eval 'out=${{'$#'}}'\n\
             head -c {output_bytes} /dev/zero > \"$out\"\n\
             echo 'out_time_us=1800000000'\n\
             echo 'speed=8.0x'\n\
             echo 'progress=end'\n\
             exit {exit_code}\n"
        );
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[tokio::test]
    async fn idle_when_backlog_is_empty() {
        let fixture = Fixture::new();
        let converter = fixture.converter(CancellationToken::new());
        assert_eq!(converter.convert().await.unwrap(), ConvertOutcome::Idle);
    }

    #[tokio::test]
    async fn vanished_source_releases_claim_without_error() {
        let fixture = Fixture::new();
        let path = fixture.add_file("gone.mkv", b"0123456789", 1000);
        fs::remove_file(&path).unwrap();

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert!(matches!(outcome, ConvertOutcome::Aborted(_)));

        let record = fixture
            .store
            .get(&path.to_string_lossy())
            .unwrap()
            .unwrap();
        assert!(!record.converting);
        assert!(!record.conversion_error);
        assert_eq!(record.progress_percent, 0.0);
    }

    #[tokio::test]
    async fn tool_failure_marks_error_and_keeps_original() {
        let mut fixture = Fixture::new();
        fixture.config.ffmpeg_bin = PathBuf::from("/nonexistent/ffmpeg");
        let contents = b"original media bytes";
        let path = fixture.add_file("movie.mkv", contents, 1000);

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert!(matches!(outcome, ConvertOutcome::Failed(_)));

        let record = fixture.store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(record.conversion_error);
        assert!(!record.converting);
        assert_eq!(fs::read(&path).unwrap(), contents);
        // Scratch cleaned on the failure path.
        assert_eq!(fs::read_dir(&fixture.config.folders.scratch).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn smaller_output_is_swapped_in_with_a_backup() {
        let mut fixture = Fixture::new();
        let contents = vec![7u8; 10_000];
        let path = fixture.add_file("movie.mkv", &contents, 1000);
        fixture.config.ffmpeg_bin = fake_ffmpeg(fixture._dirs.path(), 4_000, 0);

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert!(matches!(outcome, ConvertOutcome::Converted(_)));

        // The original path now holds the (smaller) transcode output.
        assert_eq!(fs::metadata(&path).unwrap().len(), 4_000);
        // The backup holds the pre-conversion bytes.
        let backup = fixture.config.folders.backup.join("movie.mkv");
        assert_eq!(fs::read(&backup).unwrap(), contents);

        let record = fixture.store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(record.converted);
        assert!(!record.converting);
        assert_eq!(record.progress_percent, 100.0);
        assert_eq!(record.size_after_bytes, 4_000);
        assert_eq!(record.size_before_bytes, 10_000);
        assert_eq!(fs::read_dir(&fixture.config.folders.scratch).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn larger_output_keeps_original_bytes_untouched() {
        let mut fixture = Fixture::new();
        let contents = vec![3u8; 100];
        let path = fixture.add_file("movie.mkv", &contents, 1000);
        fixture.config.ffmpeg_bin = fake_ffmpeg(fixture._dirs.path(), 5_000, 0);

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert!(matches!(outcome, ConvertOutcome::NoReduction(_)));

        assert_eq!(fs::read(&path).unwrap(), contents);
        let record = fixture.store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(record.converted);
        assert_eq!(record.size_after_bytes, record.size_before_bytes);
        // No backup is made when nothing is replaced.
        assert_eq!(fs::read_dir(&fixture.config.folders.backup).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tool_exit_code_failure_releases_claim() {
        let mut fixture = Fixture::new();
        let path = fixture.add_file("movie.mkv", &vec![1u8; 1000], 1000);
        fixture.config.ffmpeg_bin = fake_ffmpeg(fixture._dirs.path(), 100, 1);

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert!(matches!(outcome, ConvertOutcome::Failed(_)));

        let record = fixture.store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(record.conversion_error);
        assert_eq!(fs::metadata(&path).unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn cancellation_before_transcode_releases_cleanly() {
        let fixture = Fixture::new();
        let path = fixture.add_file("movie.mkv", &vec![1u8; 1000], 1000);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let converter = fixture.converter(cancel);
        let outcome = converter.convert().await.unwrap();
        assert_eq!(outcome, ConvertOutcome::Cancelled);

        let record = fixture.store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(!record.converting);
        assert!(!record.conversion_error);
        assert_eq!(record.progress_percent, 0.0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 1000);
        assert_eq!(fs::read_dir(&fixture.config.folders.scratch).unwrap().count(), 0);
    }

    #[test]
    fn failed_replace_after_backup_preserves_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("movie.mkv");
        let backup = dir.path().join("backup").join("movie.mkv");
        fs::create_dir_all(backup.parent().unwrap()).unwrap();
        let contents = b"irreplaceable bytes";
        fs::write(&original, contents).unwrap();

        backup_original(&original, &backup).unwrap();

        // Failure injected between backup and replace: the scratch output is
        // gone, so both rename and copy fail.
        let missing_output = dir.path().join("scratch").join("movie.hevc.mkv");
        assert!(replace_original(&original, &missing_output).is_err());

        assert_eq!(fs::read(&original).unwrap(), contents);
        assert_eq!(fs::read(&backup).unwrap(), contents);
    }

    #[test]
    fn backup_replaces_a_stale_backup_from_an_earlier_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("movie.mkv");
        fs::write(&original, b"bytes").unwrap();

        let backup = dir.path().join("movie.bak");
        fs::write(&backup, b"stale").unwrap();
        backup_original(&original, &backup).unwrap();
        assert_eq!(fs::read(&backup).unwrap(), b"bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn highest_bit_rate_candidate_is_converted_first() {
        let mut fixture = Fixture::new();
        fixture.add_file("low.mkv", &vec![1u8; 10_000], 2_000_000);
        let high = fixture.add_file("high.mkv", &vec![2u8; 10_000], 9_000_000);
        fixture.config.ffmpeg_bin = fake_ffmpeg(fixture._dirs.path(), 6_000, 0);

        let converter = fixture.converter(CancellationToken::new());
        let outcome = converter.convert().await.unwrap();
        assert_eq!(
            outcome,
            ConvertOutcome::Converted(high.to_string_lossy().to_string())
        );

        // 40% smaller output: final size is 0.6x the pre-conversion size.
        let record = fixture.store.get(&high.to_string_lossy()).unwrap().unwrap();
        assert_eq!(record.size_after_bytes, 6_000);
        assert_eq!(record.size_before_bytes, 10_000);
        let low_record = fixture
            .store
            .get(&fixture.library.join("low.mkv").to_string_lossy())
            .unwrap()
            .unwrap();
        assert!(!low_record.converted);
        assert!(low_record.is_pending());
    }

    #[test]
    fn progress_tracker_is_monotone_and_clamped() {
        let mut tracker = ProgressTracker {
            duration_secs: 100.0,
            min_interval: Duration::ZERO,
            last_percent: 0.0,
            last_persist: None,
        };

        let event = |secs: u64| ProgressEvent {
            elapsed: Duration::from_secs(secs),
            speed: 1.0,
        };

        assert_eq!(tracker.observe(event(10)).unwrap().0, 10.0);
        assert_eq!(tracker.observe(event(50)).unwrap().0, 50.0);
        // Out-of-order event must not move progress backwards.
        assert!(tracker.observe(event(20)).is_none());
        // Elapsed past the container duration clamps at 100.
        assert_eq!(tracker.observe(event(500)).unwrap().0, 100.0);
    }

    #[test]
    fn progress_tracker_throttles_persistence() {
        let mut tracker = ProgressTracker::new(100.0);
        let event = |secs: u64| ProgressEvent {
            elapsed: Duration::from_secs(secs),
            speed: 1.0,
        };
        assert!(tracker.observe(event(10)).is_some());
        // Second event arrives immediately; persisted at most once per second.
        assert!(tracker.observe(event(20)).is_none());
    }

    #[test]
    fn scratch_paths_are_derived_from_the_source_name() {
        let scratch = Path::new("/tmp/work");
        let src = Path::new("/media/tv/show.mkv");
        assert_eq!(
            scratch_source_path(scratch, src),
            Path::new("/tmp/work/show.mkv")
        );
        assert_eq!(
            scratch_output_path(scratch, src),
            Path::new("/tmp/work/show.hevc.mkv")
        );
    }
}
