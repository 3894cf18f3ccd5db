use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ffprobe::ProbeData;

/// Stream tallies and the chosen "first" stream indices for a media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCounts {
    pub video_streams: u32,
    pub audio_streams: u32,
    pub subtitle_streams: u32,
    pub first_video_stream: u32,
    pub first_audio_stream: u32,
    pub first_subtitle_stream: Option<u32>,
}

impl StreamCounts {
    /// Derive counts and stream selection from probe metadata.
    ///
    /// The first audio stream prefers an English-tagged track, then an
    /// undetermined-language track, then the first audio stream in file
    /// order. A file with no audio streams at all gets index 1.
    pub fn derive(probe: &ProbeData) -> Self {
        let mut video_streams = 0;
        let mut audio_streams = 0;
        let mut subtitle_streams = 0;

        let mut first_video: Option<u32> = None;
        let mut first_audio_eng: Option<u32> = None;
        let mut first_audio_und: Option<u32> = None;
        let mut first_audio_any: Option<u32> = None;
        let mut first_subtitle: Option<u32> = None;

        for stream in &probe.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    video_streams += 1;
                    if first_video.is_none() {
                        first_video = Some(stream.index);
                    }
                }
                Some("audio") => {
                    audio_streams += 1;
                    if first_audio_any.is_none() {
                        first_audio_any = Some(stream.index);
                    }
                    match stream.language() {
                        Some("eng") if first_audio_eng.is_none() => {
                            first_audio_eng = Some(stream.index);
                        }
                        Some("und") if first_audio_und.is_none() => {
                            first_audio_und = Some(stream.index);
                        }
                        _ => {}
                    }
                }
                Some("subtitle") => {
                    subtitle_streams += 1;
                    if first_subtitle.is_none() {
                        first_subtitle = Some(stream.index);
                    }
                }
                _ => {}
            }
        }

        StreamCounts {
            video_streams,
            audio_streams,
            subtitle_streams,
            first_video_stream: first_video.unwrap_or(0),
            first_audio_stream: first_audio_eng
                .or(first_audio_und)
                .or(first_audio_any)
                .unwrap_or(1),
            first_subtitle_stream: first_subtitle,
        }
    }
}

/// One catalog entry per media file.
///
/// Records are soft-deleted (the `deleted` flag) so conversion history and
/// size statistics survive file removal. The `converting` / `converted` /
/// `conversion_error` flags together with `conversion_required` form the
/// conversion state machine; only the store's atomic claim may set
/// `converting` on behalf of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub inode: u64,
    pub deleted: bool,
    pub probe: ProbeData,
    pub conversion_required: bool,
    pub streams: StreamCounts,
    pub size_before_bytes: u64,
    pub size_after_bytes: u64,
    pub converting: bool,
    pub converted: bool,
    pub conversion_error: bool,
    pub progress_percent: f64,
    pub speed_factor: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_name: Option<String>,
}

impl FileRecord {
    /// Build a fresh record for a newly probed file.
    pub fn new(path: String, inode: u64, size_bytes: u64, probe: ProbeData) -> Self {
        let streams = StreamCounts::derive(&probe);
        let conversion_required = probe.needs_conversion();

        FileRecord {
            path,
            inode,
            deleted: false,
            probe,
            conversion_required,
            streams,
            size_before_bytes: size_bytes,
            size_after_bytes: size_bytes,
            converting: false,
            converted: false,
            conversion_error: false,
            progress_percent: 0.0,
            speed_factor: 0.0,
            started_at: None,
            finished_at: None,
            worker_name: None,
        }
    }

    /// Whether this record is eligible for claiming.
    pub fn is_pending(&self) -> bool {
        self.conversion_required
            && !self.converting
            && !self.converted
            && !self.conversion_error
            && !self.deleted
    }

    /// Container bit rate used for claim ordering, 0 when the probe had none.
    pub fn container_bit_rate(&self) -> u64 {
        self.probe.format.bit_rate_bps().unwrap_or(0)
    }

    /// Bytes saved by a completed conversion (0 until then, and 0 when the
    /// output was not smaller).
    pub fn bytes_saved(&self) -> u64 {
        if self.converted {
            self.size_before_bytes.saturating_sub(self.size_after_bytes)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffprobe::{ProbeData, ProbeFormat, ProbeStream};

    fn stream(index: u32, codec_type: &str, codec: &str, language: Option<&str>) -> ProbeStream {
        let mut s = ProbeStream::test_stream(index, codec_type, codec);
        if let Some(lang) = language {
            s.set_language(lang);
        }
        s
    }

    fn probe_with(streams: Vec<ProbeStream>) -> ProbeData {
        ProbeData {
            streams,
            format: ProbeFormat::test_format(3600.0, Some(8_000_000)),
        }
    }

    #[test]
    fn counts_tally_by_stream_type() {
        let probe = probe_with(vec![
            stream(0, "video", "h264", None),
            stream(1, "audio", "aac", Some("eng")),
            stream(2, "audio", "ac3", Some("fre")),
            stream(3, "subtitle", "subrip", Some("eng")),
        ]);
        let counts = StreamCounts::derive(&probe);
        assert_eq!(counts.video_streams, 1);
        assert_eq!(counts.audio_streams, 2);
        assert_eq!(counts.subtitle_streams, 1);
        assert_eq!(counts.first_video_stream, 0);
        assert_eq!(counts.first_subtitle_stream, Some(3));
    }

    #[test]
    fn first_audio_prefers_english_over_earlier_streams() {
        let probe = probe_with(vec![
            stream(0, "video", "h264", None),
            stream(1, "audio", "ac3", Some("jpn")),
            stream(2, "audio", "aac", Some("eng")),
        ]);
        assert_eq!(StreamCounts::derive(&probe).first_audio_stream, 2);
    }

    #[test]
    fn first_audio_falls_back_to_undetermined_then_any() {
        let und = probe_with(vec![
            stream(0, "video", "h264", None),
            stream(1, "audio", "ac3", Some("jpn")),
            stream(2, "audio", "aac", Some("und")),
        ]);
        assert_eq!(StreamCounts::derive(&und).first_audio_stream, 2);

        let untagged = probe_with(vec![
            stream(0, "video", "h264", None),
            stream(1, "audio", "ac3", Some("jpn")),
        ]);
        assert_eq!(StreamCounts::derive(&untagged).first_audio_stream, 1);
    }

    #[test]
    fn no_audio_defaults_to_stream_one() {
        let probe = probe_with(vec![stream(0, "video", "h264", None)]);
        assert_eq!(StreamCounts::derive(&probe).first_audio_stream, 1);
    }

    #[test]
    fn hevc_source_is_not_conversion_required() {
        let h264 = FileRecord::new(
            "/media/a.mkv".into(),
            7,
            1_000,
            probe_with(vec![stream(0, "video", "h264", None)]),
        );
        assert!(h264.conversion_required);
        assert!(h264.is_pending());

        let hevc = FileRecord::new(
            "/media/b.mkv".into(),
            8,
            1_000,
            probe_with(vec![stream(0, "video", "hevc", None)]),
        );
        assert!(!hevc.conversion_required);
        assert!(!hevc.is_pending());
    }
}
