/// Encoding parameters handed to the transcode invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingParams {
    pub crf: u8,
    pub preset: &'static str,
}

const DEFAULT_CRF: u8 = 28;
const LOW_RES_CRF: u8 = 24;
const LOW_RES_MAX_HEIGHT: i64 = 500;
const PRESET: &str = "medium";

/// Pick encoding parameters for a source by resolution.
///
/// Low-resolution sources (height <= 500 px) get a gentler CRF: they have
/// little detail to spare, so compression effort is dialed down. Unknown
/// height is treated as full resolution.
pub fn params_for_source(video_height: Option<i64>) -> EncodingParams {
    let crf = match video_height {
        Some(h) if h <= LOW_RES_MAX_HEIGHT => LOW_RES_CRF,
        _ => DEFAULT_CRF,
    };
    EncodingParams {
        crf,
        preset: PRESET,
    }
}
