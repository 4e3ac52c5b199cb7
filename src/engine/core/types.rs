use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::bounded::{Bounded, ValueRange};
use crate::engine::diagnostics;
use crate::engine::hardware::VideoEncoder;
use crate::engine::probe::ProbeResult;

pub const VIDEO_FORMATS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];
pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"];
pub const IMAGE_FORMATS: &[&str] = &["jpg", "png", "gif", "bmp", "webp", "tiff", "ico"];

pub const DEFAULT_VIDEO_BITRATE_KBPS: u32 = 2000;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_VOLUME_PERCENT: u32 = 100;

/// Sample rates offered for audio conversions
pub const SAMPLE_RATES: &[u32] = &[8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000];

/// Lowercase a target format and strip any leading dot ("`.MP4`" -> "`mp4`")
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    pub fn formats(&self) -> &'static [&'static str] {
        match self {
            Self::Video => VIDEO_FORMATS,
            Self::Audio => AUDIO_FORMATS,
            Self::Image => IMAGE_FORMATS,
        }
    }

    /// Infer the media kind from a target format
    pub fn from_format(format: &str) -> Option<Self> {
        let format = normalize_format(format);
        [Self::Video, Self::Audio, Self::Image]
            .into_iter()
            .find(|kind| kind.formats().contains(&format.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// Parse a codec choice. Unknown names fall back to H.264.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "h265" | "hevc" | "x265" | "h.265" => Self::H265,
            "vp9" => Self::Vp9,
            "av1" => Self::Av1,
            _ => Self::H264,
        }
    }

    pub fn software_encoder(&self) -> VideoEncoder {
        match self {
            Self::H264 => VideoEncoder::Libx264,
            Self::H265 => VideoEncoder::Libx265,
            Self::Vp9 => VideoEncoder::LibvpxVp9,
            Self::Av1 => VideoEncoder::LibsvtAv1,
        }
    }

    /// NVENC encoder for this family. VP9 has no hardware path.
    pub fn hardware_encoder(&self) -> Option<VideoEncoder> {
        match self {
            Self::H264 => Some(VideoEncoder::H264Nvenc),
            Self::H265 => Some(VideoEncoder::HevcNvenc),
            Self::Av1 => Some(VideoEncoder::Av1Nvenc),
            Self::Vp9 => None,
        }
    }
}

/// A sample rate restricted to [`SAMPLE_RATES`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub struct SampleRate(u32);

impl SampleRate {
    /// Snap any rate to the closest offered choice (ties go to the lower rate)
    pub fn nearest(hz: u32) -> Self {
        let closest = SAMPLE_RATES
            .iter()
            .copied()
            .min_by_key(|choice| choice.abs_diff(hz))
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        Self(closest)
    }

    pub fn hz(&self) -> u32 {
        self.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self(DEFAULT_SAMPLE_RATE)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.0
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = String;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        if SAMPLE_RATES.contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(format!("unsupported sample rate {} Hz", hz))
        }
    }
}

/// Ranges exposed to the user for each numeric option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub video_bitrate_kbps: ValueRange,
    pub frame_rate: ValueRange,
    pub audio_bitrate_kbps: ValueRange,
    pub volume_percent: ValueRange,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            video_bitrate_kbps: ValueRange::new(100, 50_000),
            frame_rate: ValueRange::new(1, 120),
            audio_bitrate_kbps: ValueRange::new(32, 320),
            volume_percent: ValueRange::new(0, 300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOptions {
    pub codec: VideoCodec,
    /// Use NVENC when the capability set offers it
    pub hardware: bool,
    pub bitrate_kbps: Bounded,
    pub frame_rate: Bounded,
    pub hflip: bool,
    pub vflip: bool,
    /// Subtitle file burned into the picture
    pub subtitles: Option<PathBuf>,
    /// Copy video and audio into two separate files instead of converting
    pub split_streams: bool,
    pub volume_percent: Bounded,
}

impl VideoOptions {
    pub fn with_limits(limits: &Limits) -> Self {
        Self {
            codec: VideoCodec::default(),
            hardware: false,
            bitrate_kbps: Bounded::new(DEFAULT_VIDEO_BITRATE_KBPS, limits.video_bitrate_kbps),
            frame_rate: Bounded::new(DEFAULT_FRAME_RATE, limits.frame_rate),
            hflip: false,
            vflip: false,
            subtitles: None,
            split_streams: false,
            volume_percent: Bounded::new(DEFAULT_VOLUME_PERCENT, limits.volume_percent),
        }
    }

    /// Seed bitrate and frame rate from a probed input
    pub fn seed_from(&mut self, probe: &ProbeResult) {
        self.bitrate_kbps.set(probe.video_bitrate_kbps);
        self.frame_rate.set(probe.frame_rate);
    }
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self::with_limits(&Limits::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOptions {
    /// Ignored for lossless targets (flac, wav)
    pub bitrate_kbps: Bounded,
    pub sample_rate: SampleRate,
    /// Downmix to a single channel
    pub mono: bool,
    pub volume_percent: Bounded,
    /// EBU R128 loudness normalization
    pub normalize: bool,
}

impl AudioOptions {
    pub fn with_limits(limits: &Limits) -> Self {
        Self {
            bitrate_kbps: Bounded::new(DEFAULT_AUDIO_BITRATE_KBPS, limits.audio_bitrate_kbps),
            sample_rate: SampleRate::default(),
            mono: false,
            volume_percent: Bounded::new(DEFAULT_VOLUME_PERCENT, limits.volume_percent),
            normalize: false,
        }
    }

    /// Auto-fill bitrate and sample rate from a probed input
    pub fn seed_from(&mut self, probe: &ProbeResult) {
        let (bitrate, sample_rate) = probe.audio_defaults();
        self.bitrate_kbps.set(bitrate);
        self.sample_rate = SampleRate::nearest(sample_rate);
    }
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self::with_limits(&Limits::default())
    }
}

/// Engine-specific options for one conversion. Images take none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptionSet {
    Video(VideoOptions),
    Audio(AudioOptions),
    Image,
}

impl OptionSet {
    pub fn for_kind(kind: MediaKind, limits: &Limits) -> Self {
        match kind {
            MediaKind::Video => Self::Video(VideoOptions::with_limits(limits)),
            MediaKind::Audio => Self::Audio(AudioOptions::with_limits(limits)),
            MediaKind::Image => Self::Image,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Video(_) => MediaKind::Video,
            Self::Audio(_) => MediaKind::Audio,
            Self::Image => MediaKind::Image,
        }
    }
}

/// Everything the caller decided for one conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input: PathBuf,
    /// Defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
    /// Target container extension, without the dot
    pub format: String,
    pub options: OptionSet,
    /// Pass `-y` so an existing output file is replaced
    #[serde(default)]
    pub overwrite: bool,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, format: &str, options: OptionSet) -> Self {
        Self {
            input: input.into(),
            output_dir: None,
            format: normalize_format(format),
            options,
            overwrite: false,
        }
    }

    /// Request with default options for the kind implied by `format`.
    /// Returns `None` for formats outside the catalogue.
    pub fn for_format(input: impl Into<PathBuf>, format: &str, limits: &Limits) -> Option<Self> {
        let kind = MediaKind::from_format(format)?;
        Some(Self::new(input, format, OptionSet::for_kind(kind, limits)))
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.options.kind()
    }

    /// Where the engine writes the converted file
    pub fn output_path(&self) -> PathBuf {
        super::ffmpeg_cmd::derive_output_path(&self.input, self.output_dir.as_deref(), &self.format)
    }
}

/// Terminal status of one conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed { outputs: Vec<PathBuf> },
    Failed {
        message: String,
        log_path: Option<PathBuf>,
    },
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Lifecycle notifications for the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    /// The engine is being launched with this command line
    Started { run_id: Uuid, command_line: String },

    /// The hardware encoder failed its trial run; the conversion continues in software
    HardwareFallback {
        run_id: Uuid,
        encoder: VideoEncoder,
        fallback: VideoEncoder,
    },

    /// Progress in percent, never decreasing within a run
    Progress { run_id: Uuid, percent: u8 },

    /// The run is over; the supervisor is idle again
    Finished { run_id: Uuid, outcome: Outcome },
}

/// Percentage added per `time=` line when the input duration is unknown
pub const PROGRESS_FALLBACK_STEP: u8 = 2;

/// Turns the engine's streaming diagnostics into a monotonic percentage
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    duration_s: Option<f64>,
    percent: u8,
}

impl ProgressTracker {
    pub fn new(duration_s: Option<f64>) -> Self {
        Self {
            duration_s: duration_s.filter(|d| d.is_finite() && *d > 0.0),
            percent: 0,
        }
    }

    /// Feed one diagnostic line. Returns the new percentage when it moved.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if !diagnostics::has_time_marker(line) {
            return None;
        }

        let next = match self.duration_s {
            Some(duration) => {
                let elapsed = diagnostics::parse_progress_time(line)?;
                (elapsed / duration * 100.0).clamp(0.0, 100.0) as u8
            }
            None => self.percent.saturating_add(PROGRESS_FALLBACK_STEP).min(100),
        };

        if next > self.percent {
            self.percent = next;
            Some(next)
        } else {
            None
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Force 100% once the engine exits successfully
    pub fn complete(&mut self) -> u8 {
        self.percent = 100;
        self.percent
    }
}
