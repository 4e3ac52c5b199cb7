// Input probing by scraping ffmpeg's input header

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;

use crate::engine::core::{
    DEFAULT_AUDIO_BITRATE_KBPS, DEFAULT_FRAME_RATE, DEFAULT_SAMPLE_RATE,
    DEFAULT_VIDEO_BITRATE_KBPS, Engine, Limits, SampleRate,
};
use crate::engine::diagnostics::{self, MediaHeader};

/// Best-effort description of an input file.
///
/// Every numeric field is already clamped into the configured limits; anything that
/// could not be parsed holds its documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub duration_s: Option<f64>,
    pub video_bitrate_kbps: u32,
    pub frame_rate: u32,
    pub audio_bitrate_kbps: u32,
    pub sample_rate: u32,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self {
            duration_s: None,
            video_bitrate_kbps: DEFAULT_VIDEO_BITRATE_KBPS,
            frame_rate: DEFAULT_FRAME_RATE,
            audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl ProbeResult {
    /// Defaults, clamped like a real probe would be
    pub fn fallback(limits: &Limits) -> Self {
        Self::from_header(&MediaHeader::default(), limits)
    }

    pub fn from_diagnostics(text: &str, limits: &Limits) -> Self {
        Self::from_header(&MediaHeader::parse(text), limits)
    }

    fn from_header(header: &MediaHeader, limits: &Limits) -> Self {
        let frame_rate = header
            .frame_rate
            .map(|fps| fps.round().clamp(0.0, u32::MAX as f64) as u32)
            .unwrap_or(DEFAULT_FRAME_RATE);
        // Sample rates are an enumerated choice: clamping snaps to the nearest one
        let sample_rate = SampleRate::nearest(header.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE));

        Self {
            duration_s: header.duration_s,
            video_bitrate_kbps: limits
                .video_bitrate_kbps
                .clamp(header.bitrate_kbps.unwrap_or(DEFAULT_VIDEO_BITRATE_KBPS)),
            frame_rate: limits.frame_rate.clamp(frame_rate),
            audio_bitrate_kbps: limits
                .audio_bitrate_kbps
                .clamp(header.audio_bitrate_kbps.unwrap_or(DEFAULT_AUDIO_BITRATE_KBPS)),
            sample_rate: sample_rate.hz(),
        }
    }

    /// The (bitrate, sample rate) pair used to auto-fill audio options
    pub fn audio_defaults(&self) -> (u32, u32) {
        (self.audio_bitrate_kbps, self.sample_rate)
    }
}

/// Probe `path` with the engine. Never fails: a missing engine or an unreadable file
/// yields the defaults.
pub fn probe(engine: &Engine, path: &Path, limits: &Limits) -> ProbeResult {
    match header_text(engine, path) {
        Some(text) => {
            let result = ProbeResult::from_diagnostics(&text, limits);
            tracing::debug!(path = %path.display(), ?result, "probed input");
            result
        }
        None => ProbeResult::fallback(limits),
    }
}

/// Total input duration, or `None` when it cannot be determined
pub fn probe_duration(engine: &Engine, path: &Path) -> Option<f64> {
    header_text(engine, path).and_then(|text| diagnostics::parse_duration(&text))
}

// `ffmpeg -i <file>` with no output exits non-zero ("At least one output file must be
// specified") after printing the header, so the status is ignored.
fn header_text(engine: &Engine, path: &Path) -> Option<String> {
    let output = engine
        .command()
        .arg("-hide_banner")
        .arg("-i")
        .arg(path)
        .stdout(Stdio::null())
        .output();

    match output {
        Ok(out) => Some(String::from_utf8_lossy(&out.stderr).into_owned()),
        Err(e) => {
            tracing::warn!(
                program = %engine.program().display(),
                error = %e,
                "probe could not start; using defaults"
            );
            None
        }
    }
}
