//! NVIDIA NVENC hardware encoding detection

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use crate::engine::core::Engine;

/// Value passed to `-hwaccel` when decoding for a hardware encode
pub const HWACCEL: &str = "cuda";

/// Frames encoded by the trial run before trusting a hardware encoder with a file
pub const FEASIBILITY_FRAME_CAP: u32 = 5;

/// Diagnostic phrases that mark a trial run as failed even when ffmpeg exits 0
pub const FEASIBILITY_FAILURE_PHRASES: &[&str] = &["not supported", "no capable device", "invalid"];

// ============================================================================
// Video Encoder Selection
// ============================================================================

/// Supported video encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEncoder {
    Libx264,
    Libx265,
    LibvpxVp9,
    LibsvtAv1,

    H264Nvenc,
    HevcNvenc,
    Av1Nvenc,
}

impl VideoEncoder {
    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libx265 => "libx265",
            Self::LibvpxVp9 => "libvpx-vp9",
            Self::LibsvtAv1 => "libsvtav1",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
            Self::Av1Nvenc => "av1_nvenc",
        }
    }

    /// Check if this is a hardware encoder
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::H264Nvenc | Self::HevcNvenc | Self::Av1Nvenc)
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "x264 (Software)",
            Self::Libx265 => "x265 (Software)",
            Self::LibvpxVp9 => "libvpx-vp9 (Software)",
            Self::LibsvtAv1 => "SVT-AV1 (Software)",
            Self::H264Nvenc => "H.264 NVENC (NVIDIA)",
            Self::HevcNvenc => "HEVC NVENC (NVIDIA)",
            Self::Av1Nvenc => "AV1 NVENC (NVIDIA)",
        }
    }

    /// Preset and rate-control flags that follow `-c:v`
    pub fn rate_control_args(&self) -> &'static [&'static str] {
        match self {
            Self::H264Nvenc | Self::HevcNvenc => &["-preset", "fast", "-rc", "vbr"],
            Self::Av1Nvenc => &["-preset", "p4", "-rc", "vbr"],
            _ => &[],
        }
    }
}

// ============================================================================
// Capability Detection
// ============================================================================

/// Hardware encoders the installed ffmpeg was built with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub h264_nvenc: bool,
    pub hevc_nvenc: bool,
    pub av1_nvenc: bool,
}

impl CapabilitySet {
    /// Parse the listing printed by `ffmpeg -encoders`
    pub fn from_encoders_output(text: &str) -> Self {
        Self {
            h264_nvenc: text.contains("h264_nvenc"),
            hevc_nvenc: text.contains("hevc_nvenc"),
            av1_nvenc: text.contains("av1_nvenc"),
        }
    }

    /// Ask ffmpeg which encoders it has. Any failure means "no hardware".
    pub fn detect(engine: &Engine) -> Self {
        let output = engine
            .command()
            .args(["-hide_banner", "-encoders"])
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let caps = Self::from_encoders_output(&String::from_utf8_lossy(&out.stdout));
                tracing::debug!(?caps, "detected encoder capabilities");
                caps
            }
            Ok(out) => {
                tracing::warn!(status = %out.status, "ffmpeg -encoders failed; assuming no hardware encoders");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(
                    program = %engine.program().display(),
                    error = %e,
                    "could not run ffmpeg to list encoders; assuming no hardware encoders"
                );
                Self::default()
            }
        }
    }

    pub fn supports(&self, encoder: VideoEncoder) -> bool {
        match encoder {
            VideoEncoder::H264Nvenc => self.h264_nvenc,
            VideoEncoder::HevcNvenc => self.hevc_nvenc,
            VideoEncoder::Av1Nvenc => self.av1_nvenc,
            _ => false,
        }
    }

    pub fn available_encoders(&self) -> Vec<VideoEncoder> {
        [
            VideoEncoder::H264Nvenc,
            VideoEncoder::HevcNvenc,
            VideoEncoder::Av1Nvenc,
        ]
        .into_iter()
        .filter(|enc| self.supports(*enc))
        .collect()
    }
}

static CAPABILITY_CACHE: OnceLock<CapabilitySet> = OnceLock::new();

/// Capabilities detected once per process; later calls reuse the first answer
pub fn capabilities(engine: &Engine) -> &'static CapabilitySet {
    CAPABILITY_CACHE.get_or_init(|| CapabilitySet::detect(engine))
}

// ============================================================================
// Per-file Feasibility
// ============================================================================

/// Result of the per-file hardware trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareCheck {
    /// No trial was run; trust the capability set
    #[default]
    Skipped,
    Passed,
    /// The trial failed; encode in software
    Failed,
}

/// Arguments for a short trial encode that discards its output
pub fn feasibility_args(input: &Path, encoder: VideoEncoder) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-hwaccel".to_string(),
        HWACCEL.to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-frames:v".to_string(),
        FEASIBILITY_FRAME_CAP.to_string(),
        "-c:v".to_string(),
        encoder.ffmpeg_name().to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]
}

/// Judge a trial run from its exit status and diagnostics
pub fn feasible_from_output(success: bool, diagnostics: &str) -> bool {
    if !success {
        return false;
    }
    let lower = diagnostics.to_lowercase();
    !FEASIBILITY_FAILURE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Run the trial encode for `input`. A capability listed by `-encoders` can still
/// fail on a given machine (no GPU, old driver) or a given file (unsupported profile).
pub fn probe_feasible(engine: &Engine, input: &Path, encoder: VideoEncoder) -> bool {
    let output = engine
        .command()
        .args(feasibility_args(input, encoder))
        .stdout(Stdio::null())
        .output();

    match output {
        Ok(out) => {
            let ok = feasible_from_output(
                out.status.success(),
                &String::from_utf8_lossy(&out.stderr),
            );
            tracing::debug!(encoder = encoder.ffmpeg_name(), feasible = ok, "hardware trial run");
            ok
        }
        Err(e) => {
            tracing::warn!(error = %e, "hardware trial run could not start");
            false
        }
    }
}
