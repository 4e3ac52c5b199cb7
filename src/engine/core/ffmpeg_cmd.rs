//! Argument construction for the engine.
//!
//! Everything here is pure: the same request, capability set and hardware verdict always
//! produce the same argument vector, and nothing is executed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::types::{AudioOptions, ConversionRequest, OptionSet, VideoOptions};
use crate::engine::hardware::{CapabilitySet, HWACCEL, HardwareCheck, VideoEncoder};

/// Appended to the output stem when it would otherwise overwrite the input
pub const CONVERTED_SUFFIX: &str = "_converted";

/// Container for the audio half of a split; Matroska audio accepts any copied codec
pub const SPLIT_AUDIO_CONTAINER: &str = "mka";

/// Volume changes of at most this many percent are treated as "unchanged"
const VOLUME_TOLERANCE_PERCENT: u32 = 1;

/// One ready-to-run engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    /// Raw arguments, safe to pass straight to `Command::args`
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl EngineInvocation {
    /// Human-readable rendering for logs and dry runs
    pub fn command_line(&self, program: &Path) -> String {
        format_command_line(program, &self.args)
    }
}

/// Compute the output file for `input` converted to `format`.
///
/// The file lands in `output_dir`, or beside the input when none is given. When the
/// input already has the target extension the stem gets [`CONVERTED_SUFFIX`].
pub fn derive_output_path(input: &Path, output_dir: Option<&Path>, format: &str) -> PathBuf {
    let format = super::types::normalize_format(format);
    let stem = file_stem(input);
    let same_ext = input
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(&format));

    let file_name = if same_ext {
        format!("{}{}.{}", stem, CONVERTED_SUFFIX, format)
    } else {
        format!("{}.{}", stem, format)
    };
    output_directory(input, output_dir).join(file_name)
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn output_directory(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    }
}

/// The hardware encoder the user's codec choice maps to, if the machine has it
pub fn requested_hardware_encoder(
    opts: &VideoOptions,
    caps: &CapabilitySet,
) -> Option<VideoEncoder> {
    if !opts.hardware {
        return None;
    }
    opts.codec
        .hardware_encoder()
        .filter(|encoder| caps.supports(*encoder))
}

/// Choose the encoder: hardware only when requested, present, and not ruled out by a
/// failed trial run. Everything else uses the software encoder of the same family.
pub fn plan_video_encoder(
    opts: &VideoOptions,
    caps: &CapabilitySet,
    check: HardwareCheck,
) -> VideoEncoder {
    match requested_hardware_encoder(opts, caps) {
        Some(encoder) if check != HardwareCheck::Failed => encoder,
        _ => opts.codec.software_encoder(),
    }
}

/// Build the full invocation for a conversion request
pub fn build_invocation(
    request: &ConversionRequest,
    caps: &CapabilitySet,
    check: HardwareCheck,
) -> EngineInvocation {
    let output = request.output_path();
    EngineInvocation {
        args: build_args(request, &output, caps, check),
        output,
    }
}

/// Build the argument vector. The output path is always the last argument.
pub fn build_args(
    request: &ConversionRequest,
    output: &Path,
    caps: &CapabilitySet,
    check: HardwareCheck,
) -> Vec<String> {
    let mut args = Vec::new();
    match &request.options {
        OptionSet::Video(opts) => {
            push_video_args(&mut args, &request.input, &request.format, opts, caps, check)
        }
        OptionSet::Audio(opts) => push_audio_args(&mut args, &request.input, &request.format, opts),
        OptionSet::Image => push_input(&mut args, &request.input),
    }

    if request.overwrite {
        args.push("-y".to_string());
    }
    args.push(output.display().to_string());
    args
}

fn push_input(args: &mut Vec<String>, input: &Path) {
    args.push("-i".to_string());
    args.push(input.display().to_string());
}

fn push_video_args(
    args: &mut Vec<String>,
    input: &Path,
    format: &str,
    opts: &VideoOptions,
    caps: &CapabilitySet,
    check: HardwareCheck,
) {
    let encoder = plan_video_encoder(opts, caps, check);
    let hardware = encoder.is_hardware();
    let subtitles = opts.subtitles.as_deref().map(subtitles_filter);

    // Hardware decode prefix. Burned-in subtitles need frames in system memory.
    if hardware {
        args.push("-hwaccel".to_string());
        args.push(HWACCEL.to_string());
        if subtitles.is_none() {
            args.push("-hwaccel_output_format".to_string());
            args.push(HWACCEL.to_string());
        }
    }

    push_input(args, input);

    args.push("-c:v".to_string());
    args.push(encoder.ffmpeg_name().to_string());
    args.extend(encoder.rate_control_args().iter().map(|s| s.to_string()));

    let bitrate = opts.bitrate_kbps.get();
    args.push("-b:v".to_string());
    args.push(format!("{}k", bitrate));
    if hardware {
        let peak = format!("{}k", bitrate.saturating_mul(2));
        args.push("-maxrate".to_string());
        args.push(peak.clone());
        args.push("-bufsize".to_string());
        args.push(peak);
    }

    args.push("-r".to_string());
    args.push(opts.frame_rate.get().to_string());

    let mut filters: Vec<String> = Vec::new();
    if opts.hflip {
        filters.push("hflip".to_string());
    }
    if opts.vflip {
        filters.push("vflip".to_string());
    }
    if let Some(sub) = &subtitles {
        filters.push(sub.clone());
    }
    if !filters.is_empty() {
        let chain = filters.join(",");
        let chain = if hardware && subtitles.is_none() {
            format!("hwdownload,format=nv12,{},hwupload_cuda", chain)
        } else {
            chain
        };
        args.push("-vf".to_string());
        args.push(chain);
    }

    args.push("-c:a".to_string());
    args.push(video_audio_codec(format).to_string());
    if let Some(volume) = volume_filter(opts.volume_percent.get()) {
        args.push("-filter:a".to_string());
        args.push(volume);
    }
}

fn push_audio_args(args: &mut Vec<String>, input: &Path, format: &str, opts: &AudioOptions) {
    push_input(args, input);
    args.push("-vn".to_string());

    args.push("-c:a".to_string());
    args.push(audio_codec_for_format(format).to_string());

    if !is_lossless(format) {
        args.push("-b:a".to_string());
        args.push(format!("{}k", opts.bitrate_kbps.get()));
    }

    args.push("-ar".to_string());
    args.push(opts.sample_rate.hz().to_string());

    if opts.mono {
        args.push("-ac".to_string());
        args.push("1".to_string());
    }

    let volume = volume_filter(opts.volume_percent.get());
    let filter = match (opts.normalize, volume) {
        (true, Some(volume)) => Some(format!("loudnorm,{}", volume)),
        (true, None) => Some("loudnorm".to_string()),
        (false, volume) => volume,
    };
    if let Some(filter) = filter {
        args.push("-filter:a".to_string());
        args.push(filter);
    }
}

/// Audio encoder for video containers. WebM cannot carry AAC.
fn video_audio_codec(format: &str) -> &'static str {
    match format {
        "webm" => "libopus",
        _ => "aac",
    }
}

/// Audio encoder for an audio-only target, chosen purely by extension
pub fn audio_codec_for_format(format: &str) -> &'static str {
    match format {
        "mp3" => "libmp3lame",
        "aac" | "m4a" => "aac",
        "flac" => "flac",
        "ogg" => "libvorbis",
        "wav" => "pcm_s16le",
        "wma" => "wmav2",
        _ => "libmp3lame",
    }
}

pub fn is_lossless(format: &str) -> bool {
    matches!(format, "flac" | "wav")
}

/// `volume=X.XX` for a percentage, or `None` when it is effectively 100%
pub fn volume_filter(percent: u32) -> Option<String> {
    if percent.abs_diff(100) <= VOLUME_TOLERANCE_PERCENT {
        return None;
    }
    Some(format!("volume={}.{:02}", percent / 100, percent % 100))
}

/// Subtitle burn-in filter with the path escaped for ffmpeg's two unescaping passes.
///
/// The graph parser strips one level of quoting and backslashes and the option parser
/// strips the next. A colon travels as `\:` inside the quotes; an apostrophe closes the
/// quote and is written as `\\\'` so that `\'` reaches the option parser.
pub fn subtitles_filter(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\\\\\''");
    format!("subtitles='{}'", escaped)
}

/// Build the two stream-copy invocations of split mode: video only, then audio only
pub fn build_split_invocations(request: &ConversionRequest) -> [EngineInvocation; 2] {
    let dir = output_directory(&request.input, request.output_dir.as_deref());
    let stem = file_stem(&request.input);
    let video_out = dir.join(format!("{}_video.{}", stem, request.format));
    let audio_out = dir.join(format!("{}_audio.{}", stem, SPLIT_AUDIO_CONTAINER));

    let copy = |stream_flag: &str, drop_flag: &str, output: PathBuf| {
        let mut args = Vec::new();
        push_input(&mut args, &request.input);
        args.push(stream_flag.to_string());
        args.push("copy".to_string());
        args.push(drop_flag.to_string());
        if request.overwrite {
            args.push("-y".to_string());
        }
        args.push(output.display().to_string());
        EngineInvocation { args, output }
    };

    [
        copy("-c:v", "-an", video_out),
        copy("-c:a", "-vn", audio_out),
    ]
}

/// Render a command line for display.
///
/// The input (the argument after `-i`) and the output (the last argument) are always
/// double-quoted; other arguments are shell-quoted only when they need it.
pub fn format_command_line(program: &Path, args: &[String]) -> String {
    let last = args.len().saturating_sub(1);
    let mut parts = vec![program.display().to_string()];
    for (i, arg) in args.iter().enumerate() {
        let is_path = i == last || (i > 0 && args[i - 1] == "-i");
        if is_path {
            parts.push(format!("\"{}\"", arg.replace('"', "\\\"")));
        } else if !needs_quoting(arg) {
            parts.push(arg.clone());
        } else {
            let quoted = shlex::try_quote(arg)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| format!("\"{}\"", arg));
            parts.push(quoted);
        }
    }
    parts.join(" ")
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
}
