mod bounded;
mod encode;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod types;

pub use bounded::{Bounded, ValueRange};
pub use encode::{EngineExit, RunPhase, RunSlot, SlotState, convert, run_engine_once};
pub use ffmpeg_cmd::{
    CONVERTED_SUFFIX, EngineInvocation, SPLIT_AUDIO_CONTAINER, audio_codec_for_format,
    build_args, build_invocation, build_split_invocations, derive_output_path,
    format_command_line, is_lossless, plan_video_encoder, requested_hardware_encoder,
    subtitles_filter, volume_filter,
};
pub use ffmpeg_info::{Engine, ffmpeg_version};
pub use log::{ERROR_LOG_NAME, error_log_path, failure_section, write_error_log};
pub use types::{
    AUDIO_FORMATS, AudioOptions, ConversionEvent, ConversionRequest, DEFAULT_AUDIO_BITRATE_KBPS,
    DEFAULT_FRAME_RATE, DEFAULT_SAMPLE_RATE, DEFAULT_VIDEO_BITRATE_KBPS, DEFAULT_VOLUME_PERCENT,
    IMAGE_FORMATS, Limits, MediaKind, OptionSet, Outcome, PROGRESS_FALLBACK_STEP, ProgressTracker,
    SAMPLE_RATES, SampleRate, VIDEO_FORMATS, VideoCodec, VideoOptions, normalize_format,
};
