use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fftool")]
#[command(about = "Convert video, audio and image files with ffmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg is installed
    CheckFfmpeg,

    /// List the NVENC hardware encoders ffmpeg offers
    Capabilities,

    /// Probe a media file for duration, bitrate, frame rate and sample rate
    Probe {
        /// Path to the media file
        file: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the ffmpeg command(s) for a conversion without executing (dry run)
    DryRun(ConvertArgs),

    /// Convert a file, showing progress
    Convert(ConvertArgs),

    /// Show config status and location, or create default config if missing
    InitConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Video,
    Audio,
    Image,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Input media file
    pub file: PathBuf,

    /// Target format (extension), e.g. mp4, mkv, mp3, flac, png
    #[arg(short, long)]
    pub format: String,

    /// Media kind; inferred from the format when omitted
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Output directory (defaults to the input's directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Video codec: h264, h265, vp9 or av1
    #[arg(long)]
    pub codec: Option<String>,

    /// Use NVENC hardware encoding when available
    #[arg(long, conflicts_with = "no_hw")]
    pub hw: bool,

    /// Use software encoding even when the config enables hardware
    #[arg(long)]
    pub no_hw: bool,

    /// Video bitrate in kb/s (defaults to the probed value)
    #[arg(long)]
    pub bitrate: Option<String>,

    /// Frame rate (defaults to the probed value)
    #[arg(long)]
    pub fps: Option<String>,

    /// Mirror the picture horizontally
    #[arg(long)]
    pub hflip: bool,

    /// Flip the picture vertically
    #[arg(long)]
    pub vflip: bool,

    /// Burn in subtitles from this file
    #[arg(long)]
    pub subtitles: Option<PathBuf>,

    /// Copy video and audio streams into two separate files
    #[arg(long)]
    pub split: bool,

    /// Audio volume in percent (100 = unchanged)
    #[arg(long)]
    pub volume: Option<String>,

    /// Audio bitrate in kb/s for audio conversions (defaults to the probed value)
    #[arg(long)]
    pub audio_bitrate: Option<String>,

    /// Sample rate in Hz for audio conversions, snapped to the nearest supported rate
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Downmix audio to mono
    #[arg(long)]
    pub mono: bool,

    /// Apply EBU R128 loudness normalization
    #[arg(long)]
    pub normalize: bool,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub overwrite: bool,
}

impl ConvertArgs {
    /// Hardware intent: the command-line flags win over the config default
    pub fn hardware(&self, config_default: bool) -> bool {
        match (self.hw, self.no_hw) {
            (true, _) => true,
            (_, true) => false,
            _ => config_default,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
