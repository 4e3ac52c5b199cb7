use crate::cli::{Cli, Commands, ConvertArgs, KindArg};
use anyhow::{Context, Result, bail};
use fftool::config::Config;
use fftool::engine::hardware::{self, HardwareCheck};
use fftool::engine::probe::{self, ProbeResult};
use fftool::engine::worker::Supervisor;
use fftool::engine::{
    self, Bounded, ConversionEvent, ConversionRequest, Engine, MediaKind, OptionSet, Outcome,
    SampleRate, VideoCodec,
};
use std::io::Write;
use std::process;
use tracing::Level;

pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) {
    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::Capabilities => handle_capabilities(),
        Commands::Probe { file, json } => handle_probe(file, json),
        Commands::DryRun(args) => handle_dry_run(args),
        Commands::Convert(args) => handle_convert(args),
        Commands::InitConfig => handle_init_config(),
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("{:#}; using built-in defaults", e);
        Config::default()
    })
}

fn handle_check_ffmpeg() {
    let engine = load_config().engine();
    match engine::ffmpeg_version(&engine) {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_capabilities() {
    let engine = load_config().engine();
    let caps = hardware::capabilities(&engine);

    let encoders = caps.available_encoders();
    if encoders.is_empty() {
        println!("No NVENC hardware encoders available; conversions use software encoders.");
        return;
    }
    println!("Hardware encoders:");
    for encoder in encoders {
        println!("  {:<12} {}", encoder.ffmpeg_name(), encoder.display_name());
    }
}

fn handle_probe(file: std::path::PathBuf, json: bool) {
    let config = load_config();
    let result = probe::probe(&config.engine(), &file, &config.limits);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        }
        return;
    }

    match result.duration_s {
        Some(duration) => println!("Duration:      {:.2} seconds", duration),
        None => println!("Duration:      unknown"),
    }
    println!("Bitrate:       {} kb/s", result.video_bitrate_kbps);
    println!("Frame rate:    {} fps", result.frame_rate);
    println!("Audio bitrate: {} kb/s", result.audio_bitrate_kbps);
    println!("Sample rate:   {} Hz", result.sample_rate);
}

fn handle_dry_run(args: ConvertArgs) {
    let config = load_config();
    let engine = config.engine();

    let request = match build_request(&config, &engine, &args) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let split = matches!(&request.options, OptionSet::Video(opts) if opts.split_streams);
    if split {
        for invocation in engine::build_split_invocations(&request) {
            println!("{}", invocation.command_line(engine.program()));
        }
    } else {
        // The trial run only happens for real conversions
        let caps = hardware::capabilities(&engine);
        let invocation = engine::build_invocation(&request, caps, HardwareCheck::Skipped);
        println!("{}", invocation.command_line(engine.program()));
    }
}

fn handle_convert(args: ConvertArgs) {
    let config = load_config();
    let engine = config.engine();

    let request = match build_request(&config, &engine, &args) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let caps = *hardware::capabilities(&engine);
    let supervisor =
        Supervisor::new(engine, caps).with_hardware_verification(config.engine.verify_hardware);

    if let Err(e) = supervisor.start(request) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let mut showing_progress = false;
    for event in supervisor.receiver().iter() {
        match event {
            ConversionEvent::Started { command_line, .. } => {
                tracing::debug!("{}", command_line);
            }
            ConversionEvent::HardwareFallback {
                encoder, fallback, ..
            } => {
                eprintln!(
                    "{} is not usable for this file; encoding with {} instead",
                    encoder.display_name(),
                    fallback.display_name()
                );
            }
            ConversionEvent::Progress { percent, .. } => {
                print!("\rProgress: {}%", percent);
                std::io::stdout().flush().ok();
                showing_progress = true;
            }
            ConversionEvent::Finished { outcome, .. } => {
                if showing_progress {
                    println!();
                }
                match outcome {
                    Outcome::Completed { outputs } => {
                        for output in outputs {
                            println!("Converted: {}", output.display());
                        }
                        process::exit(0);
                    }
                    Outcome::Failed { message, .. } => {
                        eprintln!("Conversion failed: {}", message);
                        process::exit(1);
                    }
                    Outcome::Cancelled => {
                        println!("Conversion cancelled");
                        process::exit(1);
                    }
                }
            }
        }
    }
}

fn handle_init_config() {
    match Config::load() {
        Ok(cfg) => {
            match Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            println!("{:#?}", cfg);
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            let cfg = Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            } else {
                match Config::config_path() {
                    Ok(path) => println!("Default config saved to {}", path.display()),
                    Err(e) => println!("Default config saved (path unknown): {:#}", e),
                }
            }
        }
    }
}

/// Turn command-line choices into a request. Numeric options start from the probed
/// values, then the user's text overrides them through the bounded text view.
fn build_request(config: &Config, engine: &Engine, args: &ConvertArgs) -> Result<ConversionRequest> {
    let format = engine::normalize_format(&args.format);
    let kind = match args.kind {
        Some(KindArg::Video) => MediaKind::Video,
        Some(KindArg::Audio) => MediaKind::Audio,
        Some(KindArg::Image) => MediaKind::Image,
        None => MediaKind::from_format(&format)
            .with_context(|| format!("Unknown target format '{}'; pass --kind", format))?,
    };
    if !args.file.exists() {
        bail!("Input file not found: {}", args.file.display());
    }

    let mut options = OptionSet::for_kind(kind, &config.limits);
    match &mut options {
        OptionSet::Video(opts) => {
            let probed = probe_for_seed(engine, args, config);
            opts.seed_from(&probed);
            opts.codec = args
                .codec
                .as_deref()
                .map(VideoCodec::from_name)
                .unwrap_or(config.defaults.video_codec);
            opts.hardware = args.hardware(config.defaults.hardware);
            apply_text(&mut opts.bitrate_kbps, args.bitrate.as_deref(), "--bitrate");
            apply_text(&mut opts.frame_rate, args.fps.as_deref(), "--fps");
            apply_text(&mut opts.volume_percent, args.volume.as_deref(), "--volume");
            opts.hflip = args.hflip;
            opts.vflip = args.vflip;
            opts.subtitles = args.subtitles.clone();
            opts.split_streams = args.split;
        }
        OptionSet::Audio(opts) => {
            let probed = probe_for_seed(engine, args, config);
            opts.seed_from(&probed);
            apply_text(&mut opts.bitrate_kbps, args.audio_bitrate.as_deref(), "--audio-bitrate");
            apply_text(&mut opts.volume_percent, args.volume.as_deref(), "--volume");
            if let Some(hz) = args.sample_rate {
                opts.sample_rate = SampleRate::nearest(hz);
            }
            opts.mono = args.mono;
            opts.normalize = args.normalize;
        }
        OptionSet::Image => {}
    }

    let mut request = ConversionRequest::new(&args.file, &format, options);
    request.output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.defaults.output_dir.clone());
    request.overwrite = args.overwrite || config.defaults.overwrite;
    Ok(request)
}

fn probe_for_seed(engine: &Engine, args: &ConvertArgs, config: &Config) -> ProbeResult {
    probe::probe(engine, &args.file, &config.limits)
}

fn apply_text(value: &mut Bounded, text: Option<&str>, flag: &str) {
    if let Some(text) = text {
        if !value.set_text(text) {
            tracing::warn!("ignoring {} '{}': not a number", flag, text);
        } else if value.text() != text.trim() {
            tracing::info!("{} clamped to {}", flag, value.get());
        }
    }
}
