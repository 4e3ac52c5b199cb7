#![allow(dead_code)] // Not every test binary uses every helper

use fftool::engine::{
    AudioOptions, ConversionEvent, ConversionRequest, Limits, OptionSet, Outcome, VideoOptions,
};
use fftool::engine::hardware::CapabilitySet;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Every NVENC encoder present
pub fn all_hardware() -> CapabilitySet {
    CapabilitySet {
        h264_nvenc: true,
        hevc_nvenc: true,
        av1_nvenc: true,
    }
}

/// Request with default options for the kind implied by `format`
pub fn request(input: impl AsRef<Path>, format: &str) -> ConversionRequest {
    ConversionRequest::for_format(input.as_ref(), format, &Limits::default())
        .unwrap_or_else(|| panic!("unknown format {format}"))
}

pub fn video_opts(req: &mut ConversionRequest) -> &mut VideoOptions {
    match &mut req.options {
        OptionSet::Video(opts) => opts,
        other => panic!("expected video options, got {:?}", other.kind()),
    }
}

pub fn audio_opts(req: &mut ConversionRequest) -> &mut AudioOptions {
    match &mut req.options {
        OptionSet::Audio(opts) => opts,
        other => panic!("expected audio options, got {:?}", other.kind()),
    }
}

/// The value following `flag` in an argument vector
pub fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_arg(args: &[String], arg: &str) -> bool {
    args.iter().any(|a| a == arg)
}

/// Collect events until `Finished`, failing the test if it never arrives
pub fn collect_until_finished(rx: &Receiver<ConversionEvent>) -> (Vec<ConversionEvent>, Outcome) {
    let mut events = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(20))
            .expect("conversion did not finish in time");
        if let ConversionEvent::Finished { outcome, .. } = &event {
            let outcome = outcome.clone();
            events.push(event);
            return (events, outcome);
        }
        events.push(event);
    }
}

pub fn progress_values(events: &[ConversionEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversionEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

pub fn started_lines(events: &[ConversionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversionEvent::Started { command_line, .. } => Some(command_line.clone()),
            _ => None,
        })
        .collect()
}
