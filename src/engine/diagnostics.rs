//! Parsing of ffmpeg's human-readable diagnostic stream (stderr).
//!
//! ffmpeg prints the input header (`Duration: ..., bitrate: ...`, stream lines) once,
//! then rewrites a status line ending in `\r` while encoding. Everything here is
//! pattern matching over that text; nothing depends on ffprobe being installed.

use regex::Regex;
use std::io::{self, Read};
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
});
static BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate:\s*(\d+)\s*kb/s").expect("valid bitrate regex"));
static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*fps").expect("valid fps regex"));
static TBR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*tbr").expect("valid tbr regex"));
static AUDIO_HZ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Audio:.*?(\d+)\s*Hz").expect("valid sample rate regex"));
static AUDIO_KBPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Audio:.*?(\d+)\s*kb/s").expect("valid audio bitrate regex"));
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex")
});

const TIME_MARKER: &str = "time=";

fn hms_to_seconds(caps: &regex::Captures<'_>) -> Option<f64> {
    let h: f64 = caps.get(1)?.as_str().parse().ok()?;
    let m: f64 = caps.get(2)?.as_str().parse().ok()?;
    let s: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Total input duration from the `Duration: HH:MM:SS.ss` header.
/// `Duration: N/A` (live streams, some images) yields `None`.
pub fn parse_duration(text: &str) -> Option<f64> {
    DURATION_RE.captures(text).and_then(|c| hms_to_seconds(&c))
}

/// Overall container bitrate from the header line
pub fn parse_bitrate(text: &str) -> Option<u32> {
    BITRATE_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Video frame rate. Prefers `fps`, falls back to `tbr` when a stream omits it.
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let value = FPS_RE
        .captures(text)
        .or_else(|| TBR_RE.captures(text))?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;
    value.is_finite().then_some(value)
}

pub fn parse_audio_sample_rate(text: &str) -> Option<u32> {
    AUDIO_HZ_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

pub fn parse_audio_bitrate(text: &str) -> Option<u32> {
    AUDIO_KBPS_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// True for status lines that report encoding position
pub fn has_time_marker(line: &str) -> bool {
    line.contains(TIME_MARKER)
}

/// Elapsed output time from a status line (`time=00:01:02.50`).
/// `time=N/A` yields `None`.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    TIME_RE.captures(line).and_then(|c| hms_to_seconds(&c))
}

/// Properties found in an input header. Every field is optional; callers decide defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaHeader {
    pub duration_s: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub frame_rate: Option<f64>,
    pub audio_bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
}

impl MediaHeader {
    pub fn parse(text: &str) -> Self {
        Self {
            duration_s: parse_duration(text),
            bitrate_kbps: parse_bitrate(text),
            frame_rate: parse_frame_rate(text),
            audio_bitrate_kbps: parse_audio_bitrate(text),
            sample_rate_hz: parse_audio_sample_rate(text),
        }
    }
}

/// Read a diagnostic stream, calling `on_line` for every non-empty line.
///
/// Lines end at either `\r` or `\n` so in-place status updates arrive one by one.
/// Invalid UTF-8 is replaced rather than treated as an error.
pub fn split_lines<R: Read>(mut reader: R, mut on_line: impl FnMut(&str)) -> io::Result<()> {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::with_capacity(256);

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &buf[..n] {
            if byte == b'\r' || byte == b'\n' {
                flush_line(&mut pending, &mut on_line);
            } else {
                pending.push(byte);
            }
        }
    }
    flush_line(&mut pending, &mut on_line);
    Ok(())
}

fn flush_line(pending: &mut Vec<u8>, on_line: &mut impl FnMut(&str)) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending);
    let line = line.trim_end();
    if !line.is_empty() {
        on_line(line);
    }
    pending.clear();
}
