#![allow(dead_code)]

use fftool::engine::Engine;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that write and execute scripts. Writing an executable while another
/// thread forks can make the exec fail with ETXTBSY.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Header a real ffmpeg prints for a 10 second clip
pub const TEN_SECOND_HEADER: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mov':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 3000 kb/s
  Stream #0:0: Video: h264 (High), yuv420p, 1280x720, 2800 kb/s, 25 fps, 25 tbr, 12800 tbn
  Stream #0:1: Audio: aac (LC), 48000 Hz, stereo, fltp, 160 kb/s
At least one output file must be specified";

/// A shell script standing in for ffmpeg.
///
/// It answers the three kinds of invocation the engine makes: the probe
/// (`-hide_banner -i <file>`), the hardware trial (contains `-frames:v`) and the
/// conversion itself. Every invocation's arguments are appended to `calls.log`.
pub struct FakeEngine {
    dir: TempDir,
    program: PathBuf,
}

pub struct Behaviour<'a> {
    /// Printed on stderr for the probe
    pub probe_header: &'a str,
    /// Shell snippet run for the hardware trial
    pub trial: &'a str,
    /// Shell snippet run for the conversion
    pub convert: &'a str,
}

impl Default for Behaviour<'_> {
    fn default() -> Self {
        Self {
            probe_header: TEN_SECOND_HEADER,
            trial: "exit 0",
            convert: "exit 0",
        }
    }
}

impl FakeEngine {
    pub fn new(behaviour: Behaviour<'_>) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let program = dir.path().join("ffmpeg");

        let header = dir.path().join("header.txt");
        fs::write(&header, behaviour.probe_header).expect("write probe header");

        let script = format!(
            r#"#!/bin/sh
here=$(dirname "$0")
echo "$*" >> "$here/calls.log"
case " $* " in
  *" -frames:v "*)
{trial}
  ;;
esac
if [ "$#" -eq 3 ] && [ "$1" = "-hide_banner" ] && [ "$2" = "-i" ]; then
  cat "$here/header.txt" >&2
  exit 1
fi
{convert}
"#,
            trial = behaviour.trial,
            convert = behaviour.convert,
        );
        fs::write(&program, script).expect("write fake ffmpeg");
        make_executable(&program);

        Self { dir, program }
    }

    pub fn engine(&self) -> Engine {
        Engine::new(&self.program)
    }

    /// Scratch directory for inputs and outputs
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Create an (empty) input file in the scratch directory
    pub fn input(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, b"").expect("write input");
        path
    }

    /// Argument lines of every invocation so far
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod script");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
