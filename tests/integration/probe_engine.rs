// Media inspection and capability detection against a fake ffmpeg
#![cfg(unix)]

use crate::common::fake_engine::{Behaviour, FakeEngine, serial};
use fftool::engine::hardware::{self, CapabilitySet, VideoEncoder};
use fftool::engine::probe::{self, ProbeResult};
use fftool::engine::{Limits, ValueRange};

#[test]
fn test_probe_reads_header_from_stderr() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour::default());
    let input = fake.input("clip.mov");

    let result = probe::probe(&fake.engine(), &input, &Limits::default());
    assert_eq!(
        result,
        ProbeResult {
            duration_s: Some(10.0),
            video_bitrate_kbps: 3000,
            frame_rate: 25,
            audio_bitrate_kbps: 160,
            sample_rate: 48_000,
        }
    );
    assert_eq!(probe::probe_duration(&fake.engine(), &input), Some(10.0));
}

#[test]
fn test_probe_clamps_to_caller_limits() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour::default());
    let input = fake.input("clip.mov");
    let limits = Limits {
        video_bitrate_kbps: ValueRange::new(100, 1500),
        frame_rate: ValueRange::new(30, 60),
        ..Limits::default()
    };

    let result = probe::probe(&fake.engine(), &input, &limits);
    assert_eq!(result.video_bitrate_kbps, 1500);
    assert_eq!(result.frame_rate, 30);
}

#[test]
fn test_probe_of_unrecognized_file_uses_defaults() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        probe_header: "notes.txt: Invalid data found when processing input",
        ..Default::default()
    });
    let input = fake.input("notes.txt");

    let result = probe::probe(&fake.engine(), &input, &Limits::default());
    assert_eq!(result, ProbeResult::default());
}

#[test]
fn test_capabilities_from_encoder_listing() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: r#"case "$*" in
  *-encoders*) printf ' V....D libx264   H.264\n V....D hevc_nvenc  NVIDIA NVENC hevc encoder\n'; exit 0 ;;
esac
exit 1"#,
        ..Default::default()
    });

    let caps = CapabilitySet::detect(&fake.engine());
    assert!(caps.hevc_nvenc);
    assert!(!caps.h264_nvenc);
    assert!(!caps.av1_nvenc);
    assert_eq!(caps.available_encoders(), vec![VideoEncoder::HevcNvenc]);
}

#[test]
fn test_capabilities_failed_listing_means_no_hardware() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: "echo h264_nvenc; exit 1",
        ..Default::default()
    });
    assert_eq!(CapabilitySet::detect(&fake.engine()), CapabilitySet::default());
}

#[test]
fn test_trial_run_verdicts() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour::default());
    let input = fake.input("clip.mov");
    assert!(hardware::probe_feasible(&fake.engine(), &input, VideoEncoder::H264Nvenc));

    let failing = FakeEngine::new(Behaviour {
        trial: "exit 1",
        ..Default::default()
    });
    assert!(!hardware::probe_feasible(&failing.engine(), &input, VideoEncoder::H264Nvenc));

    // Exits 0 but complains, as some driver mismatches do
    let complaining = FakeEngine::new(Behaviour {
        trial: "echo '[h264_nvenc @ 0x5581] No capable devices found' >&2; exit 0",
        ..Default::default()
    });
    assert!(!hardware::probe_feasible(&complaining.engine(), &input, VideoEncoder::H264Nvenc));
}
