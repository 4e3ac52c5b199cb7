// Tests for the background supervisor, driving a fake ffmpeg script
#![cfg(unix)]

use crate::common::fake_engine::{Behaviour, FakeEngine, serial};
use crate::common::helpers::{
    all_hardware, collect_until_finished, progress_values, request, started_lines, video_opts,
};
use fftool::engine::hardware::{CapabilitySet, VideoEncoder};
use fftool::engine::worker::Supervisor;
use fftool::engine::{ConversionEvent, Engine, EngineError, Outcome, RunPhase};
use std::time::{Duration, Instant};

const PROGRESS_TO_END: &str = r#"printf 'frame=  10 fps=0.0 time=00:00:05.00 bitrate=1k speed=2x\r' >&2
printf 'frame=  20 fps=0.0 time=00:00:10.00 bitrate=1k speed=2x\n' >&2
exit 0"#;

const LONG_RUNNING: &str = r#"printf 'frame=1 time=00:00:00.04\r' >&2
exec sleep 30"#;

fn wait_for_phase(supervisor: &Supervisor, phase: RunPhase) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while supervisor.phase() != phase {
        assert!(Instant::now() < deadline, "never reached {:?}", phase);
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_completed_run_reports_progress_from_duration() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: PROGRESS_TO_END,
        ..Default::default()
    });
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    let run_id = supervisor.start(request(&input, "mp4")).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert_eq!(
        outcome,
        Outcome::Completed {
            outputs: vec![fake.dir().join("clip.mp4")]
        }
    );
    assert_eq!(progress_values(&events), vec![50, 100]);
    assert!(matches!(events[0], ConversionEvent::Started { run_id: id, .. } if id == run_id));
    assert_eq!(supervisor.phase(), RunPhase::Idle);

    let started = started_lines(&events);
    assert_eq!(started.len(), 1);
    assert!(started[0].contains("-c:v libx264"));
}

#[test]
fn test_unknown_duration_steps_then_completes() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        probe_header: "Input #0, matroska,webm, from 'live.mkv':\n  Duration: N/A, start: 0.0",
        convert: r#"printf 'time=00:00:01.00\rtime=00:00:02.00\rtime=00:00:03.00\n' >&2
exit 0"#,
        ..Default::default()
    });
    let input = fake.input("live.mkv");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    supervisor.start(request(&input, "mp4")).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert!(outcome.is_success());
    assert_eq!(progress_values(&events), vec![2, 4, 6, 100]);
}

#[test]
fn test_failed_run_writes_log_beside_input() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: r#"echo "Unknown encoder 'libx264'" >&2
exit 1"#,
        ..Default::default()
    });
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    supervisor.start(request(&input, "mkv")).unwrap();
    let (_, outcome) = collect_until_finished(supervisor.receiver());

    let expected_log = fake.dir().join("ffmpeg_error.log");
    match outcome {
        Outcome::Failed { message, log_path } => {
            assert_eq!(log_path.as_deref(), Some(expected_log.as_path()));
            assert!(message.contains("ffmpeg_error.log"), "{message}");
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let log = std::fs::read_to_string(&expected_log).unwrap();
    assert!(log.contains("Unknown encoder 'libx264'"));
    assert!(log.contains("-c:v libx264"));
}

#[test]
fn test_cancel_wins_over_exit_status() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: LONG_RUNNING,
        ..Default::default()
    });
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());
    let handle = supervisor.cancel_handle();

    supervisor.start(request(&input, "mp4")).unwrap();
    wait_for_phase(&supervisor, RunPhase::Running);

    assert!(handle.cancel());
    let (_, outcome) = collect_until_finished(supervisor.receiver());

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(handle.phase(), RunPhase::Idle);
    assert!(!fake.dir().join("ffmpeg_error.log").exists());
    assert!(!handle.cancel(), "nothing left to cancel");
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: LONG_RUNNING,
        ..Default::default()
    });
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    supervisor.start(request(&input, "mp4")).unwrap();
    assert!(supervisor.is_busy());
    let second = supervisor.start(request(&input, "mkv"));
    assert!(matches!(second, Err(EngineError::RunInProgress)));

    wait_for_phase(&supervisor, RunPhase::Running);
    assert!(supervisor.cancel());
    let (_, outcome) = collect_until_finished(supervisor.receiver());
    assert_eq!(outcome, Outcome::Cancelled);

    // Idle again: a new run is accepted
    assert!(!supervisor.is_busy());
}

#[test]
fn test_missing_engine_fails_without_log() {
    let _guard = serial();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.mov");
    let supervisor = Supervisor::new(
        Engine::new(dir.path().join("no-such-ffmpeg")),
        CapabilitySet::default(),
    );

    supervisor.start(request(&input, "mp4")).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    match outcome {
        Outcome::Failed { message, log_path } => {
            assert!(message.contains("failed to launch"), "{message}");
            assert_eq!(log_path, None);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(progress_values(&events).is_empty());
}

#[test]
fn test_split_streams_runs_two_copies() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour::default());
    let input = fake.input("talk.mp4");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    let mut req = request(&input, "mp4");
    video_opts(&mut req).split_streams = true;
    supervisor.start(req).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert_eq!(
        outcome,
        Outcome::Completed {
            outputs: vec![
                fake.dir().join("talk_video.mp4"),
                fake.dir().join("talk_audio.mka"),
            ]
        }
    );
    let started = started_lines(&events);
    assert_eq!(started.len(), 2);
    assert!(started[0].contains("-c:v copy -an"));
    assert!(started[1].contains("-c:a copy -vn"));
}

#[test]
fn test_split_failure_combines_log() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: r#"case "$*" in
  *"-c:a copy"*) echo "no audio stream" >&2; exit 1 ;;
esac
exit 0"#,
        ..Default::default()
    });
    let input = fake.input("silent.mp4");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    let mut req = request(&input, "mkv");
    video_opts(&mut req).split_streams = true;
    supervisor.start(req).unwrap();
    let (_, outcome) = collect_until_finished(supervisor.receiver());

    assert!(matches!(outcome, Outcome::Failed { log_path: Some(_), .. }));
    let log = std::fs::read_to_string(fake.dir().join("ffmpeg_error.log")).unwrap();
    assert!(log.contains("no audio stream"));
}

#[test]
fn test_infeasible_hardware_falls_back_to_software() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        trial: "exit 1",
        ..Default::default()
    });
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), all_hardware());

    let mut req = request(&input, "mp4");
    video_opts(&mut req).hardware = true;
    supervisor.start(req).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(events.iter().any(|e| matches!(
        e,
        ConversionEvent::HardwareFallback {
            encoder: VideoEncoder::H264Nvenc,
            fallback: VideoEncoder::Libx264,
            ..
        }
    )));

    let conversion = fake
        .calls()
        .into_iter()
        .find(|call| call.contains("-c:v") && !call.contains("-frames:v"))
        .expect("conversion call recorded");
    assert!(conversion.contains("-c:v libx264"));
    assert!(!conversion.contains("-hwaccel"));
}

#[test]
fn test_feasible_hardware_is_used() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour::default());
    let input = fake.input("clip.mov");
    let supervisor = Supervisor::new(fake.engine(), all_hardware());

    let mut req = request(&input, "mp4");
    video_opts(&mut req).hardware = true;
    supervisor.start(req).unwrap();
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert!(outcome.is_success());
    assert!(!events
        .iter()
        .any(|e| matches!(e, ConversionEvent::HardwareFallback { .. })));
    let started = started_lines(&events);
    assert!(started[0].starts_with(&format!(
        "{} -hwaccel cuda -hwaccel_output_format cuda",
        fake.engine().program().display()
    )));
    assert!(started[0].contains("-c:v h264_nvenc -preset fast -rc vbr"));
}

#[test]
fn test_cancelled_split_skips_audio_copy() {
    let _guard = serial();
    let fake = FakeEngine::new(Behaviour {
        convert: r#"case "$*" in
  *"-c:v copy"*) exec sleep 30 ;;
esac
exit 0"#,
        ..Default::default()
    });
    let input = fake.input("talk.mp4");
    let supervisor = Supervisor::new(fake.engine(), CapabilitySet::default());

    let mut req = request(&input, "mp4");
    video_opts(&mut req).split_streams = true;
    supervisor.start(req).unwrap();
    wait_for_phase(&supervisor, RunPhase::Running);

    assert!(supervisor.cancel());
    let (events, outcome) = collect_until_finished(supervisor.receiver());

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(started_lines(&events).len(), 1);
    assert!(!fake.calls().iter().any(|call| call.contains("-c:a copy")));
    assert!(!fake.dir().join("ffmpeg_error.log").exists());
    assert_eq!(supervisor.phase(), RunPhase::Idle);
}
