//! Blocking execution of conversions.
//!
//! A [`RunSlot`] is the single live-run handle shared between the worker thread that
//! drives the engine and any number of cancel handles. Cancellation is a state of its
//! own, so the exit path never has to guess why the process died.

use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::ffmpeg_cmd::{build_invocation, build_split_invocations, requested_hardware_encoder};
use super::ffmpeg_info::Engine;
use super::log::{failure_section, write_error_log};
use super::types::{ConversionEvent, ConversionRequest, OptionSet, Outcome, ProgressTracker};
use crate::engine::diagnostics::split_lines;
use crate::engine::error::EngineError;
use crate::engine::hardware::{CapabilitySet, HardwareCheck, probe_feasible};
use crate::engine::probe::probe_duration;

/// Diagnostic lines quoted in the failure message when the log cannot be written
const FAILURE_TAIL_LINES: usize = 10;

#[derive(Debug, Default)]
pub enum SlotState {
    #[default]
    Idle,
    /// Claimed by a run that has no live process right now (probing, between invocations)
    Preparing { run_id: Uuid },
    Running { run_id: Uuid, child: Child },
    /// Cancel requested. The killed child, if any, is kept until it is reaped.
    Cancelled { run_id: Uuid, child: Option<Child> },
}

/// Coarse view of [`SlotState`] for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Preparing,
    Running,
    Cancelling,
}

#[derive(Debug, Clone, Default)]
pub struct RunSlot(Arc<Mutex<SlotState>>);

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panicked holder cannot leave the enum half-written
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> RunPhase {
        match &*self.lock() {
            SlotState::Idle => RunPhase::Idle,
            SlotState::Preparing { .. } => RunPhase::Preparing,
            SlotState::Running { .. } => RunPhase::Running,
            SlotState::Cancelled { .. } => RunPhase::Cancelling,
        }
    }

    pub fn current_run(&self) -> Option<Uuid> {
        match &*self.lock() {
            SlotState::Idle => None,
            SlotState::Preparing { run_id }
            | SlotState::Running { run_id, .. }
            | SlotState::Cancelled { run_id, .. } => Some(*run_id),
        }
    }

    /// Reserve the slot for a new run. Fails while another run is live.
    pub fn claim(&self, run_id: Uuid) -> Result<(), EngineError> {
        let mut state = self.lock();
        match &*state {
            SlotState::Idle => {
                *state = SlotState::Preparing { run_id };
                Ok(())
            }
            _ => Err(EngineError::RunInProgress),
        }
    }

    /// Request cancellation of the live run, killing its process if one is running.
    /// Returns `false` when there is nothing to cancel.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        match std::mem::take(&mut *state) {
            SlotState::Running { run_id, mut child } => {
                if let Err(e) = child.kill() {
                    // Already exited; the exit path still sees the cancellation
                    tracing::debug!(%run_id, error = %e, "kill after exit");
                }
                tracing::info!(%run_id, pid = child.id(), "conversion cancelled");
                *state = SlotState::Cancelled {
                    run_id,
                    child: Some(child),
                };
                true
            }
            SlotState::Preparing { run_id } => {
                tracing::info!(%run_id, "conversion cancelled before launch");
                *state = SlotState::Cancelled { run_id, child: None };
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.lock(), SlotState::Cancelled { .. })
    }

    /// Return to idle, reaping any process still attached to the slot
    pub fn release(&self) {
        let previous = std::mem::take(&mut *self.lock());
        let child = match previous {
            SlotState::Running { child, .. } => {
                let mut child = child;
                let _ = child.kill();
                Some(child)
            }
            SlotState::Cancelled { child, .. } => child,
            _ => None,
        };
        if let Some(mut child) = child {
            let _ = child.wait();
        }
    }
}

/// How one engine invocation ended
#[derive(Debug)]
pub enum EngineExit {
    Exited {
        status: ExitStatus,
        diagnostics: String,
    },
    Cancelled,
}

/// Run the engine once, feeding every diagnostic line to `on_line`.
///
/// The process is registered in `slot` while it runs, so [`RunSlot::cancel`] can kill
/// it. A cancellation seen at any point wins over the exit status.
pub fn run_engine_once(
    engine: &Engine,
    args: &[String],
    slot: &RunSlot,
    run_id: Uuid,
    mut on_line: impl FnMut(&str),
) -> Result<EngineExit, EngineError> {
    if slot.is_cancelled() {
        return Ok(EngineExit::Cancelled);
    }

    let mut child = engine
        .command()
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EngineError::EngineUnavailable {
            program: engine.program().to_path_buf(),
            source,
        })?;
    let stderr = child.stderr.take();

    {
        let mut state = slot.lock();
        if matches!(&*state, SlotState::Cancelled { .. }) {
            drop(state);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(EngineExit::Cancelled);
        }
        tracing::debug!(%run_id, pid = child.id(), "engine started");
        *state = SlotState::Running { run_id, child };
    }

    let mut diagnostics = String::new();
    if let Some(stderr) = stderr {
        let read = split_lines(stderr, |line| {
            diagnostics.push_str(line);
            diagnostics.push('\n');
            on_line(line);
        });
        if let Err(e) = read {
            tracing::warn!(%run_id, error = %e, "diagnostic stream ended early");
        }
    }

    let mut state = slot.lock();
    match std::mem::take(&mut *state) {
        SlotState::Running { mut child, .. } => {
            *state = SlotState::Preparing { run_id };
            drop(state);
            let status = child.wait()?;
            if slot.is_cancelled() {
                return Ok(EngineExit::Cancelled);
            }
            tracing::debug!(%run_id, %status, "engine exited");
            Ok(EngineExit::Exited {
                status,
                diagnostics,
            })
        }
        SlotState::Cancelled { child, .. } => {
            *state = SlotState::Cancelled { run_id, child: None };
            drop(state);
            if let Some(mut child) = child {
                let _ = child.wait();
            }
            Ok(EngineExit::Cancelled)
        }
        other => {
            *state = other;
            Ok(EngineExit::Cancelled)
        }
    }
}

/// Perform one conversion on a slot the caller already claimed, emitting lifecycle
/// events along the way. The slot is idle again before `Finished` is emitted.
pub fn convert(
    engine: &Engine,
    request: &ConversionRequest,
    caps: &CapabilitySet,
    verify_hardware: bool,
    slot: &RunSlot,
    run_id: Uuid,
    emit: &mut dyn FnMut(ConversionEvent),
) -> Outcome {
    let outcome = match &request.options {
        OptionSet::Video(opts) if opts.split_streams => run_split(engine, request, slot, run_id, emit),
        _ => run_single(engine, request, caps, verify_hardware, slot, run_id, emit),
    };

    slot.release();
    match &outcome {
        Outcome::Completed { outputs } => tracing::info!(%run_id, ?outputs, "conversion completed"),
        Outcome::Failed { message, .. } => tracing::warn!(%run_id, %message, "conversion failed"),
        Outcome::Cancelled => tracing::info!(%run_id, "conversion cancelled"),
    }
    emit(ConversionEvent::Finished {
        run_id,
        outcome: outcome.clone(),
    });
    outcome
}

fn hardware_check(
    engine: &Engine,
    request: &ConversionRequest,
    caps: &CapabilitySet,
    verify_hardware: bool,
    run_id: Uuid,
    emit: &mut dyn FnMut(ConversionEvent),
) -> HardwareCheck {
    let OptionSet::Video(opts) = &request.options else {
        return HardwareCheck::Skipped;
    };
    let Some(encoder) = requested_hardware_encoder(opts, caps) else {
        return HardwareCheck::Skipped;
    };
    if !verify_hardware {
        return HardwareCheck::Skipped;
    }

    if probe_feasible(engine, &request.input, encoder) {
        HardwareCheck::Passed
    } else {
        let fallback = opts.codec.software_encoder();
        tracing::warn!(
            %run_id,
            encoder = encoder.ffmpeg_name(),
            fallback = fallback.ffmpeg_name(),
            "hardware encoder failed its trial run; using software"
        );
        emit(ConversionEvent::HardwareFallback {
            run_id,
            encoder,
            fallback,
        });
        HardwareCheck::Failed
    }
}

fn run_single(
    engine: &Engine,
    request: &ConversionRequest,
    caps: &CapabilitySet,
    verify_hardware: bool,
    slot: &RunSlot,
    run_id: Uuid,
    emit: &mut dyn FnMut(ConversionEvent),
) -> Outcome {
    let check = hardware_check(engine, request, caps, verify_hardware, run_id, emit);
    let duration = probe_duration(engine, &request.input);
    let invocation = build_invocation(request, caps, check);
    let command_line = invocation.command_line(engine.program());

    tracing::info!(%run_id, command = %command_line, ?duration, "starting conversion");
    emit(ConversionEvent::Started {
        run_id,
        command_line: command_line.clone(),
    });

    let mut tracker = ProgressTracker::new(duration);
    let result = run_engine_once(engine, &invocation.args, slot, run_id, |line| {
        if let Some(percent) = tracker.observe(line) {
            emit(ConversionEvent::Progress { run_id, percent });
        }
    });

    match result {
        Ok(EngineExit::Exited { status, .. }) if status.success() => {
            if tracker.percent() < 100 {
                emit(ConversionEvent::Progress {
                    run_id,
                    percent: tracker.complete(),
                });
            }
            Outcome::Completed {
                outputs: vec![invocation.output],
            }
        }
        Ok(EngineExit::Exited {
            status,
            diagnostics,
        }) => {
            let body = failure_section(&command_line, &status, &diagnostics);
            failed_outcome(&request.input, &status, &body, &diagnostics)
        }
        Ok(EngineExit::Cancelled) => Outcome::Cancelled,
        Err(e) => Outcome::Failed {
            message: e.to_string(),
            log_path: None,
        },
    }
}

// Stream copy is fast and the two halves have no shared duration, so no progress
// is tracked until both are done.
fn run_split(
    engine: &Engine,
    request: &ConversionRequest,
    slot: &RunSlot,
    run_id: Uuid,
    emit: &mut dyn FnMut(ConversionEvent),
) -> Outcome {
    let invocations = build_split_invocations(request);
    let mut outputs = Vec::with_capacity(invocations.len());
    let mut log_body = String::new();
    let mut failure: Option<(ExitStatus, String)> = None;

    for invocation in invocations {
        let command_line = invocation.command_line(engine.program());
        tracing::info!(%run_id, command = %command_line, "starting stream copy");
        emit(ConversionEvent::Started {
            run_id,
            command_line: command_line.clone(),
        });

        match run_engine_once(engine, &invocation.args, slot, run_id, |_| {}) {
            Ok(EngineExit::Exited { status, .. }) if status.success() => {
                outputs.push(invocation.output)
            }
            Ok(EngineExit::Exited {
                status,
                diagnostics,
            }) => {
                log_body.push_str(&failure_section(&command_line, &status, &diagnostics));
                log_body.push('\n');
                if failure.is_none() {
                    failure = Some((status, diagnostics));
                }
            }
            Ok(EngineExit::Cancelled) => return Outcome::Cancelled,
            Err(e) => {
                return Outcome::Failed {
                    message: e.to_string(),
                    log_path: None,
                };
            }
        }
    }

    match failure {
        Some((status, diagnostics)) => failed_outcome(&request.input, &status, &log_body, &diagnostics),
        None => {
            emit(ConversionEvent::Progress {
                run_id,
                percent: 100,
            });
            Outcome::Completed { outputs }
        }
    }
}

fn failed_outcome(input: &Path, status: &ExitStatus, log_body: &str, diagnostics: &str) -> Outcome {
    match write_error_log(input, log_body) {
        Ok(path) => Outcome::Failed {
            message: format!("ffmpeg exited with {}; details in {}", status, path.display()),
            log_path: Some(path),
        },
        Err(e) => {
            tracing::warn!(error = %e, "could not write the error log");
            Outcome::Failed {
                message: format!(
                    "ffmpeg exited with {}:\n{}",
                    status,
                    tail_lines(diagnostics, FAILURE_TAIL_LINES)
                ),
                log_path: None,
            }
        }
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
