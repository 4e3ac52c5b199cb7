// Background supervisor for a single live conversion

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use uuid::Uuid;

use super::error::EngineError;
use super::hardware::CapabilitySet;
use super::{ConversionEvent, ConversionRequest, Engine, RunPhase, RunSlot, convert};

/// Runs conversions on a background thread and hands their events back over a channel.
///
/// At most one conversion is live at a time; [`Supervisor::start`] rejects a second
/// one with [`EngineError::RunInProgress`].
pub struct Supervisor {
    engine: Engine,
    capabilities: CapabilitySet,
    verify_hardware: bool,
    slot: RunSlot,
    tx: Sender<ConversionEvent>,
    rx: Receiver<ConversionEvent>,
}

impl Supervisor {
    pub fn new(engine: Engine, capabilities: CapabilitySet) -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            engine,
            capabilities,
            verify_hardware: true,
            slot: RunSlot::new(),
            tx,
            rx,
        }
    }

    /// Enable or disable the per-file hardware trial run
    pub fn with_hardware_verification(mut self, verify: bool) -> Self {
        self.verify_hardware = verify;
        self
    }

    /// Get the receiver for conversion events
    pub fn receiver(&self) -> &Receiver<ConversionEvent> {
        &self.rx
    }

    /// A handle that can cancel the live run from any thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: self.slot.clone(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.slot.phase()
    }

    pub fn is_busy(&self) -> bool {
        self.phase() != RunPhase::Idle
    }

    /// Cancel the live run. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// Start converting `request` in the background.
    ///
    /// The slot is claimed before this returns, so a second `start` right after the
    /// first fails even if the worker thread has not been scheduled yet.
    pub fn start(&self, request: ConversionRequest) -> Result<Uuid, EngineError> {
        let run_id = Uuid::new_v4();
        self.slot.claim(run_id)?;

        let engine = self.engine.clone();
        let caps = self.capabilities;
        let verify = self.verify_hardware;
        let slot = self.slot.clone();
        let tx = self.tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("conversion-{}", run_id))
            .spawn(move || {
                let mut emit = |event: ConversionEvent| {
                    // The receiver may be gone if the caller stopped listening
                    let _ = tx.send(event);
                };
                convert(&engine, &request, &caps, verify, &slot, run_id, &mut emit);
            });

        if let Err(e) = spawned {
            self.slot.release();
            return Err(EngineError::Io(e));
        }

        tracing::debug!(%run_id, "conversion dispatched");
        Ok(run_id)
    }
}

/// Cancels whatever run is live on the supervisor it came from
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: RunSlot,
}

impl CancelHandle {
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn phase(&self) -> RunPhase {
        self.slot.phase()
    }
}
