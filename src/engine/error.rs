use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the conversion engine itself, as opposed to a conversion that ran and failed
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch {}: {source}", program.display())]
    EngineUnavailable {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a conversion is already running")]
    RunInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
