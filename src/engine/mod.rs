// Conversion engine - independent of the front-end

pub mod core;
pub mod diagnostics;
pub mod error;
pub mod hardware;
pub mod probe;
pub mod worker;

pub use core::*;
pub use error::EngineError;
