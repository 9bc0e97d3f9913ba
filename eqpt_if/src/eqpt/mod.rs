//! # Equipment Interface
//!
//! This module defines the traits which equipment drivers shall implement,
//! and the error they report.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod actuation;
pub mod operator;
pub mod recording;
pub mod sensing;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use actuation::{CoarseMotors, PiezoSupply};
pub use operator::{Operator, SensorAdjustRequest};
pub use recording::{Recorder, Sample};
pub use sensing::{Meter, SensorArray};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// A piece of equipment shared between the orchestrating thread and the
/// background control loop.
pub type Shared<T> = Arc<Mutex<T>>;

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// An I/O failure reported by a piece of equipment.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EqptError {
    #[error("Could not communicate with {eqpt}: {msg}")]
    Comms { eqpt: String, msg: String },

    #[error("{eqpt} has no channel {channel}")]
    InvalidChannel { eqpt: String, channel: usize },

    #[error("{eqpt} returned an invalid reading: {msg}")]
    InvalidReading { eqpt: String, msg: String },

    #[error("The lock on {0} was poisoned by a panicking thread")]
    LockPoisoned(String),

    #[error("The operator aborted the procedure")]
    OperatorAbort,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl EqptError {
    /// Shorthand for a communications failure with the named equipment.
    pub fn comms<E: Into<String>, M: std::fmt::Display>(eqpt: E, msg: M) -> Self {
        Self::Comms {
            eqpt: eqpt.into(),
            msg: msg.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Lock a piece of shared equipment.
///
/// A lock poisoned by a panic in another thread is reported as an error
/// rather than propagating the panic.
pub fn lock<'a, T: ?Sized>(
    eqpt: &'a Shared<T>,
    name: &str,
) -> Result<MutexGuard<'a, T>, EqptError> {
    eqpt.lock().map_err(|_| EqptError::LockPoisoned(name.into()))
}
