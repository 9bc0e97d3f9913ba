//! # Sample file recorder
//!
//! Writes every sample as one line of JSON to a file in the session directory.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use eqpt_if::{EqptError, Recorder, Sample};
use log::info;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct JsonRecorder {
    writer: Option<BufWriter<File>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JsonRecorder {
    /// Create a new recorder writing to the given file.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path.as_ref())?;
        info!("Recording samples to {:?}", path.as_ref());
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }
}

impl Recorder for JsonRecorder {
    fn publish_sample(&mut self, sample: &Sample) -> Result<(), EqptError> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Err(EqptError::comms("sample file", "recorder is stopped")),
        };

        serde_json::to_writer(&mut *writer, sample).map_err(|e| EqptError::comms("sample file", e))?;
        writeln!(writer).map_err(|e| EqptError::comms("sample file", e))
    }

    fn stop(&mut self) -> Result<(), EqptError> {
        match self.writer.take() {
            Some(mut w) => w.flush().map_err(|e| EqptError::comms("sample file", e)),
            None => Ok(()),
        }
    }
}
