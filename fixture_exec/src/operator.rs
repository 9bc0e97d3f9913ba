//! # Terminal operator
//!
//! Asks the person at the terminal to adjust a sensor, showing them the live
//! reading each time they press enter.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::{self, BufRead, Write};

use eqpt_if::{EqptError, Operator, SensorAdjustRequest};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TermOperator;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Operator for TermOperator {
    fn adjust_sensor(
        &mut self,
        request: &SensorAdjustRequest,
        live: &mut dyn FnMut() -> Result<f64, EqptError>,
    ) -> Result<(), EqptError> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        println!(
            "Adjust sensor {} to between {:.1} um and {:.1} um.",
            request.channel + 1,
            request.min_um,
            request.max_um
        );
        println!("Press enter to update the reading, type 'ok' when done or 'abort' to stop.");

        loop {
            let reading = live()?;
            let marker = if reading >= request.min_um && reading <= request.max_um {
                "in range"
            } else {
                "OUT OF RANGE"
            };
            print!("  sensor {}: {:8.2} um ({}) > ", request.channel + 1, reading, marker);
            io::stdout().flush().ok();

            let line = match lines.next() {
                Some(Ok(l)) => l,
                Some(Err(e)) => return Err(EqptError::comms("terminal", e)),
                None => return Err(EqptError::OperatorAbort),
            };

            match line.trim() {
                "ok" => return Ok(()),
                "abort" => return Err(EqptError::OperatorAbort),
                _ => (),
            }
        }
    }
}
