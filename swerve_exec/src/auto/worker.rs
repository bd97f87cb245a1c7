//! Worker thread so that path requests don't block the control tick.

// -----------------------------------------------------------------------------------------------
// INCLUDES
// -----------------------------------------------------------------------------------------------

use std::sync::{
    mpsc::{self, Receiver},
    Arc,
};
use std::thread;

use log::debug;

use crate::loc::Pose;

use super::{params::Destination, trajectory::Trajectory, AutoError, Pathfinder};

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug)]
pub enum WorkerSignal {
    /// The pathfinder produced a trajectory to the destination
    PathFound(Box<Trajectory>),

    /// No trajectory could be produced
    NoPath(AutoError),
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Start a single path request on its own thread, the result is delivered on
/// the returned receiver.
pub(super) fn spawn_request(
    pathfinder: Arc<dyn Pathfinder>,
    start: Pose,
    destination: Destination,
) -> Result<Receiver<WorkerSignal>, AutoError> {
    let (sender, receiver) = mpsc::channel();

    thread::Builder::new()
        .name(format!("path_request_{}", destination.name))
        .spawn(move || {
            debug!("Requesting path to {} from {:?}", destination.name, start);

            let signal = match pathfinder.best_trajectory(&start, &destination) {
                Ok(t) => WorkerSignal::PathFound(Box::new(t)),
                Err(e) => WorkerSignal::NoPath(e),
            };

            // The command may have been dropped or cancelled meanwhile, in
            // which case nobody wants the result.
            if sender.send(signal).is_err() {
                debug!("Path to {} no longer wanted", destination.name);
            }
        })
        .map_err(AutoError::WorkerSpawn)?;

    Ok(receiver)
}
