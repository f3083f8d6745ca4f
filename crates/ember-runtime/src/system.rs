//! Runtime system trait

use ember_core::{Result, SimTime};

/// A system that can be ticked by a frame loop
///
/// `update` runs once per frame with the frame's delta in seconds; the system
/// keeps its own clock and reports the resulting simulation time through
/// `current_time`.
pub trait RuntimeSystem {
    /// Called once before the first frame
    fn initialize(&mut self) -> Result<()>;

    /// Called once per frame
    fn update(&mut self, dt: f64) -> Result<()>;

    /// Called when the frame loop is being shut down
    fn shutdown(&mut self) -> Result<()>;

    /// Simulation time reached by the last update
    fn current_time(&self) -> SimTime;

    /// Human-readable name for this system
    fn name(&self) -> &str;
}
