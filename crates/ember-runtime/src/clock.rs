//! Animation clock driving a simulation once per frame

use ember_core::SimTime;
use std::time::Instant;

/// Lifecycle state of an [`AnimationClock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

/// Tracks elapsed animation time while running.
///
/// Time only advances in the `Running` state. `start` rewinds to zero, `pause`
/// freezes the current time and `resume` continues from it. The clock can be
/// driven from wall-clock time (`tick`) or by explicit deltas (`advance`).
pub struct AnimationClock {
    /// Time since last advance in seconds
    pub delta_time: f64,
    /// Largest frame delta accepted from `tick`, in seconds
    pub max_frame_time: f64,
    /// Elapsed running time in milliseconds (fractional)
    elapsed_ms: f64,
    state: ClockState,
    /// Last tick instant
    last_instant: Instant,
    /// Whether the next tick only establishes a baseline
    first_tick: bool,
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            max_frame_time: 0.25,
            elapsed_ms: 0.0,
            state: ClockState::Stopped,
            last_instant: Instant::now(),
            first_tick: true,
        }
    }
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Rewind to zero and start running
    pub fn start(&mut self) {
        self.elapsed_ms = 0.0;
        self.delta_time = 0.0;
        self.first_tick = true;
        self.state = ClockState::Running;
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
            // Wall-clock time spent paused must not count
            self.first_tick = true;
        }
    }

    /// Current animation time, truncated to whole milliseconds
    pub fn current_time(&self) -> SimTime {
        SimTime::from_millis(self.elapsed_ms.floor() as i64)
    }

    /// Advance from wall-clock time. Call once per frame.
    ///
    /// Returns the new time when running, `None` otherwise.
    pub fn tick(&mut self) -> Option<SimTime> {
        let now = Instant::now();
        if self.state != ClockState::Running {
            return None;
        }

        if self.first_tick {
            self.first_tick = false;
            self.last_instant = now;
            self.delta_time = 0.0;
            return Some(self.current_time());
        }

        let elapsed = now.duration_since(self.last_instant).as_secs_f64();
        self.last_instant = now;
        if elapsed > self.max_frame_time {
            log::debug!(
                "Frame took {elapsed:.3}s, clamping to {:.3}s",
                self.max_frame_time
            );
        }
        self.advance(elapsed.min(self.max_frame_time))
    }

    /// Advance by an explicit delta in seconds (deterministic driving)
    pub fn advance(&mut self, dt: f64) -> Option<SimTime> {
        if self.state != ClockState::Running {
            return None;
        }
        self.delta_time = dt.max(0.0);
        self.elapsed_ms += self.delta_time * 1000.0;
        Some(self.current_time())
    }
}
