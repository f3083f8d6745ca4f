//! Ember Runtime - Frame driving infrastructure
//!
//! Provides the building blocks that advance a simulation once per frame:
//! - `AnimationClock` - start/stop/pause-aware clock producing millisecond time
//! - `EventBus` - typed event queue drained by whoever owns the frame loop
//! - `RuntimeSystem` - trait for systems ticked by the frame loop

mod clock;
mod event_bus;
mod system;

pub use clock::{AnimationClock, ClockState};
pub use event_bus::EventBus;
pub use system::RuntimeSystem;
