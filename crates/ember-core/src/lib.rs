//! Ember Core - Foundational types for the Ember particle engine
//!
//! This crate provides the core types that all other Ember crates depend on:
//! - `GroupId` - Stable particle group identifiers
//! - `SimTime` - Authoritative simulation clock value
//! - `Vec2`, `Transform2D`, `ParticleColor` - Spatial and visual types
//! - Error types and Result alias

mod error;
mod id;
mod time;
mod types;

pub use error::{EmberError, Result};
pub use id::GroupId;
pub use time::{rounded_millis, SimTime};
pub use types::{ParticleColor, Transform2D, Vec2};
