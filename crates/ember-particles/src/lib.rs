//! Ember Particles - Pooled particle simulation driven by explicit time
//!
//! Particles live in named groups of reusable slots:
//! - Free-list slot allocation and an expiry heap per group
//! - Closed-form kinematics evaluated from each particle's birth state
//! - Emitters, affectors and painters plugged in through traits
//! - Optional stochastic group transitions through a state engine
//! - TOML scene files describing a whole system

pub mod affector;
pub mod config;
pub mod curves;
pub mod datum;
pub mod emitter;
pub mod free_list;
pub mod group;
pub mod heap;
pub mod painter;
pub mod rand;
pub mod registry;
pub mod state;
pub mod system;

pub use affector::{Affect, Age, Gravity, GroupGoal, ParticleAffector};
pub use config::{AffectorConfig, GroupConfig, PainterConfig, Scene, SceneConfig, SystemConfig};
pub use datum::{ParticleDatum, ParticleKey, EPSILON};
pub use emitter::{Emitter, EmitterConfig, ParticleEmitter};
pub use group::ParticleGroupData;
pub use painter::{GroupView, ParticlePainter, ParticleVertex, PendingCommits, VertexPainter};
pub use registry::{AffectorId, EmitterId, GroupDeclId, Handle, PainterId, Registry};
pub use state::{ParticleGroup, StateDefinition, StateEngine, StochasticEngine};
pub use system::{ParticleEvent, ParticleSystem, DEFAULT_GROWTH_INCREMENT, DEFAULT_MAX_LIFE_MS};
