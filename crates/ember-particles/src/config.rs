//! Scene files: a particle system and its collaborators described in TOML
//!
//! ```toml
//! [system]
//! max_life_ms = 600000
//!
//! [[group]]
//! name = "lit"
//! duration_ms = 400
//! to = { smoke = 1.0 }
//!
//! [[emitter]]
//! group = "lit"
//! emit_rate = 50
//!
//! [[affector]]
//! kind = "gravity"
//! magnitude = 30
//!
//! [[painter]]
//! groups = ["lit", "smoke"]
//! ```

use crate::affector::{Age, GroupGoal, Gravity, ParticleAffector};
use crate::emitter::{parse_color, Emitter, EmitterConfig};
use crate::painter::VertexPainter;
use crate::registry::{AffectorId, EmitterId, PainterId};
use crate::state::ParticleGroup;
use crate::system::{ParticleSystem, DEFAULT_GROWTH_INCREMENT, DEFAULT_MAX_LIFE_MS};
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Upper bound accepted for rates and durations
const MAX_CONFIG_VALUE: f64 = 1.0e9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub running: bool,
    pub paused: bool,
    pub max_life_ms: i64,
    pub growth_increment: usize,
    /// Raise log output to debug level while this scene runs
    pub debug: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            running: true,
            paused: false,
            max_life_ms: DEFAULT_MAX_LIFE_MS,
            growth_increment: DEFAULT_GROWTH_INCREMENT,
            debug: false,
        }
    }
}

/// A declared group with timed transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default = "forever")]
    pub duration_ms: i64,
    #[serde(default)]
    pub duration_variation_ms: i64,
    /// Target group name to relative weight
    #[serde(default)]
    pub to: BTreeMap<String, f64>,
}

fn forever() -> i64 {
    -1
}

impl GroupConfig {
    pub fn to_declaration(&self) -> ParticleGroup {
        let mut group = ParticleGroup::new(self.name.clone())
            .with_duration(self.duration_ms, self.duration_variation_ms);
        for (target, weight) in &self.to {
            group = group.with_transition(target.clone(), *weight);
        }
        group
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeConfig {
    pub groups: Vec<String>,
    pub enabled: bool,
    pub once_off: bool,
    pub life_left_ms: i64,
    pub advance_position: bool,
}

impl Default for AgeConfig {
    fn default() -> Self {
        let age = Age::default();
        Self {
            groups: age.groups,
            enabled: age.enabled,
            once_off: age.once_off,
            life_left_ms: age.life_left_ms,
            advance_position: age.advance_position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    pub groups: Vec<String>,
    pub enabled: bool,
    pub magnitude: f32,
    pub angle: f32,
}

impl Default for GravityConfig {
    fn default() -> Self {
        let gravity = Gravity::default();
        Self {
            groups: gravity.groups,
            enabled: gravity.enabled,
            magnitude: gravity.magnitude,
            angle: gravity.angle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupGoalConfig {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub goal_state: String,
    #[serde(default)]
    pub jump: bool,
}

fn enabled() -> bool {
    true
}

/// One `[[affector]]` table, selected by its `kind` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AffectorConfig {
    Age(AgeConfig),
    Gravity(GravityConfig),
    GroupGoal(GroupGoalConfig),
}

impl AffectorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AffectorConfig::Age(_) => "age",
            AffectorConfig::Gravity(_) => "gravity",
            AffectorConfig::GroupGoal(_) => "group_goal",
        }
    }

    pub fn groups(&self) -> &[String] {
        match self {
            AffectorConfig::Age(c) => &c.groups,
            AffectorConfig::Gravity(c) => &c.groups,
            AffectorConfig::GroupGoal(c) => &c.groups,
        }
    }

    pub fn build(&self) -> Box<dyn ParticleAffector> {
        match self {
            AffectorConfig::Age(c) => Box::new(Age {
                groups: c.groups.clone(),
                enabled: c.enabled,
                once_off: c.once_off,
                life_left_ms: c.life_left_ms,
                advance_position: c.advance_position,
            }),
            AffectorConfig::Gravity(c) => Box::new(Gravity {
                groups: c.groups.clone(),
                enabled: c.enabled,
                magnitude: c.magnitude,
                angle: c.angle,
            }),
            AffectorConfig::GroupGoal(c) => {
                let mut goal = GroupGoal::new(c.goal_state.clone());
                goal.groups = c.groups.clone();
                goal.enabled = c.enabled;
                goal.jump = c.jump;
                Box::new(goal)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PainterConfig {
    /// Groups drawn, the default group when empty
    pub groups: Vec<String>,
    /// Hex RGB color claimed for drawn particles
    pub color: Option<String>,
}

/// A complete scene file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub system: SystemConfig,
    #[serde(rename = "group")]
    pub groups: Vec<GroupConfig>,
    #[serde(rename = "emitter")]
    pub emitters: Vec<EmitterConfig>,
    #[serde(rename = "affector")]
    pub affectors: Vec<AffectorConfig>,
    #[serde(rename = "painter")]
    pub painters: Vec<PainterConfig>,
}

/// A built scene: the system plus handles to what the scene registered
pub struct Scene {
    pub system: ParticleSystem,
    pub emitters: Vec<EmitterId>,
    pub affectors: Vec<AffectorId>,
    pub painters: Vec<PainterId>,
}

impl SceneConfig {
    /// Parse and validate a scene
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let scene: SceneConfig = toml::from_str(text)?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading scene {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Every group name the scene mentions, declared or not
    pub fn group_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let mut add = |name: &str| {
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        };
        add("");
        for g in &self.groups {
            add(&g.name);
        }
        for e in &self.emitters {
            add(&e.group);
        }
        for a in &self.affectors {
            a.groups().iter().for_each(|n| add(n));
            if let AffectorConfig::GroupGoal(c) = a {
                add(&c.goal_state);
            }
        }
        for p in &self.painters {
            p.groups.iter().for_each(|n| add(n));
        }
        names
    }

    pub fn validate(&self) -> Result<()> {
        check_range("system.max_life_ms", self.system.max_life_ms as f64, 1.0)?;
        check_range(
            "system.growth_increment",
            self.system.growth_increment as f64,
            1.0,
        )?;

        let mut declared = HashSet::new();
        for g in &self.groups {
            if !declared.insert(g.name.as_str()) {
                return Err(EmberError::DuplicateGroup(g.name.clone()));
            }
            check_range(
                &format!("group.{}.duration_variation_ms", g.name),
                g.duration_variation_ms as f64,
                0.0,
            )?;
        }

        let known = self.group_names();
        for g in &self.groups {
            for (target, weight) in &g.to {
                if !known.contains(target) {
                    return Err(EmberError::UnknownGroup(target.clone()));
                }
                check_range(&format!("group.{}.to.{target}", g.name), *weight, 0.0)?;
            }
        }

        for (i, e) in self.emitters.iter().enumerate() {
            check_range(&format!("emitter[{i}].emit_rate"), e.emit_rate as f64, 0.0)?;
            check_range(
                &format!("emitter[{i}].life_span_ms"),
                e.life_span_ms as f64,
                0.0,
            )?;
            check_range(
                &format!("emitter[{i}].life_span_variation_ms"),
                e.life_span_variation_ms as f64,
                0.0,
            )?;
            check_color(e.color.as_deref())?;
        }

        for p in &self.painters {
            check_color(p.color.as_deref())?;
        }
        Ok(())
    }

    /// Build a ready-to-run system: collaborators registered, construction
    /// completed, running and paused flags applied.
    pub fn build(&self) -> Result<Scene> {
        self.validate()?;
        let mut system =
            ParticleSystem::with_limits(self.system.max_life_ms, self.system.growth_increment);

        for g in &self.groups {
            system.register_group(g.to_declaration());
        }
        let emitters = self
            .emitters
            .iter()
            .map(|c| system.register_emitter(Box::new(Emitter::new(c.clone()))))
            .collect();
        let affectors = self
            .affectors
            .iter()
            .map(|c| system.register_affector(c.build()))
            .collect();
        let painters = self
            .painters
            .iter()
            .map(|c| {
                let mut painter = VertexPainter::new(c.groups.clone());
                if let Some(color) = c.color.as_deref().and_then(parse_color) {
                    painter = painter.with_color(color);
                }
                system.register_painter(Box::new(painter))
            })
            .collect();

        system.set_running(self.system.running);
        system.set_paused(self.system.paused);
        system.component_complete();
        system.drain_events();

        log::debug!(
            "Built scene: {} groups, {} particles",
            system.groups().len(),
            system.particle_count()
        );
        Ok(Scene {
            system,
            emitters,
            affectors,
            painters,
        })
    }
}

fn check_range(field: &str, value: f64, min: f64) -> Result<()> {
    if value.is_finite() && (min..=MAX_CONFIG_VALUE).contains(&value) {
        return Ok(());
    }
    Err(EmberError::ValueOutOfRange {
        field: field.to_string(),
        min,
        max: MAX_CONFIG_VALUE,
        value,
    })
}

fn check_color(color: Option<&str>) -> Result<()> {
    match color {
        Some(text) if parse_color(text).is_none() => {
            Err(EmberError::ParseError(format!("invalid color {text:?}")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{GroupId, SimTime};

    const FIREWORK: &str = r##"
[system]
growth_increment = 5

[[group]]
name = "lit"
duration_ms = 400
to = { smoke = 1.0 }

[[group]]
name = "smoke"

[[emitter]]
group = "lit"
emit_rate = 10
life_span_ms = 2000
color = "#ff8800"

[[affector]]
kind = "gravity"
groups = ["smoke"]
magnitude = 30

[[affector]]
kind = "age"
groups = ["spent"]

[[painter]]
groups = ["lit", "smoke"]
color = "#ffffff"
"##;

    #[test]
    fn parses_full_scene() {
        let scene = SceneConfig::from_toml_str(FIREWORK).unwrap();
        assert!(scene.system.running);
        assert_eq!(scene.system.max_life_ms, DEFAULT_MAX_LIFE_MS);
        assert_eq!(scene.system.growth_increment, 5);
        assert_eq!(scene.groups.len(), 2);
        assert_eq!(scene.groups[1].duration_ms, -1);
        assert_eq!(scene.groups[0].to.get("smoke"), Some(&1.0));
        assert_eq!(scene.emitters[0].emit_rate, 10.0);
        assert_eq!(scene.emitters[0].size, 16.0);
        assert_eq!(scene.affectors.len(), 2);
        assert_eq!(scene.affectors[0].kind(), "gravity");
        match &scene.affectors[1] {
            AffectorConfig::Age(age) => {
                assert!(age.once_off);
                assert_eq!(age.life_left_ms, 0);
            }
            other => panic!("expected age, got {other:?}"),
        }
        assert_eq!(scene.group_names(), vec!["", "lit", "smoke", "spent"]);
    }

    #[test]
    fn empty_scene_is_valid() {
        let scene = SceneConfig::from_toml_str("").unwrap();
        assert_eq!(scene, SceneConfig::default());
    }

    #[test]
    fn unknown_affector_kind() {
        let err = SceneConfig::from_toml_str("[[affector]]\nkind = \"wander\"\n").unwrap_err();
        assert!(matches!(err, EmberError::TomlParseError(_)));
    }

    #[test]
    fn group_goal_needs_target() {
        let err = SceneConfig::from_toml_str("[[affector]]\nkind = \"group_goal\"\n").unwrap_err();
        assert!(matches!(err, EmberError::TomlParseError(_)));
    }

    #[test]
    fn duplicate_group() {
        let err = SceneConfig::from_toml_str("[[group]]\nname = \"a\"\n[[group]]\nname = \"a\"\n")
            .unwrap_err();
        assert!(matches!(err, EmberError::DuplicateGroup(name) if name == "a"));
    }

    #[test]
    fn transition_to_unknown_group() {
        let err = SceneConfig::from_toml_str("[[group]]\nname = \"a\"\nto = { nowhere = 1.0 }\n")
            .unwrap_err();
        assert!(matches!(err, EmberError::UnknownGroup(name) if name == "nowhere"));
    }

    #[test]
    fn negative_rate_rejected() {
        let err = SceneConfig::from_toml_str("[[emitter]]\nemit_rate = -1\n").unwrap_err();
        match err {
            EmberError::ValueOutOfRange { field, value, .. } => {
                assert_eq!(field, "emitter[0].emit_rate");
                assert_eq!(value, -1.0);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn bad_color_rejected() {
        let err = SceneConfig::from_toml_str("[[painter]]\ncolor = \"orange\"\n").unwrap_err();
        assert!(matches!(err, EmberError::ParseError(_)));
    }

    #[test]
    fn zero_growth_rejected() {
        let err = SceneConfig::from_toml_str("[system]\ngrowth_increment = 0\n").unwrap_err();
        assert!(matches!(err, EmberError::ValueOutOfRange { .. }));
    }

    #[test]
    fn builds_running_system() {
        let mut scene = SceneConfig::from_toml_str(FIREWORK).unwrap().build().unwrap();
        let sys = &mut scene.system;
        assert!(sys.is_initialized());
        assert!(sys.state_engine().is_some());
        assert_eq!(scene.emitters.len(), 1);
        assert_eq!(scene.affectors.len(), 2);
        assert_eq!(scene.painters.len(), 1);
        assert!(sys.drain_events().is_empty());

        let lit = sys.group_id("lit").unwrap();
        let smoke = sys.group_id("smoke").unwrap();
        assert_eq!(sys.group(lit).unwrap().size(), 20);
        assert_eq!(sys.painter(scene.painters[0]).unwrap().count(), 20);

        sys.update_current_time(SimTime::ZERO);
        sys.update_current_time(SimTime::from_millis(1000));
        assert_eq!(sys.group(lit).unwrap().allocated(), 10);
        assert_eq!(sys.group(smoke).unwrap().allocated(), 0);

        // The first batch entered "lit" at 1000ms and leaves 400ms later
        sys.update_current_time(SimTime::from_millis(1400));
        assert_eq!(sys.group(smoke).unwrap().allocated(), 10);
        assert!(sys.group(lit).unwrap().allocated() > 0);
        assert_eq!(sys.group(GroupId::DEFAULT).unwrap().allocated(), 0);
    }

    #[test]
    fn stopped_scene_waits_for_start() {
        let text = "[system]\nrunning = false\n[[emitter]]\nemit_rate = 10\n";
        let mut scene = SceneConfig::from_toml_str(text).unwrap().build().unwrap();
        assert!(!scene.system.is_running());
        assert!(!scene.system.is_initialized());
        scene.system.start();
        assert!(scene.system.is_initialized());
        assert_eq!(scene.system.group(GroupId::DEFAULT).unwrap().size(), 10);
    }

    #[test]
    fn paused_scene_holds_clock() {
        let scene = SceneConfig::from_toml_str("[system]\npaused = true\n")
            .unwrap()
            .build()
            .unwrap();
        assert!(scene.system.is_paused());
        assert_eq!(
            scene.system.clock().state(),
            ember_runtime::ClockState::Paused
        );
    }

    #[test]
    fn demo_scene_runs() {
        let text = include_str!("../../../demos/firework.toml");
        let mut scene = SceneConfig::from_toml_str(text).unwrap().build().unwrap();
        assert_eq!(scene.painters.len(), 2);
        for step in 1..=120 {
            scene.system.update_current_time(SimTime::from_millis(step * 50));
        }
        let alive: usize = scene.system.groups().iter().map(|g| g.allocated()).sum();
        assert!(alive > 0);
        assert!(scene.system.group_id("spark").is_some());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SceneConfig::load("/nonexistent/scene.toml").unwrap_err();
        assert!(matches!(err, EmberError::IoError(_)));
    }
}
