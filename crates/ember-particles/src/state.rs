//! Timed group transitions
//!
//! A declared [`ParticleGroup`] can give particles in that group a duration
//! and weighted transitions to other groups. The system hands those
//! declarations to a [`StateEngine`], which tracks one state per system index
//! and reports the indices whose state changed on every update.

use crate::rand::ParticleRng;
use ember_core::{GroupId, SimTime};
use std::collections::{BTreeMap, VecDeque};

/// Declaration of a named group and its timed transitions
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleGroup {
    pub name: String,
    /// Time spent in this group before transitioning; negative means forever
    pub duration_ms: i64,
    pub duration_variation_ms: i64,
    /// Target group names with relative weights
    pub to: Vec<(String, f64)>,
}

impl ParticleGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_ms: -1,
            duration_variation_ms: 0,
            to: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: i64, variation_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self.duration_variation_ms = variation_ms;
        self
    }

    pub fn with_transition(mut self, target: impl Into<String>, weight: f64) -> Self {
        self.to.push((target.into(), weight));
        self
    }
}

/// A group's timing as seen by a state engine, with targets resolved to ids
#[derive(Debug, Clone, PartialEq)]
pub struct StateDefinition {
    pub duration_ms: i64,
    pub duration_variation_ms: i64,
    pub transitions: Vec<(GroupId, f64)>,
}

impl Default for StateDefinition {
    fn default() -> Self {
        Self {
            duration_ms: -1,
            duration_variation_ms: 0,
            transitions: Vec::new(),
        }
    }
}

impl StateDefinition {
    /// Duration with variation applied, `None` for states that never end
    fn varied_duration(&self, rng: &mut ParticleRng) -> Option<i64> {
        if self.duration_ms < 0 {
            return None;
        }
        let variation = self.duration_variation_ms as f32;
        let varied = rng.vary(self.duration_ms as f32, variation);
        Some(varied.max(0.0).round() as i64)
    }
}

/// Drives per-particle group states, indexed by system index.
///
/// States are group ids; `set_states` is indexed by group id.
pub trait StateEngine {
    fn set_states(&mut self, states: Vec<StateDefinition>);
    fn count(&self) -> usize;
    fn set_count(&mut self, count: usize);
    /// Enter `state` now and schedule the next transition
    fn start(&mut self, sys_index: usize, state: GroupId);
    /// Stop tracking an index
    fn stop(&mut self, sys_index: usize);
    /// Steer an index toward `goal`. With `jump` the state changes immediately.
    fn set_goal(&mut self, sys_index: usize, goal: GroupId, jump: bool);
    fn cur_state(&self, sys_index: usize) -> Option<GroupId>;
    /// Advance to `now`, returning the indices whose state changed
    fn update(&mut self, now: SimTime) -> Vec<usize>;
    /// Forget every tracked index and rewind to time 0. States are kept.
    fn reset(&mut self);
}

/// Weighted random transitions, with shortest-path steering toward goals
pub struct StochasticEngine {
    states: Vec<StateDefinition>,
    things: Vec<Option<GroupId>>,
    goals: Vec<Option<GroupId>>,
    start_times: Vec<i64>,
    /// Transition time each index is queued under
    scheduled: Vec<Option<i64>>,
    updates: BTreeMap<i64, Vec<usize>>,
    now: i64,
    rng: ParticleRng,
}

impl Default for StochasticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StochasticEngine {
    pub fn new() -> Self {
        Self::with_seed(0x5eed)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            states: Vec::new(),
            things: Vec::new(),
            goals: Vec::new(),
            start_times: Vec::new(),
            scheduled: Vec::new(),
            updates: BTreeMap::new(),
            now: 0,
            rng: ParticleRng::new(seed),
        }
    }

    pub fn goal(&self, sys_index: usize) -> Option<GroupId> {
        self.goals.get(sys_index).copied().flatten()
    }

    /// Time the index entered its current state
    pub fn start_time(&self, sys_index: usize) -> Option<i64> {
        self.things.get(sys_index)?.map(|_| self.start_times[sys_index])
    }

    fn state(&self, id: GroupId) -> Option<&StateDefinition> {
        self.states.get(id.index())
    }

    fn unschedule(&mut self, idx: usize) {
        if let Some(time) = self.scheduled[idx].take() {
            if let Some(bucket) = self.updates.get_mut(&time) {
                bucket.retain(|i| *i != idx);
                if bucket.is_empty() {
                    self.updates.remove(&time);
                }
            }
        }
    }

    fn restart(&mut self, idx: usize) {
        self.unschedule(idx);
        self.start_times[idx] = self.now;
        let Some(state) = self.things[idx] else {
            return;
        };
        let duration = match self.states.get(state.index()) {
            Some(def) => def.varied_duration(&mut self.rng),
            None => None,
        };
        if let Some(duration) = duration {
            let at = self.now + duration;
            self.updates.entry(at).or_default().push(idx);
            self.scheduled[idx] = Some(at);
        }
    }

    /// Hops from `from` to `goal` along transitions, `None` if unreachable
    fn distance(&self, from: GroupId, goal: GroupId) -> Option<usize> {
        if from == goal {
            return Some(0);
        }
        let mut seen = vec![false; self.states.len()];
        let mut queue = VecDeque::from([(from, 0usize)]);
        if let Some(s) = seen.get_mut(from.index()) {
            *s = true;
        }
        while let Some((state, dist)) = queue.pop_front() {
            let Some(def) = self.state(state) else {
                continue;
            };
            for (next, _) in &def.transitions {
                if *next == goal {
                    return Some(dist + 1);
                }
                if let Some(s) = seen.get_mut(next.index()) {
                    if !*s {
                        *s = true;
                        queue.push_back((*next, dist + 1));
                    }
                }
            }
        }
        None
    }

    /// Next step toward the index's goal: a weighted pick among the
    /// transitions lying on a shortest path.
    fn goal_seek(&mut self, current: GroupId, idx: usize) -> Option<GroupId> {
        let goal = self.goals[idx]?;
        if current == goal {
            return Some(current);
        }
        let transitions = self.state(current)?.transitions.clone();
        let reachable: Vec<(GroupId, f64, usize)> = transitions
            .iter()
            .filter_map(|(next, w)| self.distance(*next, goal).map(|d| (*next, *w, d)))
            .collect();
        let best = reachable.iter().map(|(_, _, d)| *d).min()?;
        let options: Vec<(GroupId, f64)> = reachable
            .into_iter()
            .filter(|(_, _, d)| *d == best)
            .map(|(g, w, _)| (g, w))
            .collect();
        if options.len() == 1 {
            return Some(options[0].0);
        }
        let weights: Vec<f64> = options.iter().map(|(_, w)| *w).collect();
        let pick = self.rng.weighted_index(&weights).unwrap_or(0);
        Some(options[pick].0)
    }

    fn next_state(&mut self, current: GroupId, idx: usize) -> GroupId {
        if let Some(next) = self.goal_seek(current, idx) {
            return next;
        }
        let Some(def) = self.state(current) else {
            return current;
        };
        let weights: Vec<f64> = def.transitions.iter().map(|(_, w)| *w).collect();
        match self.rng.weighted_index(&weights) {
            Some(i) => self.states[current.index()].transitions[i].0,
            // No transitions means stay
            None => current,
        }
    }

    fn advance(&mut self, idx: usize) -> bool {
        let Some(current) = self.things[idx] else {
            return false;
        };
        let next = self.next_state(current, idx);
        self.things[idx] = Some(next);
        self.restart(idx);
        next != current
    }
}

impl StateEngine for StochasticEngine {
    fn set_states(&mut self, states: Vec<StateDefinition>) {
        self.states = states;
    }

    fn count(&self) -> usize {
        self.things.len()
    }

    fn set_count(&mut self, count: usize) {
        if count < self.things.len() {
            for idx in count..self.things.len() {
                self.unschedule(idx);
            }
        }
        self.things.resize(count, None);
        self.goals.resize(count, None);
        self.start_times.resize(count, 0);
        self.scheduled.resize(count, None);
    }

    fn start(&mut self, sys_index: usize, state: GroupId) {
        if sys_index >= self.things.len() {
            return;
        }
        self.things[sys_index] = Some(state);
        self.restart(sys_index);
    }

    fn stop(&mut self, sys_index: usize) {
        if sys_index >= self.things.len() {
            return;
        }
        self.unschedule(sys_index);
        self.things[sys_index] = None;
        self.goals[sys_index] = None;
    }

    fn set_goal(&mut self, sys_index: usize, goal: GroupId, jump: bool) {
        if sys_index >= self.things.len() || goal.index() >= self.states.len() {
            return;
        }
        self.goals[sys_index] = Some(goal);
        if jump {
            self.things[sys_index] = Some(goal);
            self.restart(sys_index);
        }
    }

    fn cur_state(&self, sys_index: usize) -> Option<GroupId> {
        self.things.get(sys_index).copied().flatten()
    }

    fn update(&mut self, now: SimTime) -> Vec<usize> {
        self.now = now.as_millis();
        // Only transitions due before this update; ones rescheduled at `now` wait
        let due: Vec<i64> = self.updates.range(..=self.now).map(|(t, _)| *t).collect();
        let mut changed = Vec::new();
        for time in due {
            let Some(bucket) = self.updates.remove(&time) else {
                continue;
            };
            for idx in bucket {
                if self.scheduled[idx] != Some(time) {
                    continue;
                }
                self.scheduled[idx] = None;
                if self.advance(idx) {
                    changed.push(idx);
                }
            }
        }
        changed
    }

    fn reset(&mut self) {
        self.things.clear();
        self.goals.clear();
        self.start_times.clear();
        self.scheduled.clear();
        self.updates.clear();
        self.now = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(id: u32) -> GroupId {
        GroupId(id)
    }

    fn state(duration_ms: i64, transitions: Vec<(GroupId, f64)>) -> StateDefinition {
        StateDefinition {
            duration_ms,
            duration_variation_ms: 0,
            transitions,
        }
    }

    fn ms(v: i64) -> SimTime {
        SimTime::from_millis(v)
    }

    #[test]
    fn group_declaration_builder() {
        let decl = ParticleGroup::new("lit")
            .with_duration(500, 100)
            .with_transition("smoke", 2.0);
        assert_eq!(decl.duration_ms, 500);
        assert_eq!(decl.to, vec![("smoke".to_string(), 2.0)]);
        assert_eq!(ParticleGroup::new("x").duration_ms, -1);
    }

    #[test]
    fn transitions_after_duration() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(-1, vec![]), state(100, vec![(g(2), 1.0)]), state(-1, vec![])]);
        engine.set_count(4);
        engine.start(3, g(1));
        assert_eq!(engine.cur_state(3), Some(g(1)));

        assert!(engine.update(ms(99)).is_empty());
        assert_eq!(engine.update(ms(100)), vec![3]);
        assert_eq!(engine.cur_state(3), Some(g(2)));
        // Forever state never transitions again
        assert!(engine.update(ms(10_000)).is_empty());
    }

    #[test]
    fn no_transitions_means_stay() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(50, vec![])]);
        engine.set_count(1);
        engine.start(0, g(0));
        assert!(engine.update(ms(60)).is_empty());
        assert_eq!(engine.cur_state(0), Some(g(0)));
    }

    #[test]
    fn zero_duration_waits_for_next_update() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(0, vec![(g(1), 1.0)]), state(0, vec![(g(0), 1.0)])]);
        engine.set_count(1);
        engine.start(0, g(0));
        assert_eq!(engine.update(ms(0)), vec![0]);
        assert_eq!(engine.cur_state(0), Some(g(1)));
        assert_eq!(engine.update(ms(1)), vec![0]);
        assert_eq!(engine.cur_state(0), Some(g(0)));
    }

    #[test]
    fn stop_cancels_schedule() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(10, vec![(g(1), 1.0)]), state(-1, vec![])]);
        engine.set_count(2);
        engine.start(1, g(0));
        engine.stop(1);
        assert!(engine.update(ms(100)).is_empty());
        assert_eq!(engine.cur_state(1), None);
    }

    #[test]
    fn restart_replaces_schedule() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(100, vec![(g(1), 1.0)]), state(-1, vec![])]);
        engine.set_count(1);
        engine.start(0, g(0));
        engine.update(ms(80));
        engine.start(0, g(0));
        assert!(engine.update(ms(120)).is_empty());
        assert_eq!(engine.start_time(0), Some(80));
        assert_eq!(engine.update(ms(180)), vec![0]);
    }

    #[test]
    fn reset_rewinds_and_forgets() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(100, vec![(g(1), 1.0)]), state(-1, vec![])]);
        engine.set_count(2);
        engine.start(0, g(0));
        engine.update(ms(10_000));
        engine.start(1, g(0));

        engine.reset();
        assert_eq!(engine.count(), 0);
        assert_eq!(engine.cur_state(1), None);

        engine.set_count(2);
        engine.start(0, g(0));
        assert_eq!(engine.start_time(0), Some(0));
        assert_eq!(engine.update(ms(100)), vec![0]);
        assert_eq!(engine.cur_state(0), Some(g(1)));
    }

    #[test]
    fn goal_follows_shortest_path() {
        // 0 -> {1, 2}, 1 -> 3, 2 -> 4 -> 3
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![
            state(10, vec![(g(1), 1.0), (g(2), 100.0)]),
            state(10, vec![(g(3), 1.0)]),
            state(10, vec![(g(4), 1.0)]),
            state(-1, vec![]),
            state(10, vec![(g(3), 1.0)]),
        ]);
        engine.set_count(1);
        engine.start(0, g(0));
        engine.set_goal(0, g(3), false);
        assert_eq!(engine.goal(0), Some(g(3)));
        engine.update(ms(10));
        assert_eq!(engine.cur_state(0), Some(g(1)));
        engine.update(ms(20));
        assert_eq!(engine.cur_state(0), Some(g(3)));
    }

    #[test]
    fn jump_changes_state_immediately() {
        let mut engine = StochasticEngine::new();
        engine.set_states(vec![state(-1, vec![]), state(-1, vec![])]);
        engine.set_count(1);
        engine.start(0, g(0));
        engine.set_goal(0, g(1), true);
        assert_eq!(engine.cur_state(0), Some(g(1)));
        // Unknown goal is ignored
        engine.set_goal(0, g(9), true);
        assert_eq!(engine.cur_state(0), Some(g(1)));
    }
}
