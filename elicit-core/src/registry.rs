//! Reference point registry: the scheduler that picks the next goal.
//!
//! Selection is deterministic: candidates are every goal that is not yet
//! complete and not blocked by an incomplete dependency, ranked by
//! - priority ASC (P0 first)
//! - state rank ASC (IN_PROGRESS before NOT_STARTED)
//! - required before optional
//! - insertion order (first-seen wins ties)
//!
//! The dependency graph is checked lazily at selection time; cycles and
//! dangling edges are rejected once, when the registry is built.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::criteria::ValidatorTable;
use crate::error::RegistryError;
use crate::reference_point::{GoalState, Priority, ReferencePoint};

/// Completion aggregate, recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total_goals: usize,
    pub completed_goals: usize,
    pub in_progress_goals: usize,
    pub not_started_goals: usize,
    pub overall_completion: f64,
    /// P0 tier is non-empty and fully complete.
    pub critical_completed: bool,
    /// P1 tier is non-empty and fully complete.
    pub important_completed: bool,
}

impl Progress {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a ReferencePoint>) -> Self {
        let mut total = 0usize;
        let mut completed = 0usize;
        let mut in_progress = 0usize;
        let mut not_started = 0usize;
        // (tier size, tier completed)
        let mut critical = (0usize, 0usize);
        let mut important = (0usize, 0usize);

        for p in points {
            total += 1;
            match p.state {
                GoalState::NotStarted => not_started += 1,
                GoalState::InProgress => in_progress += 1,
                GoalState::Completed | GoalState::Validated | GoalState::Enriched => completed += 1,
            }
            let tier = match p.priority {
                Priority::P0Critical => Some(&mut critical),
                Priority::P1Important => Some(&mut important),
                Priority::P2Desirable | Priority::P3Optional => None,
            };
            if let Some((size, done)) = tier {
                *size += 1;
                if p.is_complete() {
                    *done += 1;
                }
            }
        }

        let overall_completion = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        Self {
            total_goals: total,
            completed_goals: completed,
            in_progress_goals: in_progress,
            not_started_goals: not_started,
            overall_completion,
            // An empty tier is never "complete".
            critical_completed: critical.0 > 0 && critical.0 == critical.1,
            important_completed: important.0 > 0 && important.0 == important.1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RegistryRecord", into = "RegistryRecord")]
pub struct ReferencePointRegistry {
    points: HashMap<String, ReferencePoint>,
    /// First-seen insertion order, the final tie-break.
    order: Vec<String>,
    validators: ValidatorTable,
}

/// Plain persisted form: goals in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub points: Vec<ReferencePoint>,
}

impl TryFrom<RegistryRecord> for ReferencePointRegistry {
    type Error = RegistryError;

    fn try_from(record: RegistryRecord) -> Result<Self, Self::Error> {
        Self::from_points(record.points)
    }
}

impl From<ReferencePointRegistry> for RegistryRecord {
    fn from(registry: ReferencePointRegistry) -> Self {
        let ReferencePointRegistry {
            mut points, order, ..
        } = registry;
        RegistryRecord {
            points: order.iter().filter_map(|id| points.remove(id)).collect(),
        }
    }
}

impl ReferencePointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate in one step.
    pub fn from_points(points: impl IntoIterator<Item = ReferencePoint>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for p in points {
            registry.add(p);
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn with_validators(mut self, validators: ValidatorTable) -> Self {
        self.validators = validators;
        self
    }

    pub fn set_validators(&mut self, validators: ValidatorTable) {
        self.validators = validators;
    }

    pub fn validators(&self) -> &ValidatorTable {
        &self.validators
    }

    /// Insert by id. A duplicate id overwrites the earlier goal but keeps its slot.
    pub fn add(&mut self, point: ReferencePoint) {
        let id = point.id.clone();
        if self.points.insert(id.clone(), point).is_some() {
            warn!(goal_id = %id, "duplicate reference point id; overwriting");
        } else {
            self.order.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ReferencePoint> {
        self.points.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ReferencePoint> {
        self.points.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Goals in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ReferencePoint> {
        self.order.iter().filter_map(|id| self.points.get(id))
    }

    /// Reject dangling `depends_on` edges and dependency cycles.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for p in self.iter() {
            if let Some(missing) = p.depends_on.iter().find(|d| !self.points.contains_key(*d)) {
                return Err(RegistryError::UnknownDependency {
                    goal: p.id.clone(),
                    missing: missing.clone(),
                });
            }
        }

        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();
        for id in &self.order {
            if !visited.contains(id.as_str())
                && self.find_cycle(id, &mut visited, &mut on_stack, &mut path)
            {
                return Err(RegistryError::DependencyCycle { path });
            }
        }
        Ok(())
    }

    fn find_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
        path: &mut Vec<String>,
    ) -> bool {
        visited.insert(id);
        on_stack.insert(id);
        path.push(id.to_string());

        if let Some(p) = self.points.get(id) {
            for dep in &p.depends_on {
                if on_stack.contains(dep.as_str()) {
                    if let Some(start) = path.iter().position(|x| x == dep) {
                        path.drain(..start);
                    }
                    path.push(dep.clone());
                    return true;
                }
                if !visited.contains(dep.as_str()) && self.find_cycle(dep, visited, on_stack, path) {
                    return true;
                }
            }
        }

        on_stack.remove(id);
        path.pop();
        false
    }

    fn completed_ids(&self) -> HashSet<&str> {
        self.points
            .values()
            .filter(|p| p.is_complete())
            .map(|p| p.id.as_str())
            .collect()
    }

    /// A goal is blocked while any of its dependencies is incomplete (or missing).
    pub fn is_blocked(&self, id: &str) -> bool {
        match self.points.get(id) {
            Some(p) => p.depends_on.iter().any(|d| !self.points.get(d).is_some_and(|dp| dp.is_complete())),
            None => true,
        }
    }

    /// Next goal to pursue, or `None` when nothing is eligible.
    pub fn select_next(&self, exclude_completed: bool) -> Option<&ReferencePoint> {
        self.select_next_skipping(exclude_completed, &HashSet::new())
    }

    /// Like [`select_next`](Self::select_next) but also passes over `skip`.
    pub fn select_next_skipping(
        &self,
        exclude_completed: bool,
        skip: &HashSet<String>,
    ) -> Option<&ReferencePoint> {
        let completed = self.completed_ids();
        let mut candidates: Vec<(usize, &ReferencePoint)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| self.points.get(id).map(|p| (seq, p)))
            .filter(|(_, p)| !(exclude_completed && p.is_complete()))
            .filter(|(_, p)| !skip.contains(&p.id))
            .filter(|(_, p)| p.depends_on.iter().all(|d| completed.contains(d.as_str())))
            .collect();

        candidates.sort_by(|a, b| scheduling_order(a.1, b.1).then(a.0.cmp(&b.0)));
        let next = candidates.first().map(|(_, p)| *p);
        debug!(
            candidates = candidates.len(),
            next = next.map(|p| p.id.as_str()).unwrap_or("-"),
            "select_next"
        );
        next
    }

    /// Force a goal to COMPLETED, bypassing its criteria.
    pub fn mark_completed(&mut self, id: &str, confidence: f64) -> Result<(), RegistryError> {
        let point = self
            .points
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownGoal(id.to_string()))?;
        point.mark_completed(confidence);
        let unblocked = self.enabled_by(id);
        debug!(goal_id = %id, confidence, ?unblocked, "goal marked completed");
        Ok(())
    }

    /// Write a value into a goal and re-evaluate it. Returns `true` on completion.
    pub fn record(&mut self, id: &str, key: &str, value: &str) -> Result<bool, RegistryError> {
        let point = self
            .points
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownGoal(id.to_string()))?;
        let completed = point.record(key, value, &self.validators);
        if completed {
            let unblocked = self.enabled_by(id);
            debug!(goal_id = %id, ?unblocked, "goal completed");
        }
        Ok(completed)
    }

    /// Pre-seed data without any state transition (hardcoded answers).
    pub fn seed(&mut self, id: &str, key: &str, value: &str) -> Result<(), RegistryError> {
        let point = self
            .points
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownGoal(id.to_string()))?;
        point.collected_data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Goals that list `id` in `enables` or depend on it.
    pub fn enabled_by(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .points
            .get(id)
            .map(|p| p.enables.iter().map(String::as_str).collect())
            .unwrap_or_default();
        for p in self.iter() {
            if p.depends_on.contains(id) && !out.contains(&p.id.as_str()) {
                out.push(&p.id);
            }
        }
        out
    }

    pub fn progress(&self) -> Progress {
        Progress::from_points(self.points.values())
    }

    pub fn can_stop(&self, min_completion: f64) -> bool {
        let p = self.progress();
        p.critical_completed && p.important_completed && p.overall_completion >= min_completion
    }

    /// Incomplete goals of one tier, in scheduling order.
    pub fn incomplete_by_priority(&self, tier: Priority) -> Vec<&ReferencePoint> {
        let mut out: Vec<&ReferencePoint> = self
            .iter()
            .filter(|p| p.priority == tier && !p.is_complete())
            .collect();
        // stable: insertion order survives ties
        out.sort_by(|a, b| scheduling_order(a, b));
        out
    }

    /// Tier sizes, for reporting.
    pub fn tier_counts(&self) -> BTreeMap<Priority, usize> {
        let mut counts = BTreeMap::new();
        for p in self.points.values() {
            *counts.entry(p.priority).or_insert(0) += 1;
        }
        counts
    }
}

fn scheduling_order(a: &ReferencePoint, b: &ReferencePoint) -> Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then(a.state.scheduling_rank().cmp(&b.state.scheduling_rank()))
        .then(requiredness_rank(a).cmp(&requiredness_rank(b)))
}

fn requiredness_rank(p: &ReferencePoint) -> u8 {
    if p.required { 0 } else { 1 }
}
