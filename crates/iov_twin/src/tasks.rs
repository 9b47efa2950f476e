//! Per-epoch task generation from the mirrored vehicle state.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TaskConfig;
use crate::mirror::MirrorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{:05}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineClass {
    Strict,
    Relaxed,
    BestEffort,
}

/// A computational task offloaded by a vehicle during one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub vehicle_id: String,
    /// Serving RSU at generation time, if the vehicle is inside RSU coverage.
    pub rsu_id: Option<String>,
    pub mbs_covered: bool,
    pub data_kb: f64,
    pub output_kb: f64,
    pub compute_mcycles: f64,
    pub deadline_class: DeadlineClass,
    pub deadline_ms: f64,
    /// Hard-deadline task; misses are penalized by the fitness function.
    pub time_bounded: bool,
}

impl Task {
    /// Minimal task for tests and hand-built scenarios.
    pub fn new(id: u64, vehicle_id: impl Into<String>, data_kb: f64, output_kb: f64, compute_mcycles: f64) -> Self {
        Self {
            id: TaskId(id),
            vehicle_id: vehicle_id.into(),
            rsu_id: None,
            mbs_covered: false,
            data_kb,
            output_kb,
            compute_mcycles,
            deadline_class: DeadlineClass::BestEffort,
            deadline_ms: f64::INFINITY,
            time_bounded: false,
        }
    }

    pub fn with_rsu(mut self, rsu_id: impl Into<String>) -> Self {
        self.rsu_id = Some(rsu_id.into());
        self
    }

    pub fn with_mbs(mut self) -> Self {
        self.mbs_covered = true;
        self
    }

    pub fn with_deadline(mut self, class: DeadlineClass, deadline_ms: f64) -> Self {
        self.deadline_class = class;
        self.deadline_ms = deadline_ms;
        self.time_bounded = class != DeadlineClass::BestEffort;
        self
    }
}

/// Derives the epoch's pending tasks from fresh, network-associated vehicles.
pub struct TaskGenerator {
    config: TaskConfig,
    rng: SmallRng,
    next_id: u64,
}

impl TaskGenerator {
    pub fn new(config: TaskConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
            next_id: 1,
        }
    }

    pub fn generate(&mut self, snapshot: &MirrorSnapshot) -> Vec<Task> {
        let mut tasks = Vec::new();
        for vehicle in snapshot.fresh_vehicles() {
            if vehicle.associated_rsu.is_none() && !vehicle.mbs_covered {
                continue;
            }
            let count = self.config.tasks_per_vehicle.sample(&mut self.rng);
            for _ in 0..count {
                let task = self.sample_task(vehicle.id(), vehicle.associated_rsu.clone(), vehicle.mbs_covered);
                tasks.push(task);
            }
        }
        tracing::debug!(tick = snapshot.tick, tasks = tasks.len(), "Generated epoch tasks");
        tasks
    }

    fn sample_task(&mut self, vehicle_id: &str, rsu_id: Option<String>, mbs_covered: bool) -> Task {
        let cfg = &self.config;
        let data_kb = cfg.data_kb.sample(&mut self.rng);
        let output_kb = cfg.output_kb.sample(&mut self.rng);
        let compute_mcycles = cfg.compute_mcycles.sample(&mut self.rng);
        let time_bounded = self.rng.gen_bool(cfg.time_bounded_probability);

        let (deadline_class, deadline_ms) = match (time_bounded, data_kb < cfg.strict_data_threshold_kb) {
            (true, true) => (DeadlineClass::Strict, cfg.strict_deadline_ms),
            (true, false) => (DeadlineClass::Relaxed, cfg.relaxed_deadline_ms),
            (false, _) => (DeadlineClass::BestEffort, cfg.best_effort_deadline_ms),
        };

        let id = TaskId(self.next_id);
        self.next_id += 1;
        Task {
            id,
            vehicle_id: vehicle_id.to_owned(),
            rsu_id,
            mbs_covered,
            data_kb,
            output_kb,
            compute_mcycles,
            deadline_class,
            deadline_ms,
            time_bounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TwinConfig;
    use crate::mirror::{MirrorSynchronizer, Observation};

    fn snapshot_with(vehicles: &[(&str, f64, f64)]) -> MirrorSnapshot {
        let mut mirror = MirrorSynchronizer::new(&TwinConfig::default());
        let obs: Vec<_> = vehicles
            .iter()
            .map(|(id, x, y)| Observation::vehicle(*id, *x, *y, 40.0, 0.0))
            .collect();
        mirror.sync(&obs, 1.0).unwrap();
        mirror.snapshot()
    }

    #[test]
    fn test_generation_is_deterministic_for_a_seed() {
        let snap = snapshot_with(&[("a", 250.0, 250.0), ("b", 1250.0, 300.0), ("c", 700.0, 700.0)]);
        let cfg = TwinConfig::default().tasks;
        let first = TaskGenerator::new(cfg.clone(), 9).generate(&snap);
        let second = TaskGenerator::new(cfg, 9).generate(&snap);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_tasks_respect_configured_ranges() {
        let snap = snapshot_with(&[("a", 250.0, 250.0), ("b", 750.0, 1250.0)]);
        let cfg = TwinConfig::default().tasks;
        let tasks = TaskGenerator::new(cfg.clone(), 1).generate(&snap);
        for t in &tasks {
            assert!(t.data_kb >= cfg.data_kb.min && t.data_kb <= cfg.data_kb.max);
            assert!(t.compute_mcycles >= cfg.compute_mcycles.min && t.compute_mcycles <= cfg.compute_mcycles.max);
            match t.deadline_class {
                DeadlineClass::Strict => assert!(t.time_bounded && t.data_kb < cfg.strict_data_threshold_kb),
                DeadlineClass::Relaxed => assert!(t.time_bounded),
                DeadlineClass::BestEffort => assert!(!t.time_bounded),
            }
        }
        let per_vehicle = tasks.iter().filter(|t| t.vehicle_id == "a").count() as u32;
        assert!((cfg.tasks_per_vehicle.min..=cfg.tasks_per_vehicle.max).contains(&per_vehicle));
    }

    #[test]
    fn test_ids_keep_increasing_across_epochs() {
        let snap = snapshot_with(&[("a", 250.0, 250.0)]);
        let mut generator = TaskGenerator::new(TwinConfig::default().tasks, 3);
        let first = generator.generate(&snap);
        let second = generator.generate(&snap);
        assert!(first.last().unwrap().id < second.first().unwrap().id);
        assert_eq!(TaskId(7).to_string(), "T-00007");
    }

    #[test]
    fn test_uncovered_vehicles_generate_nothing() {
        let mut cfg = TwinConfig::default();
        cfg.topology.mbs.coverage_m = 10.0;
        let mut mirror = MirrorSynchronizer::new(&cfg);
        mirror
            .sync(&[Observation::vehicle("far", 1490.0, 1490.0, 40.0, 0.0)], 1.0)
            .unwrap();
        let tasks = TaskGenerator::new(cfg.tasks, 5).generate(&mirror.snapshot());
        assert!(tasks.is_empty());
    }
}
