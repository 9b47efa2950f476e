//! Latency model and the joint latency / load-imbalance fitness.
//!
//! ```text
//! fitness = w1 * min(1, mean_latency / ceiling)
//!         + (1 - w1) * min(1, 2 * stddev(edge utilization))
//!         + penalty * deadline_violations
//! ```
//!
//! Lower is better. Every time-bounded task whose modeled latency exceeds its
//! deadline adds `penalty` (> 1), so any violating candidate ranks behind
//! every compliant one while still being comparable to other violators.
//!
//! Energy is modeled per tier and reported alongside, but it is not weighted
//! into `fitness`.

use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, Tier};
use crate::config::{ComputeConfig, FitnessConfig, LinkConfig, PowerConfig, TierToggles, TwinConfig};
use crate::entity::{Category, EntityRecord};
use crate::mirror::MirrorSnapshot;
use crate::tasks::Task;

/// Kilobytes over a link of `mbps`, in milliseconds.
fn transfer_ms(kb: f64, mbps: f64) -> f64 {
    kb * 8.0 / mbps
}

/// Megacycles on a `ghz` processor, in milliseconds.
fn compute_ms(mcycles: f64, ghz: f64) -> f64 {
    mcycles / ghz
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    pub fitness: f64,
    /// Normalized mean latency in [0, 1].
    pub latency: f64,
    /// Normalized load imbalance in [0, 1].
    pub load_imbalance: f64,
    pub mean_latency_ms: f64,
    pub total_latency_ms: f64,
    pub violations: usize,
    /// Modeled energy of every placed task, in mJ.
    pub total_energy_mj: f64,
    /// Utilization per edge node, in `PreparedProblem::edge_ids` order.
    pub edge_utilization: Vec<f64>,
}

impl FitnessBreakdown {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Scores assignments against a mirrored snapshot.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    links: LinkConfig,
    compute: ComputeConfig,
    power: PowerConfig,
    tiers: TierToggles,
    weights: FitnessConfig,
}

impl FitnessEvaluator {
    pub fn new(cfg: &TwinConfig) -> Self {
        Self {
            links: cfg.links.clone(),
            compute: cfg.compute.clone(),
            power: cfg.power.clone(),
            tiers: cfg.tiers,
            weights: cfg.fitness.clone(),
        }
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.weights
    }

    /// Scores one assignment. Pure: same inputs, same bits out.
    pub fn evaluate(&self, assignment: &Assignment, tasks: &[Task], snapshot: &MirrorSnapshot) -> FitnessBreakdown {
        self.prepare(tasks, snapshot).evaluate(assignment)
    }

    /// Precomputes everything that does not depend on the assignment.
    pub fn prepare<'a>(&self, tasks: &'a [Task], snapshot: &MirrorSnapshot) -> PreparedProblem<'a> {
        let edges: Vec<&EntityRecord> = snapshot.edge_nodes().collect();
        let edge_ids: Vec<String> = edges.iter().map(|r| r.id().to_owned()).collect();
        let edge_base: Vec<f64> = edges.iter().map(|r| r.load.utilization_or_idle()).collect();
        let edge_capacity: Vec<f64> = edges
            .iter()
            .map(|r| r.cpu_ghz.unwrap_or(1.0) * 1000.0 * self.weights.epoch_seconds)
            .collect();
        let mbs_index = edges.iter().position(|r| r.category() == Category::Mbs);

        let stale_multiplier = if snapshot.rsu_data_stale() {
            self.weights.stale_rsu_multiplier
        } else {
            1.0
        };
        let cloud_ghz = snapshot
            .store
            .by_category(Category::Cloud)
            .next()
            .and_then(|c| c.cpu_ghz);

        let mut latency = Vec::with_capacity(tasks.len());
        let mut energy = Vec::with_capacity(tasks.len());
        let mut rsu_index = Vec::with_capacity(tasks.len());
        for task in tasks {
            let rsu = task
                .rsu_id
                .as_deref()
                .and_then(|id| edges.iter().position(|r| r.category() == Category::Rsu && r.id() == id));
            rsu_index.push(rsu);
            let row = self.latency_row(
                task,
                rsu.map(|i| edges[i]),
                mbs_index.map(|i| edges[i]),
                cloud_ghz,
                stale_multiplier,
            );
            energy.push(self.energy_row(task, &row, rsu.is_some(), cloud_ghz));
            latency.push(row);
        }

        PreparedProblem {
            tasks,
            weights: self.weights.clone(),
            latency,
            energy,
            rsu_index,
            mbs_index,
            edge_ids,
            edge_base,
            edge_capacity,
        }
    }

    fn queue_factor(&self, node: &EntityRecord) -> f64 {
        let u = node
            .load
            .utilization_or_idle()
            .min(self.weights.max_queue_utilization);
        1.0 / (1.0 - u)
    }

    /// Modeled latency per tier in `Tier::ORDER`; `None` marks an unavailable tier.
    fn latency_row(
        &self,
        task: &Task,
        rsu: Option<&EntityRecord>,
        mbs: Option<&EntityRecord>,
        cloud_ghz: Option<f64>,
        stale_multiplier: f64,
    ) -> [Option<f64>; 4] {
        let l = &self.links;
        let mut row = [None; 4];

        if self.tiers.vehicle {
            row[Tier::Vehicle.index()] = Some(compute_ms(task.compute_mcycles, self.compute.vehicle_cpu_ghz));
        }

        if let (true, Some(node)) = (self.tiers.rsu, rsu) {
            let ghz = node.cpu_ghz.unwrap_or(1.0);
            let processing = compute_ms(task.compute_mcycles, ghz) * self.queue_factor(node) * stale_multiplier;
            row[Tier::Rsu.index()] = Some(
                transfer_ms(task.data_kb, l.vehicle_rsu_mbps)
                    + processing
                    + transfer_ms(task.output_kb, l.vehicle_rsu_mbps),
            );
        }

        if let (true, Some(node)) = (self.tiers.mbs, mbs) {
            let path = if rsu.is_some() {
                Some((
                    transfer_ms(task.data_kb, l.vehicle_rsu_mbps) + transfer_ms(task.data_kb, l.rsu_mbs_mbps),
                    transfer_ms(task.output_kb, l.rsu_mbs_mbps) + transfer_ms(task.output_kb, l.vehicle_rsu_mbps),
                ))
            } else if task.mbs_covered {
                Some((
                    transfer_ms(task.data_kb, l.vehicle_mbs_mbps),
                    transfer_ms(task.output_kb, l.vehicle_mbs_mbps),
                ))
            } else {
                None
            };
            if let Some((up, down)) = path {
                let ghz = node.cpu_ghz.unwrap_or(1.0);
                let processing = compute_ms(task.compute_mcycles, ghz) * self.queue_factor(node);
                row[Tier::Mbs.index()] = Some(up + processing + down);
            }
        }

        if let (true, Some(ghz)) = (self.tiers.cloud, cloud_ghz) {
            row[Tier::Cloud.index()] = Some(
                transfer_ms(task.data_kb, l.vehicle_cloud_mbps)
                    + compute_ms(task.compute_mcycles, ghz)
                    + transfer_ms(task.output_kb, l.vehicle_cloud_mbps)
                    + l.cloud_propagation_ms,
            );
        }
        row
    }

    /// Energy in mJ per reachable tier. `relayed` is true when the MBS is
    /// reached through the serving RSU.
    fn energy_row(
        &self,
        task: &Task,
        latency: &[Option<f64>; 4],
        relayed: bool,
        cloud_ghz: Option<f64>,
    ) -> [Option<f64>; 4] {
        let l = &self.links;
        let p = &self.power;
        let cache = p.cache_mj_per_kb * task.output_kb;
        // mW over ms, in mJ.
        let tx = |mw: f64, ms: f64| mw * ms / 1000.0;

        let mut row = [None; 4];
        for tier in Tier::ORDER {
            if latency[tier.index()].is_none() {
                continue;
            }
            let mj = match tier {
                Tier::Vehicle => cache,
                Tier::Rsu => cache + tx(p.rsu_tx_mw, transfer_ms(task.output_kb, l.vehicle_rsu_mbps)),
                Tier::Mbs if relayed => {
                    cache
                        + tx(p.mbs_tx_mw, transfer_ms(task.output_kb, l.rsu_mbs_mbps))
                        + tx(p.rsu_tx_mw, transfer_ms(task.output_kb, l.vehicle_rsu_mbps))
                }
                Tier::Mbs => cache + tx(p.mbs_tx_mw, transfer_ms(task.output_kb, l.vehicle_mbs_mbps)),
                Tier::Cloud => {
                    let hz = cloud_ghz.unwrap_or(1.0) * 1e9;
                    let cycles = task.compute_mcycles * 1e6;
                    let link_ms = transfer_ms(task.data_kb, l.vehicle_cloud_mbps)
                        + transfer_ms(task.output_kb, l.vehicle_cloud_mbps);
                    tx(p.cloud_tx_mw, link_ms) + p.cloud_capacitance * cycles * hz * hz * 1000.0
                }
            };
            row[tier.index()] = Some(mj);
        }
        row
    }
}

/// Assignment-independent view of one epoch's problem.
#[derive(Debug, Clone)]
pub struct PreparedProblem<'a> {
    tasks: &'a [Task],
    weights: FitnessConfig,
    latency: Vec<[Option<f64>; 4]>,
    energy: Vec<[Option<f64>; 4]>,
    rsu_index: Vec<Option<usize>>,
    mbs_index: Option<usize>,
    edge_ids: Vec<String>,
    edge_base: Vec<f64>,
    edge_capacity: Vec<f64>,
}

impl<'a> PreparedProblem<'a> {
    pub fn tasks(&self) -> &'a [Task] {
        self.tasks
    }

    pub fn edge_ids(&self) -> &[String] {
        &self.edge_ids
    }

    /// Modeled latency of `task_index` on `tier`, if the tier is reachable.
    pub fn latency_ms(&self, task_index: usize, tier: Tier) -> Option<f64> {
        self.latency.get(task_index).and_then(|row| row[tier.index()])
    }

    /// Modeled energy of `task_index` on `tier` in mJ, if the tier is reachable.
    pub fn energy_mj(&self, task_index: usize, tier: Tier) -> Option<f64> {
        self.energy.get(task_index).and_then(|row| row[tier.index()])
    }

    /// Reachable tiers of a task, in `Tier::ORDER`.
    pub fn candidates(&self, task_index: usize) -> Vec<Tier> {
        Tier::ORDER
            .into_iter()
            .filter(|t| self.latency_ms(task_index, *t).is_some())
            .collect()
    }

    /// Scores `assignment`. Placements are matched to tasks by id. A task
    /// without a placement, or placed on an unreachable tier, counts as a
    /// deadline violation at the latency ceiling.
    pub fn evaluate(&self, assignment: &Assignment) -> FitnessBreakdown {
        let w = &self.weights;
        if self.tasks.is_empty() {
            return FitnessBreakdown {
                edge_utilization: self.edge_base.clone(),
                ..FitnessBreakdown::zero()
            };
        }

        let mut total_latency_ms = 0.0;
        let mut total_energy_mj = 0.0;
        let mut violations = 0;
        let mut assigned = vec![0.0; self.edge_base.len()];

        for (i, task) in self.tasks.iter().enumerate() {
            let tier = match assignment.placement(i) {
                Some(p) if p.task == task.id => Some(p.tier),
                _ => assignment.tier_of(task.id),
            };
            let Some(tier) = tier else {
                total_latency_ms += w.latency_ceiling_ms;
                violations += 1;
                continue;
            };
            match self.latency_ms(i, tier) {
                Some(ms) => {
                    total_latency_ms += ms;
                    total_energy_mj += self.energy_mj(i, tier).unwrap_or(0.0);
                    if task.time_bounded && ms > task.deadline_ms {
                        violations += 1;
                    }
                }
                None => {
                    total_latency_ms += w.latency_ceiling_ms;
                    violations += 1;
                }
            }
            let node = match tier {
                Tier::Rsu => self.rsu_index[i],
                Tier::Mbs => self.mbs_index,
                Tier::Vehicle | Tier::Cloud => None,
            };
            if let Some(n) = node {
                assigned[n] += task.compute_mcycles;
            }
        }

        let mean_latency_ms = total_latency_ms / self.tasks.len() as f64;
        let latency = (mean_latency_ms / w.latency_ceiling_ms).min(1.0);

        let edge_utilization: Vec<f64> = self
            .edge_base
            .iter()
            .zip(&assigned)
            .zip(&self.edge_capacity)
            .map(|((base, work), cap)| (base + work / cap).clamp(0.0, 1.0))
            .collect();
        let load_imbalance = if edge_utilization.is_empty() {
            0.0
        } else {
            let n = edge_utilization.len() as f64;
            let mean = edge_utilization.iter().sum::<f64>() / n;
            let var = edge_utilization.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;
            (2.0 * var.sqrt()).min(1.0)
        };

        let fitness =
            w.w1 * latency + (1.0 - w.w1) * load_imbalance + w.deadline_penalty * violations as f64;

        FitnessBreakdown {
            fitness,
            latency,
            load_imbalance,
            mean_latency_ms,
            total_latency_ms,
            violations,
            total_energy_mj,
            edge_utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LoadReading;
    use crate::mirror::{MirrorSynchronizer, Observation};
    use crate::tasks::DeadlineClass;

    fn snapshot(cfg: &TwinConfig, rsu_util: f64) -> MirrorSnapshot {
        let mut mirror = MirrorSynchronizer::new(cfg);
        let obs = vec![
            Observation::vehicle("v_0", 250.0, 250.0, 40.0, 0.0),
            Observation::station(
                Category::Rsu,
                "RSU_1",
                LoadReading {
                    utilization: Some(rsu_util),
                    ..Default::default()
                },
            ),
        ];
        mirror.sync(&obs, 1.0).unwrap();
        mirror.snapshot()
    }

    fn task(id: u64) -> Task {
        Task::new(id, "v_0", 500.0, 100.0, 2000.0).with_rsu("RSU_1").with_mbs()
    }

    #[test]
    fn test_latency_model_per_tier() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks = vec![task(1)];
        let problem = FitnessEvaluator::new(&cfg).prepare(&tasks, &snap);

        assert_eq!(problem.latency_ms(0, Tier::Vehicle), Some(2000.0));
        // 500 KB up + 2000 Mcycles on 3 GHz + 100 KB down at 50 Mbps.
        let rsu = problem.latency_ms(0, Tier::Rsu).unwrap();
        assert!((rsu - (80.0 + 2000.0 / 3.0 + 16.0)).abs() < 1e-9);
        let mbs = problem.latency_ms(0, Tier::Mbs).unwrap();
        assert!((mbs - (80.0 + 20.0 + 200.0 + 4.0 + 16.0)).abs() < 1e-9);
        let cloud = problem.latency_ms(0, Tier::Cloud).unwrap();
        assert!((cloud - (200.0 + 2000.0 / 15.0 + 40.0 + 20.0)).abs() < 1e-9);
        assert_eq!(problem.candidates(0), Tier::ORDER.to_vec());
    }

    #[test]
    fn test_direct_mbs_path_without_rsu() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks = vec![Task::new(1, "v_0", 500.0, 100.0, 2000.0).with_mbs()];
        let problem = FitnessEvaluator::new(&cfg).prepare(&tasks, &snap);

        assert_eq!(problem.candidates(0), vec![Tier::Vehicle, Tier::Mbs, Tier::Cloud]);
        // 500 KB up + 2000 Mcycles on 10 GHz + 100 KB down at 30 Mbps.
        let mbs = problem.latency_ms(0, Tier::Mbs).unwrap();
        assert!((mbs - (500.0 * 8.0 / 30.0 + 200.0 + 100.0 * 8.0 / 30.0)).abs() < 1e-9);
        let energy = problem.energy_mj(0, Tier::Mbs).unwrap();
        assert!((energy - (1.0 + 300.0 * (100.0 * 8.0 / 30.0) / 1000.0)).abs() < 1e-9);

        let uncovered = vec![Task::new(2, "v_0", 500.0, 100.0, 2000.0)];
        let problem = FitnessEvaluator::new(&cfg).prepare(&uncovered, &snap);
        assert_eq!(problem.candidates(0), vec![Tier::Vehicle, Tier::Cloud]);
    }

    #[test]
    fn test_energy_model_per_tier() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks = vec![task(1)];
        let problem = FitnessEvaluator::new(&cfg).prepare(&tasks, &snap);

        let close = |tier, expected: f64| {
            let mj = problem.energy_mj(0, tier).unwrap();
            assert!((mj - expected).abs() < 1e-9 * expected, "{tier}: {mj} != {expected}");
        };
        // Caching 100 KB costs 1 mJ; return links at 200/300 mW.
        close(Tier::Vehicle, 1.0);
        close(Tier::Rsu, 1.0 + 200.0 * 16.0 / 1000.0);
        close(Tier::Mbs, 1.0 + 300.0 * 4.0 / 1000.0 + 200.0 * 16.0 / 1000.0);
        // 240 ms of cloud link at 400 mW plus k * cycles * f^2.
        close(Tier::Cloud, 96.0 + 45_000.0);
    }

    #[test]
    fn test_energy_is_reported_but_not_weighted() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks: Vec<_> = (1..=2).map(task).collect();
        let a = Assignment::from_tiers(&tasks, [Tier::Vehicle, Tier::Rsu]);

        let with_power = FitnessEvaluator::new(&cfg).evaluate(&a, &tasks, &snap);
        assert!((with_power.total_energy_mj - (1.0 + 4.2)).abs() < 1e-9);

        let mut unpowered = cfg.clone();
        unpowered.power = PowerConfig {
            cache_mj_per_kb: 0.0,
            rsu_tx_mw: 0.0,
            mbs_tx_mw: 0.0,
            cloud_tx_mw: 0.0,
            cloud_capacitance: 0.0,
        };
        let without = FitnessEvaluator::new(&unpowered).evaluate(&a, &tasks, &snap);
        assert_eq!(without.total_energy_mj, 0.0);
        assert_eq!(without.fitness.to_bits(), with_power.fitness.to_bits());
    }

    #[test]
    fn test_busy_rsu_is_slower() {
        let cfg = TwinConfig::default();
        let tasks = vec![task(1)];
        let eval = FitnessEvaluator::new(&cfg);
        let idle = eval.prepare(&tasks, &snapshot(&cfg, 0.0)).latency_ms(0, Tier::Rsu).unwrap();
        let busy = eval.prepare(&tasks, &snapshot(&cfg, 0.5)).latency_ms(0, Tier::Rsu).unwrap();
        assert!(busy > idle);
    }

    #[test]
    fn test_stale_rsu_readings_inflate_processing() {
        let cfg = TwinConfig::default();
        let mut mirror = MirrorSynchronizer::new(&cfg);
        mirror
            .sync(
                &[
                    Observation::vehicle("v_0", 250.0, 250.0, 40.0, 0.0),
                    Observation::station(Category::Rsu, "RSU_1", LoadReading::default()),
                ],
                1.0,
            )
            .unwrap();
        mirror
            .sync(&[Observation::vehicle("v_0", 250.0, 250.0, 40.0, 0.0)], 5.0)
            .unwrap();
        let snap = mirror.snapshot();
        assert!(snap.rsu_data_stale());

        let tasks = vec![task(1)];
        let rsu = FitnessEvaluator::new(&cfg)
            .prepare(&tasks, &snap)
            .latency_ms(0, Tier::Rsu)
            .unwrap();
        assert!((rsu - (80.0 + 1.5 * 2000.0 / 3.0 + 16.0)).abs() < 1e-9);
    }

    #[test]
    fn test_evaluation_is_pure() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.3);
        let tasks: Vec<_> = (1..=4).map(task).collect();
        let a = Assignment::from_tiers(&tasks, [Tier::Rsu, Tier::Mbs, Tier::Cloud, Tier::Rsu]);
        let eval = FitnessEvaluator::new(&cfg);
        let first = eval.evaluate(&a, &tasks, &snap);
        let second = eval.evaluate(&a, &tasks, &snap);
        assert_eq!(first, second);
        assert_eq!(first.fitness.to_bits(), second.fitness.to_bits());
    }

    #[test]
    fn test_placements_match_tasks_by_id() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks: Vec<_> = (1..=3).map(task).collect();
        let eval = FitnessEvaluator::new(&cfg);

        let ordered = Assignment::from_tiers(&tasks, [Tier::Vehicle, Tier::Rsu, Tier::Cloud]);
        let reversed: Vec<_> = tasks.iter().rev().cloned().collect();
        let shuffled = Assignment::from_tiers(&reversed, [Tier::Cloud, Tier::Rsu, Tier::Vehicle]);
        assert_eq!(eval.evaluate(&shuffled, &tasks, &snap), eval.evaluate(&ordered, &tasks, &snap));

        // Placements for other tasks leave these unplaced.
        let foreign: Vec<_> = (7..=9).map(task).collect();
        let stray = eval.evaluate(&Assignment::uniform(&foreign, Tier::Vehicle), &tasks, &snap);
        assert_eq!(stray.violations, 3);
        assert_eq!(stray.mean_latency_ms, cfg.fitness.latency_ceiling_ms);
        assert_eq!(stray.total_energy_mj, 0.0);
    }

    #[test]
    fn test_deadline_violation_dominates() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks = vec![task(1).with_deadline(DeadlineClass::Strict, 150.0)];
        let eval = FitnessEvaluator::new(&cfg);

        let on_mbs = eval.evaluate(&Assignment::uniform(&tasks, Tier::Mbs), &tasks, &snap);
        let on_vehicle = eval.evaluate(&Assignment::uniform(&tasks, Tier::Vehicle), &tasks, &snap);
        assert_eq!(on_mbs.violations, 1);
        assert_eq!(on_vehicle.violations, 1);

        let relaxed = vec![task(1).with_deadline(DeadlineClass::Relaxed, 400.0)];
        let ok = eval.evaluate(&Assignment::uniform(&relaxed, Tier::Mbs), &relaxed, &snap);
        let late = eval.evaluate(&Assignment::uniform(&relaxed, Tier::Vehicle), &relaxed, &snap);
        assert_eq!(ok.violations, 0);
        assert_eq!(late.violations, 1);
        assert!(ok.fitness <= 1.0);
        assert!(late.fitness > ok.fitness + 1.0);
    }

    #[test]
    fn test_load_imbalance_tracks_edge_spread() {
        let cfg = TwinConfig::default();
        let snap = snapshot(&cfg, 0.0);
        let tasks: Vec<_> = (1..=3).map(task).collect();
        let eval = FitnessEvaluator::new(&cfg);

        let local = eval.evaluate(&Assignment::uniform(&tasks, Tier::Vehicle), &tasks, &snap);
        assert_eq!(local.load_imbalance, 0.0);

        let piled = eval.evaluate(&Assignment::uniform(&tasks, Tier::Rsu), &tasks, &snap);
        assert!(piled.load_imbalance > 0.0 && piled.load_imbalance <= 1.0);
        assert_eq!(piled.edge_utilization.len(), 4);
        assert_eq!(
            eval.prepare(&tasks, &snap).edge_ids(),
            &["RSU_1".to_string(), "RSU_2".into(), "RSU_3".into(), "MBS_1".into()]
        );
    }

    #[test]
    fn test_unreachable_tier_counts_as_violation() {
        let mut cfg = TwinConfig::default();
        cfg.tiers.cloud = false;
        let snap = snapshot(&cfg, 0.0);
        let tasks = vec![Task::new(1, "v_0", 10.0, 10.0, 10.0)];
        let problem = FitnessEvaluator::new(&cfg).prepare(&tasks, &snap);
        assert_eq!(problem.candidates(0), vec![Tier::Vehicle]);

        let bad = problem.evaluate(&Assignment::uniform(&tasks, Tier::Cloud));
        assert_eq!(bad.violations, 1);
        assert!(bad.fitness > cfg.fitness.deadline_penalty);
    }
}
