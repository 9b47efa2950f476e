//! Grey Wolf Optimizer over discrete task-to-tier assignments.
//!
//! Each wolf carries one continuous preference score in `[0, 1]` per
//! `(task, candidate tier)` pair. A wolf decodes to an [`Assignment`] by
//! taking, for every task, the candidate with the highest score; ties go to
//! the earlier candidate in [`Tier::ORDER`].
//!
//! Scores move with the canonical update, one dimension at a time:
//!
//! ```text
//! A = 2a*r1 - a,  C = 2*r2,  D = |C*L - X|,  X_L = L - A*D
//! X' = clamp((X_alpha + X_beta + X_delta) / 3, 0, 1)
//! ```
//!
//! Random numbers are drawn wolf by wolf, dimension by dimension, leader by
//! leader, from the one generator passed in. The three leaders keep their
//! positions for the iteration. Evaluation never touches the generator, so it
//! may run on the rayon pool without changing the outcome.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::assignment::{Assignment, Tier};
use crate::config::GwoConfig;
use crate::entity::TierCounts;
use crate::error::{Result, TwinError};
use crate::fitness::{FitnessBreakdown, FitnessEvaluator, PreparedProblem};
use crate::mirror::MirrorSnapshot;
use crate::tasks::Task;

/// One iteration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub iteration: usize,
    pub a: f64,
    pub alpha_fitness: f64,
    pub alpha_latency: f64,
    pub alpha_load_imbalance: f64,
    /// Reported only; energy does not steer the search.
    pub alpha_energy_mj: f64,
    /// Best fitness seen so far in the run, never increasing.
    pub best_fitness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub assignment: Assignment,
    pub breakdown: FitnessBreakdown,
    pub convergence: Vec<ConvergenceRecord>,
    pub iterations_run: usize,
    pub tier_counts: TierCounts,
    /// Whether the wall-clock budget cut the run short.
    pub budget_exhausted: bool,
}

impl OptimizationOutcome {
    /// Result for an epoch without pending tasks.
    pub fn trivial() -> Self {
        Self {
            assignment: Assignment::empty(),
            breakdown: FitnessBreakdown::zero(),
            convergence: Vec::new(),
            iterations_run: 0,
            tier_counts: TierCounts::default(),
            budget_exhausted: false,
        }
    }
}

/// Flattened `(task, candidate)` dimensions of one problem.
struct SearchSpace {
    tiers: Vec<Tier>,
    /// `offsets[i]..offsets[i + 1]` are the dimensions of task `i`.
    offsets: Vec<usize>,
}

impl SearchSpace {
    fn new(problem: &PreparedProblem<'_>) -> Result<Self> {
        let mut tiers = Vec::new();
        let mut offsets = vec![0];
        for (i, task) in problem.tasks().iter().enumerate() {
            let candidates = problem.candidates(i);
            if candidates.is_empty() {
                return Err(TwinError::NoAvailableTier {
                    task: task.id.to_string(),
                });
            }
            tiers.extend(candidates);
            offsets.push(tiers.len());
        }
        Ok(Self { tiers, offsets })
    }

    fn dimensions(&self) -> usize {
        self.tiers.len()
    }

    fn decode(&self, tasks: &[Task], position: &[f64]) -> Assignment {
        let choices = self.offsets.windows(2).map(|w| {
            let mut best = w[0];
            for d in w[0] + 1..w[1] {
                if position[d] > position[best] {
                    best = d;
                }
            }
            self.tiers[best]
        });
        Assignment::from_tiers(tasks, choices)
    }
}

#[derive(Debug, Clone)]
struct Wolf {
    position: Vec<f64>,
    assignment: Assignment,
    breakdown: FitnessBreakdown,
}

impl Wolf {
    fn new(position: Vec<f64>) -> Self {
        Self {
            position,
            assignment: Assignment::empty(),
            breakdown: FitnessBreakdown::zero(),
        }
    }

    fn evaluate(&mut self, space: &SearchSpace, problem: &PreparedProblem<'_>) {
        self.assignment = space.decode(problem.tasks(), &self.position);
        self.breakdown = problem.evaluate(&self.assignment);
    }

    fn fitness(&self) -> f64 {
        self.breakdown.fitness
    }
}

pub struct GwoEngine {
    config: GwoConfig,
    evaluator: FitnessEvaluator,
}

impl GwoEngine {
    pub fn new(config: GwoConfig, evaluator: FitnessEvaluator) -> Self {
        Self { config, evaluator }
    }

    pub fn config(&self) -> &GwoConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &FitnessEvaluator {
        &self.evaluator
    }

    /// Runs one optimization over `tasks` against a frozen `snapshot`.
    ///
    /// Returns the best assignment seen in any iteration, not merely the
    /// final alpha.
    pub fn optimize<R: Rng + ?Sized>(
        &self,
        tasks: &[Task],
        snapshot: &MirrorSnapshot,
        rng: &mut R,
    ) -> Result<OptimizationOutcome> {
        if tasks.is_empty() {
            tracing::debug!(tick = snapshot.tick, "No pending tasks, skipping optimization");
            return Ok(OptimizationOutcome::trivial());
        }

        let started = Instant::now();
        let budget = self.config.wall_clock_budget_ms.map(Duration::from_millis);
        let problem = self.evaluator.prepare(tasks, snapshot);
        let space = SearchSpace::new(&problem)?;
        let dims = space.dimensions();
        let total = self.config.max_iterations;

        let mut pack: Vec<Wolf> = (0..self.config.population_size.max(1))
            .map(|_| Wolf::new((0..dims).map(|_| rng.gen::<f64>()).collect()))
            .collect();
        self.evaluate(&mut pack, &space, &problem);
        rank(&mut pack);

        let mut best = pack[0].clone();
        let mut convergence = Vec::with_capacity(total);
        let mut budget_exhausted = false;

        for t in 0..total {
            if budget.is_some_and(|b| started.elapsed() >= b) {
                tracing::warn!(
                    iteration = t,
                    budget_ms = self.config.wall_clock_budget_ms,
                    "Optimizer wall-clock budget exhausted, returning best so far"
                );
                budget_exhausted = true;
                break;
            }

            let a = self.config.schedule.value(self.config.a_initial, t, total);
            let leaders: Vec<Vec<f64>> = (0..3)
                .map(|k| pack[k.min(pack.len() - 1)].position.clone())
                .collect();
            for wolf in pack.iter_mut().skip(3) {
                for d in 0..dims {
                    let x = wolf.position[d];
                    let mut sum = 0.0;
                    for leader in &leaders {
                        let r1: f64 = rng.gen();
                        let r2: f64 = rng.gen();
                        let big_a = 2.0 * a * r1 - a;
                        let c = 2.0 * r2;
                        let dist = (c * leader[d] - x).abs();
                        sum += leader[d] - big_a * dist;
                    }
                    wolf.position[d] = (sum / 3.0).clamp(0.0, 1.0);
                }
            }

            self.evaluate(&mut pack, &space, &problem);
            rank(&mut pack);

            if pack[0].fitness() < best.fitness() {
                best = pack[0].clone();
            }
            let alpha = &pack[0].breakdown;
            tracing::trace!(iteration = t, a, alpha = alpha.fitness, best = best.fitness(), "GWO iteration");
            convergence.push(ConvergenceRecord {
                iteration: t,
                a,
                alpha_fitness: alpha.fitness,
                alpha_latency: alpha.latency,
                alpha_load_imbalance: alpha.load_imbalance,
                alpha_energy_mj: alpha.total_energy_mj,
                best_fitness: best.fitness(),
            });
        }

        best.assignment.verify(tasks)?;
        let iterations_run = convergence.len();
        tracing::debug!(
            tick = snapshot.tick,
            tasks = tasks.len(),
            iterations = iterations_run,
            fitness = best.fitness(),
            violations = best.breakdown.violations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "GWO run finished"
        );

        Ok(OptimizationOutcome {
            tier_counts: best.assignment.tier_counts(),
            assignment: best.assignment,
            breakdown: best.breakdown,
            convergence,
            iterations_run,
            budget_exhausted,
        })
    }

    fn evaluate(&self, pack: &mut [Wolf], space: &SearchSpace, problem: &PreparedProblem<'_>) {
        if self.config.parallel_evaluation {
            pack.par_iter_mut().for_each(|w| w.evaluate(space, problem));
        } else {
            pack.iter_mut().for_each(|w| w.evaluate(space, problem));
        }
    }
}

/// Ascending fitness; stable, so equal wolves keep their order.
fn rank(pack: &mut [Wolf]) {
    pack.sort_by(|a, b| a.fitness().total_cmp(&b.fitness()));
}
