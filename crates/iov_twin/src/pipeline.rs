//! One decision epoch: sync, snapshot, generate, optimize, record.

use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::TwinConfig;
use crate::entity::{Category, DecisionRecord, TierCounts};
use crate::error::Result;
use crate::feed::ObservationSource;
use crate::fitness::FitnessEvaluator;
use crate::gwo::{GwoEngine, OptimizationOutcome};
use crate::mirror::{AoiSnapshot, MirrorSynchronizer, ObservationBatch};
use crate::tasks::{Task, TaskGenerator};

/// Everything produced by one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub tick: u64,
    pub time: f64,
    pub aoi: AoiSnapshot,
    pub vehicles: usize,
    pub fresh_vehicles: usize,
    pub tasks: Vec<Task>,
    pub outcome: OptimizationOutcome,
}

/// Compact per-epoch line for history and results files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub tick: u64,
    pub time: f64,
    pub vehicles: usize,
    pub tasks: usize,
    pub fitness: f64,
    pub mean_latency_ms: f64,
    pub load_imbalance: f64,
    pub violations: usize,
    pub energy_mj: f64,
    pub mean_aoi: f64,
    pub tier_counts: TierCounts,
}

impl EpochReport {
    pub fn summary(&self) -> EpochSummary {
        let b = &self.outcome.breakdown;
        EpochSummary {
            tick: self.tick,
            time: self.time,
            vehicles: self.vehicles,
            tasks: self.tasks.len(),
            fitness: b.fitness,
            mean_latency_ms: b.mean_latency_ms,
            load_imbalance: b.load_imbalance,
            violations: b.violations,
            energy_mj: b.total_energy_mj,
            mean_aoi: self.aoi.average(),
            tier_counts: self.outcome.tier_counts,
        }
    }
}

/// Receives every epoch's decision for dispatch to the execution side.
pub trait DecisionSink {
    fn dispatch(&mut self, report: &EpochReport) -> Result<()>;
}

/// Collects reports in memory.
impl DecisionSink for Vec<EpochReport> {
    fn dispatch(&mut self, report: &EpochReport) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

pub struct Pipeline {
    mirror: MirrorSynchronizer,
    generator: TaskGenerator,
    engine: GwoEngine,
    rng: SmallRng,
    epochs: u64,
    last_optimize: Duration,
}

impl Pipeline {
    /// Validates `cfg` and wires every stage. Task sampling and the optimizer
    /// draw from separate streams derived from `cfg.seed`.
    pub fn new(cfg: &TwinConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            mirror: MirrorSynchronizer::new(cfg),
            generator: TaskGenerator::new(cfg.tasks.clone(), cfg.seed),
            engine: GwoEngine::new(cfg.gwo.clone(), FitnessEvaluator::new(cfg)),
            rng: SmallRng::seed_from_u64(cfg.seed.wrapping_add(1)),
            epochs: 0,
            last_optimize: Duration::ZERO,
        })
    }

    pub fn step(&mut self, batch: &ObservationBatch) -> Result<EpochReport> {
        let aoi = self.mirror.ingest(batch)?;
        let snapshot = self.mirror.snapshot();
        let tasks = self.generator.generate(&snapshot);
        let started = Instant::now();
        let outcome = self.engine.optimize(&tasks, &snapshot, &mut self.rng)?;
        self.last_optimize = started.elapsed();

        self.mirror.record_decision(DecisionRecord {
            tick: batch.tick,
            time: batch.time,
            fitness: outcome.breakdown.fitness,
            latency: outcome.breakdown.latency,
            load_imbalance: outcome.breakdown.load_imbalance,
            tier_counts: outcome.tier_counts,
            placements: outcome.assignment.labels(&tasks),
        });
        self.epochs += 1;

        let report = EpochReport {
            tick: batch.tick,
            time: batch.time,
            aoi,
            vehicles: snapshot.store.by_category(Category::Vehicle).count(),
            fresh_vehicles: snapshot.fresh_vehicles().count(),
            tasks,
            outcome,
        };
        tracing::info!(
            tick = report.tick,
            vehicles = report.vehicles,
            tasks = report.tasks.len(),
            fitness = report.outcome.breakdown.fitness,
            violations = report.outcome.breakdown.violations,
            energy_mj = report.outcome.breakdown.total_energy_mj,
            "Epoch complete"
        );
        Ok(report)
    }

    /// Drains `source` (or stops after `limit` epochs), dispatching every
    /// report to `sink`. Returns the number of epochs run.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, limit: Option<u64>) -> Result<u64>
    where
        S: ObservationSource + ?Sized,
        K: DecisionSink + ?Sized,
    {
        let mut ran = 0;
        while limit.map_or(true, |l| ran < l) {
            let Some(batch) = source.next_batch()? else {
                break;
            };
            let report = self.step(&batch)?;
            sink.dispatch(&report)?;
            ran += 1;
        }
        Ok(ran)
    }

    pub fn mirror(&self) -> &MirrorSynchronizer {
        &self.mirror
    }

    pub fn engine(&self) -> &GwoEngine {
        &self.engine
    }

    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    /// Wall-clock time of the last epoch's optimizer run.
    pub fn last_optimize_seconds(&self) -> f64 {
        self.last_optimize.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{MobilityConfig, StandaloneMobility};

    fn config() -> TwinConfig {
        let mut cfg = TwinConfig::default();
        cfg.gwo.population_size = 8;
        cfg.gwo.max_iterations = 10;
        cfg
    }

    fn feed(cfg: &TwinConfig, ticks: u64) -> StandaloneMobility {
        let mobility = MobilityConfig {
            vehicles: 10,
            max_ticks: Some(ticks),
            ..Default::default()
        };
        StandaloneMobility::new(mobility, &cfg.topology, cfg.seed)
    }

    #[test]
    fn test_run_records_each_decision() {
        let cfg = config();
        let mut pipeline = Pipeline::new(&cfg).unwrap();
        let mut reports: Vec<EpochReport> = Vec::new();
        let ran = pipeline.run(&mut feed(&cfg, 4), &mut reports, None).unwrap();

        assert_eq!(ran, 4);
        assert_eq!(pipeline.epochs(), 4);
        assert_eq!(pipeline.mirror().total_syncs(), 4);
        let last = reports.last().unwrap();
        let decision = pipeline.mirror().store().last_decision().unwrap();
        assert_eq!(decision.tick, last.tick);
        assert_eq!(decision.placements.len(), last.tasks.len());
        assert_eq!(decision.fitness, last.outcome.breakdown.fitness);
        for r in &reports {
            assert!(r.outcome.assignment.verify(&r.tasks).is_ok());
            let summary = r.summary();
            assert_eq!(summary.energy_mj, r.outcome.breakdown.total_energy_mj);
            if !r.tasks.is_empty() {
                assert!(summary.energy_mj > 0.0);
            }
        }
        assert!(reports.iter().any(|r| !r.tasks.is_empty()));
    }

    #[test]
    fn test_limit_stops_early() {
        let cfg = config();
        let mut pipeline = Pipeline::new(&cfg).unwrap();
        let mut reports: Vec<EpochReport> = Vec::new();
        let ran = pipeline.run(&mut feed(&cfg, 10), &mut reports, Some(2)).unwrap();
        assert_eq!(ran, 2);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].summary().tick, 1);
    }

    #[test]
    fn test_same_seed_same_reports() {
        let cfg = config();
        let run = || {
            let mut pipeline = Pipeline::new(&cfg).unwrap();
            let mut reports: Vec<EpochReport> = Vec::new();
            pipeline.run(&mut feed(&cfg, 3), &mut reports, None).unwrap();
            reports.iter().map(EpochReport::summary).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cfg = config();
        cfg.fitness.w1 = 2.0;
        assert!(Pipeline::new(&cfg).is_err());
    }
}
