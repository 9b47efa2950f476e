//! Static configuration for the twin layer and the allocator.
//!
//! Everything here is loaded once at process start and never mutated
//! afterwards. The defaults describe the reference deployment: a 1500 m x
//! 1500 m road grid with three RSUs, one macro base station and one cloud.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, TwinError};

/// Top-level configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    pub topology: TopologyConfig,
    pub links: LinkConfig,
    pub compute: ComputeConfig,
    pub power: PowerConfig,
    pub tiers: TierToggles,
    pub tasks: TaskConfig,
    pub gwo: GwoConfig,
    pub fitness: FitnessConfig,
    pub mirror: MirrorConfig,
    /// Seed for every random stream derived by the pipeline.
    pub seed: u64,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            links: LinkConfig::default(),
            compute: ComputeConfig::default(),
            power: PowerConfig::default(),
            tiers: TierToggles::default(),
            tasks: TaskConfig::default(),
            gwo: GwoConfig::default(),
            fitness: FitnessConfig::default(),
            mirror: MirrorConfig::default(),
            seed: 42,
        }
    }
}

/// Axis-aligned road area in meters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// A fixed edge station (RSU or MBS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Coverage radius in meters. Fixed for the lifetime of the process.
    pub coverage_m: f64,
    pub cpu_ghz: f64,
    pub cache_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub id: String,
    pub cpu_ghz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub bounds: Bounds,
    pub rsus: Vec<StationConfig>,
    pub mbs: StationConfig,
    pub cloud: CloudConfig,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let rsu = |id: &str, x: f64, y: f64| StationConfig {
            id: id.into(),
            x,
            y,
            coverage_m: 450.0,
            cpu_ghz: 3.0,
            cache_mb: 512.0,
        };
        Self {
            bounds: Bounds {
                x_min: 0.0,
                x_max: 1500.0,
                y_min: 0.0,
                y_max: 1500.0,
            },
            rsus: vec![
                rsu("RSU_1", 250.0, 250.0),
                rsu("RSU_2", 1250.0, 250.0),
                rsu("RSU_3", 750.0, 1250.0),
            ],
            mbs: StationConfig {
                id: "MBS_1".into(),
                x: 750.0,
                y: 750.0,
                coverage_m: 1200.0,
                cpu_ghz: 10.0,
                cache_mb: 2048.0,
            },
            cloud: CloudConfig {
                id: "CLOUD".into(),
                cpu_ghz: 15.0,
            },
        }
    }
}

/// Link rates in Mbps plus the fixed cloud backhaul delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub vehicle_rsu_mbps: f64,
    pub rsu_mbs_mbps: f64,
    pub vehicle_mbs_mbps: f64,
    pub vehicle_cloud_mbps: f64,
    pub cloud_propagation_ms: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            vehicle_rsu_mbps: 50.0,
            rsu_mbs_mbps: 200.0,
            vehicle_mbs_mbps: 30.0,
            vehicle_cloud_mbps: 20.0,
            cloud_propagation_ms: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub vehicle_cpu_ghz: f64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            vehicle_cpu_ghz: 1.0,
        }
    }
}

/// Power draw used by the energy report. Energy never enters the fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Energy to cache one KB of result data, in mJ.
    pub cache_mj_per_kb: f64,
    pub rsu_tx_mw: f64,
    pub mbs_tx_mw: f64,
    pub cloud_tx_mw: f64,
    /// Effective switched capacitance of the cloud processor.
    pub cloud_capacitance: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            cache_mj_per_kb: 0.01,
            rsu_tx_mw: 200.0,
            mbs_tx_mw: 300.0,
            cloud_tx_mw: 400.0,
            cloud_capacitance: 1e-28,
        }
    }
}

/// Per-tier switches. A disabled tier is never offered to the optimizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TierToggles {
    pub vehicle: bool,
    pub rsu: bool,
    pub mbs: bool,
    pub cloud: bool,
}

impl Default for TierToggles {
    fn default() -> Self {
        Self {
            vehicle: true,
            rsu: true,
            mbs: true,
            cloud: true,
        }
    }
}

/// Closed interval sampled uniformly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UniformRange {
    pub min: f64,
    pub max: f64,
}

impl UniformRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }

    pub(crate) fn check(&self, field: &'static str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min < 0.0 {
            return Err(TwinError::config(field, "bounds must be finite and non-negative"));
        }
        if self.min > self.max {
            return Err(TwinError::config(field, format!("min {} exceeds max {}", self.min, self.max)));
        }
        Ok(())
    }
}

/// Inclusive integer interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub tasks_per_vehicle: CountRange,
    pub data_kb: UniformRange,
    pub output_kb: UniformRange,
    pub compute_mcycles: UniformRange,
    /// Probability that a generated task carries a hard deadline.
    pub time_bounded_probability: f64,
    /// Time-bounded tasks with less input than this are `Strict`, others `Relaxed`.
    pub strict_data_threshold_kb: f64,
    pub strict_deadline_ms: f64,
    pub relaxed_deadline_ms: f64,
    pub best_effort_deadline_ms: f64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            tasks_per_vehicle: CountRange { min: 1, max: 3 },
            data_kb: UniformRange::new(200.0, 3000.0),
            output_kb: UniformRange::new(20.0, 1000.0),
            compute_mcycles: UniformRange::new(1000.0, 5000.0),
            time_bounded_probability: 0.6,
            strict_data_threshold_kb: 1000.0,
            strict_deadline_ms: 1000.0,
            relaxed_deadline_ms: 3000.0,
            best_effort_deadline_ms: 10_000.0,
        }
    }
}

/// How the GWO control parameter `a` decays from `a_initial` to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecaySchedule {
    Linear,
    Quadratic,
}

impl DecaySchedule {
    /// Value of `a` at iteration `t` of `total`.
    pub fn value(&self, a_initial: f64, t: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let progress = t as f64 / total as f64;
        match self {
            DecaySchedule::Linear => a_initial * (1.0 - progress),
            DecaySchedule::Quadratic => a_initial * (1.0 - progress * progress),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GwoConfig {
    pub population_size: usize,
    pub max_iterations: usize,
    pub a_initial: f64,
    pub schedule: DecaySchedule,
    /// Evaluate the population on the rayon pool.
    pub parallel_evaluation: bool,
    /// Optional wall-clock cap per run, in milliseconds.
    pub wall_clock_budget_ms: Option<u64>,
}

impl Default for GwoConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            max_iterations: 100,
            a_initial: 2.0,
            schedule: DecaySchedule::Linear,
            parallel_evaluation: false,
            wall_clock_budget_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Weight of normalized latency; `1 - w1` goes to load imbalance.
    pub w1: f64,
    /// Mean latency that maps to a normalized latency of 1.
    pub latency_ceiling_ms: f64,
    /// Added once per time-bounded task that misses its deadline.
    pub deadline_penalty: f64,
    /// Processing-time multiplier applied to RSUs while their AoI is above threshold.
    pub stale_rsu_multiplier: f64,
    /// Utilization cap used by the queueing factor.
    pub max_queue_utilization: f64,
    /// Decision epoch length used to convert assigned work into utilization.
    pub epoch_seconds: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            w1: 0.5,
            latency_ceiling_ms: 5000.0,
            deadline_penalty: 10.0,
            stale_rsu_multiplier: 1.5,
            max_queue_utilization: 0.9,
            epoch_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// AoI (seconds) above which a vehicle or category counts as stale.
    pub aoi_threshold_s: f64,
    /// Vehicles unseen for longer than this are dropped from the store.
    pub vehicle_eviction_s: f64,
    pub sync_log_capacity: usize,
    /// Evicted vehicle ids remembered to flag vehicles that return.
    pub evicted_id_capacity: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            aoi_threshold_s: 3.0,
            vehicle_eviction_s: 30.0,
            sync_log_capacity: 256,
            evicted_id_capacity: 1024,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TwinError::config(field, format!("must be positive, got {value}")))
    }
}

fn probability(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TwinError::config(field, format!("must lie in [0, 1], got {value}")))
    }
}

impl TwinConfig {
    /// Rejects any parameter set the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let topo = &self.topology;
        let b = topo.bounds;
        if !(b.x_max > b.x_min && b.y_max > b.y_min) {
            return Err(TwinError::config("topology.bounds", "empty road area"));
        }

        let mut seen = HashSet::new();
        for station in topo.rsus.iter().chain(std::iter::once(&topo.mbs)) {
            if station.id.trim().is_empty() {
                return Err(TwinError::config("topology", "station id must not be empty"));
            }
            if !seen.insert(station.id.as_str()) {
                return Err(TwinError::config("topology", format!("duplicate station id `{}`", station.id)));
            }
            positive("topology.coverage_m", station.coverage_m)?;
            positive("topology.cpu_ghz", station.cpu_ghz)?;
        }
        if topo.cloud.id.trim().is_empty() {
            return Err(TwinError::config("topology.cloud.id", "must not be empty"));
        }
        positive("topology.cloud.cpu_ghz", topo.cloud.cpu_ghz)?;

        let l = &self.links;
        positive("links.vehicle_rsu_mbps", l.vehicle_rsu_mbps)?;
        positive("links.rsu_mbs_mbps", l.rsu_mbs_mbps)?;
        positive("links.vehicle_mbs_mbps", l.vehicle_mbs_mbps)?;
        positive("links.vehicle_cloud_mbps", l.vehicle_cloud_mbps)?;
        if !(l.cloud_propagation_ms >= 0.0) {
            return Err(TwinError::config("links.cloud_propagation_ms", "must be non-negative"));
        }
        positive("compute.vehicle_cpu_ghz", self.compute.vehicle_cpu_ghz)?;

        let p = &self.power;
        for (field, value) in [
            ("power.cache_mj_per_kb", p.cache_mj_per_kb),
            ("power.rsu_tx_mw", p.rsu_tx_mw),
            ("power.mbs_tx_mw", p.mbs_tx_mw),
            ("power.cloud_tx_mw", p.cloud_tx_mw),
            ("power.cloud_capacitance", p.cloud_capacitance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(TwinError::config(field, format!("must be non-negative, got {value}")));
            }
        }

        let t = self.tiers;
        if !(t.vehicle || t.rsu || t.mbs || t.cloud) {
            return Err(TwinError::config("tiers", "at least one execution tier must be enabled"));
        }

        let tasks = &self.tasks;
        if tasks.tasks_per_vehicle.min > tasks.tasks_per_vehicle.max {
            return Err(TwinError::config("tasks.tasks_per_vehicle", "min exceeds max"));
        }
        tasks.data_kb.check("tasks.data_kb")?;
        tasks.output_kb.check("tasks.output_kb")?;
        tasks.compute_mcycles.check("tasks.compute_mcycles")?;
        probability("tasks.time_bounded_probability", tasks.time_bounded_probability)?;
        positive("tasks.strict_deadline_ms", tasks.strict_deadline_ms)?;
        positive("tasks.relaxed_deadline_ms", tasks.relaxed_deadline_ms)?;
        positive("tasks.best_effort_deadline_ms", tasks.best_effort_deadline_ms)?;

        let g = &self.gwo;
        if g.population_size < 3 {
            return Err(TwinError::config(
                "gwo.population_size",
                format!("needs at least 3 wolves for alpha/beta/delta, got {}", g.population_size),
            ));
        }
        if g.max_iterations == 0 {
            return Err(TwinError::config("gwo.max_iterations", "must be at least 1"));
        }
        positive("gwo.a_initial", g.a_initial)?;

        let f = &self.fitness;
        probability("fitness.w1", f.w1)?;
        positive("fitness.latency_ceiling_ms", f.latency_ceiling_ms)?;
        if !(f.deadline_penalty > 1.0) {
            return Err(TwinError::config(
                "fitness.deadline_penalty",
                "must exceed 1 so violations dominate the unconstrained range",
            ));
        }
        if !(f.stale_rsu_multiplier >= 1.0) {
            return Err(TwinError::config("fitness.stale_rsu_multiplier", "must be at least 1"));
        }
        if !(f.max_queue_utilization >= 0.0 && f.max_queue_utilization < 1.0) {
            return Err(TwinError::config("fitness.max_queue_utilization", "must lie in [0, 1)"));
        }
        positive("fitness.epoch_seconds", f.epoch_seconds)?;

        let m = &self.mirror;
        positive("mirror.aoi_threshold_s", m.aoi_threshold_s)?;
        if !(m.vehicle_eviction_s >= m.aoi_threshold_s) {
            return Err(TwinError::config(
                "mirror.vehicle_eviction_s",
                "must be at least the AoI threshold",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TwinConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_weight_out_of_range() {
        let mut cfg = TwinConfig::default();
        cfg.fitness.w1 = 1.2;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TwinError::InvalidConfig { field: "fitness.w1", .. }));
    }

    #[test]
    fn test_rejects_negative_power() {
        let mut cfg = TwinConfig::default();
        cfg.power.mbs_tx_mw = -1.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TwinError::InvalidConfig { field: "power.mbs_tx_mw", .. }));
    }

    #[test]
    fn test_rejects_duplicate_station_ids() {
        let mut cfg = TwinConfig::default();
        cfg.topology.rsus[1].id = "RSU_1".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_small_population_and_weak_penalty() {
        let mut cfg = TwinConfig::default();
        cfg.gwo.population_size = 2;
        assert!(cfg.validate().is_err());

        let mut cfg = TwinConfig::default();
        cfg.fitness.deadline_penalty = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_all_tiers_disabled() {
        let mut cfg = TwinConfig::default();
        cfg.tiers = TierToggles {
            vehicle: false,
            rsu: false,
            mbs: false,
            cloud: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let cfg: TwinConfig =
            serde_json::from_str(r#"{ "seed": 7, "gwo": { "population_size": 12 } }"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.gwo.population_size, 12);
        assert_eq!(cfg.gwo.max_iterations, 100);
        assert_eq!(cfg.topology.rsus.len(), 3);
    }

    #[test]
    fn test_decay_schedules_end_near_zero() {
        assert_eq!(DecaySchedule::Linear.value(2.0, 0, 100), 2.0);
        assert!((DecaySchedule::Linear.value(2.0, 50, 100) - 1.0).abs() < 1e-12);
        assert!(DecaySchedule::Quadratic.value(2.0, 50, 100) > 1.0);
        assert!(DecaySchedule::Linear.value(2.0, 99, 100) < 0.05);
    }
}
