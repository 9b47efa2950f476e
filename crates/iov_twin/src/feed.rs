//! Physical-state sources feeding the mirror, one batch per simulated tick.

use nalgebra::{Point2, Vector2};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::{Bounds, TopologyConfig, UniformRange};
use crate::entity::{Category, CoverageZone, LoadReading};
use crate::error::{Result, TwinError};
use crate::mirror::{Observation, ObservationBatch};

/// Capability interface over wherever observations come from.
pub trait ObservationSource: Send {
    /// Next batch in tick order, or `None` once the source is exhausted.
    fn next_batch(&mut self) -> Result<Option<ObservationBatch>>;

    fn name(&self) -> &'static str;
}

/// Settings of the built-in mobility model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MobilityConfig {
    pub vehicles: usize,
    pub speed_kmh: UniformRange,
    /// Heading perturbation per tick, uniform in `[-jitter, jitter]`.
    pub heading_jitter_rad: f64,
    /// Probability that one vehicle's report is lost in a tick.
    pub drop_probability: f64,
    /// Vehicles an RSU serves at full utilization.
    pub rsu_capacity_vehicles: f64,
    /// Vehicles the MBS serves at full utilization.
    pub mbs_capacity_vehicles: f64,
    /// MBS and cloud report once every this many ticks.
    pub infra_report_every: u64,
    pub tick_seconds: f64,
    /// Stop after this many batches; runs forever when unset.
    pub max_ticks: Option<u64>,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            vehicles: 50,
            speed_kmh: UniformRange { min: 30.0, max: 80.0 },
            heading_jitter_rad: 0.15,
            drop_probability: 0.05,
            rsu_capacity_vehicles: 20.0,
            mbs_capacity_vehicles: 100.0,
            infra_report_every: 5,
            tick_seconds: 1.0,
            max_ticks: None,
        }
    }
}

impl MobilityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(TwinError::config("mobility.drop_probability", "must lie in [0, 1]"));
        }
        if self.tick_seconds <= 0.0 {
            return Err(TwinError::config("mobility.tick_seconds", "must be positive"));
        }
        if self.infra_report_every == 0 {
            return Err(TwinError::config("mobility.infra_report_every", "must be at least 1"));
        }
        if self.rsu_capacity_vehicles <= 0.0 || self.mbs_capacity_vehicles <= 0.0 {
            return Err(TwinError::config("mobility.capacity", "must be positive"));
        }
        self.speed_kmh.check("mobility.speed_kmh")
    }
}

#[derive(Debug, Clone)]
struct SimVehicle {
    id: String,
    position: Point2<f64>,
    speed_kmh: f64,
    heading_rad: f64,
}

impl SimVehicle {
    fn advance(&mut self, dt: f64, jitter: f64, bounds: &Bounds, rng: &mut SmallRng) {
        if jitter > 0.0 {
            self.heading_rad += rng.gen_range(-jitter..=jitter);
        }
        let step = self.speed_kmh / 3.6 * dt;
        self.position += Vector2::new(self.heading_rad.cos(), self.heading_rad.sin()) * step;

        if self.position.x < bounds.x_min || self.position.x > bounds.x_max {
            self.heading_rad = PI - self.heading_rad;
            self.position.x = self.position.x.clamp(bounds.x_min, bounds.x_max);
        }
        if self.position.y < bounds.y_min || self.position.y > bounds.y_max {
            self.heading_rad = -self.heading_rad;
            self.position.y = self.position.y.clamp(bounds.y_min, bounds.y_max);
        }
    }
}

/// Seeded random-waypoint traffic inside the road bounds.
pub struct StandaloneMobility {
    config: MobilityConfig,
    bounds: Bounds,
    rsus: Vec<(String, CoverageZone)>,
    mbs: (String, CoverageZone),
    cloud_id: String,
    vehicles: Vec<SimVehicle>,
    rng: SmallRng,
    tick: u64,
}

impl StandaloneMobility {
    pub fn new(config: MobilityConfig, topology: &TopologyConfig, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let bounds = topology.bounds;
        let vehicles = (0..config.vehicles)
            .map(|i| SimVehicle {
                id: format!("veh_{i}"),
                position: Point2::new(
                    rng.gen_range(bounds.x_min..=bounds.x_max),
                    rng.gen_range(bounds.y_min..=bounds.y_max),
                ),
                speed_kmh: config.speed_kmh.sample(&mut rng),
                heading_rad: rng.gen_range(0.0..2.0 * PI),
            })
            .collect();
        let zone = |x: f64, y: f64, radius_m: f64| CoverageZone {
            center: Point2::new(x, y),
            radius_m,
        };
        let rsus = topology
            .rsus
            .iter()
            .map(|r| (r.id.clone(), zone(r.x, r.y, r.coverage_m)))
            .collect();
        let m = &topology.mbs;
        Self {
            config,
            bounds,
            rsus,
            mbs: (m.id.clone(), zone(m.x, m.y, m.coverage_m)),
            cloud_id: topology.cloud.id.clone(),
            vehicles,
            rng,
            tick: 0,
        }
    }

    fn covered(&self, zone: &CoverageZone) -> usize {
        self.vehicles.iter().filter(|v| zone.contains(&v.position)).count()
    }

    fn load(count: usize, capacity: f64) -> LoadReading {
        LoadReading {
            queue_len: Some(count as u32),
            utilization: Some((count as f64 / capacity).min(1.0)),
            cache_occupancy: None,
        }
    }
}

impl ObservationSource for StandaloneMobility {
    fn next_batch(&mut self) -> Result<Option<ObservationBatch>> {
        if self.config.max_ticks.is_some_and(|max| self.tick >= max) {
            return Ok(None);
        }
        let dt = self.config.tick_seconds;
        if self.tick > 0 {
            let jitter = self.config.heading_jitter_rad;
            for v in &mut self.vehicles {
                v.advance(dt, jitter, &self.bounds, &mut self.rng);
            }
        }

        let mut observations = Vec::with_capacity(self.vehicles.len() + self.rsus.len() + 2);
        for v in &self.vehicles {
            if self.rng.gen_bool(self.config.drop_probability) {
                continue;
            }
            observations.push(Observation::vehicle(
                v.id.clone(),
                v.position.x,
                v.position.y,
                v.speed_kmh,
                v.heading_rad,
            ));
        }
        for (id, zone) in &self.rsus {
            let load = Self::load(self.covered(zone), self.config.rsu_capacity_vehicles);
            observations.push(Observation::station(Category::Rsu, id.clone(), load));
        }
        if self.tick % self.config.infra_report_every == 0 {
            let (id, zone) = &self.mbs;
            let load = Self::load(self.covered(zone), self.config.mbs_capacity_vehicles);
            observations.push(Observation::station(Category::Mbs, id.clone(), load));
            observations.push(Observation::station(
                Category::Cloud,
                self.cloud_id.clone(),
                LoadReading::default(),
            ));
        }

        let batch = ObservationBatch {
            tick: self.tick,
            time: self.tick as f64 * dt,
            observations,
        };
        self.tick += 1;
        Ok(Some(batch))
    }

    fn name(&self) -> &'static str {
        "standalone"
    }
}

/// Replays batches recorded one JSON object per line.
pub struct ReplayFeed {
    lines: Box<dyn BufRead + Send>,
    line_no: usize,
}

impl ReplayFeed {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| TwinError::Feed(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            lines: Box::new(reader),
            line_no: 0,
        }
    }
}

impl ObservationSource for ReplayFeed {
    fn next_batch(&mut self) -> Result<Option<ObservationBatch>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .lines
                .read_line(&mut line)
                .map_err(|e| TwinError::Feed(format!("read failed after line {}: {e}", self.line_no)))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(line.trim())
                .map(Some)
                .map_err(|e| TwinError::Feed(format!("line {}: {e}", self.line_no)));
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TwinConfig;
    use std::io::Cursor;

    fn mobility(cfg: MobilityConfig) -> StandaloneMobility {
        StandaloneMobility::new(cfg, &TwinConfig::default().topology, 7)
    }

    #[test]
    fn test_standalone_reports_every_tick_within_bounds() {
        let mut feed = mobility(MobilityConfig {
            drop_probability: 0.0,
            max_ticks: Some(30),
            ..Default::default()
        });
        let mut batches = 0;
        while let Some(batch) = feed.next_batch().unwrap() {
            assert_eq!(batch.tick, batches);
            assert_eq!(batch.time, batches as f64);
            let vehicles = batch
                .observations
                .iter()
                .filter(|o| o.category == Category::Vehicle)
                .collect::<Vec<_>>();
            assert_eq!(vehicles.len(), 50);
            for v in vehicles {
                assert!((0.0..=1500.0).contains(&v.position.x));
                assert!((0.0..=1500.0).contains(&v.position.y));
            }
            let rsus = batch.observations.iter().filter(|o| o.category == Category::Rsu).count();
            assert_eq!(rsus, 3);
            let mbs = batch.observations.iter().any(|o| o.category == Category::Mbs);
            assert_eq!(mbs, batch.tick % 5 == 0);
            batches += 1;
        }
        assert_eq!(batches, 30);
    }

    #[test]
    fn test_standalone_is_seeded() {
        let cfg = MobilityConfig {
            max_ticks: Some(5),
            ..Default::default()
        };
        let mut a = mobility(cfg.clone());
        let mut b = mobility(cfg);
        for _ in 0..5 {
            assert_eq!(a.next_batch().unwrap(), b.next_batch().unwrap());
        }
    }

    #[test]
    fn test_dropped_reports_thin_the_batch() {
        let mut feed = mobility(MobilityConfig {
            drop_probability: 1.0,
            ..Default::default()
        });
        let batch = feed.next_batch().unwrap().unwrap();
        assert!(batch.observations.iter().all(|o| o.category != Category::Vehicle));
        let util = batch.observations[0].load.unwrap().utilization.unwrap();
        assert!((0.0..=1.0).contains(&util));
    }

    #[test]
    fn test_replay_reads_json_lines() {
        let first = ObservationBatch {
            tick: 1,
            time: 1.0,
            observations: vec![Observation::vehicle("v", 1.0, 2.0, 30.0, 0.5)],
        };
        let second = ObservationBatch {
            tick: 2,
            time: 2.0,
            observations: Vec::new(),
        };
        let text = format!(
            "{}\n\n{}\n",
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        let mut feed = ReplayFeed::from_reader(Cursor::new(text));
        assert_eq!(feed.next_batch().unwrap(), Some(first));
        assert_eq!(feed.next_batch().unwrap(), Some(second));
        assert_eq!(feed.next_batch().unwrap(), None);
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let mut feed = ReplayFeed::from_reader(Cursor::new("{\"tick\": 1,\n"));
        match feed.next_batch() {
            Err(TwinError::Feed(msg)) => assert!(msg.starts_with("line 1")),
            other => panic!("expected feed error, got {other:?}"),
        }
    }

    #[test]
    fn test_mobility_validation() {
        assert!(MobilityConfig::default().validate().is_ok());
        let bad = MobilityConfig {
            infra_report_every: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
