//! Mirror synchronizer: folds observation batches into the entity store and
//! keeps Age-of-Information bookkeeping per entity category.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::config::{MirrorConfig, TwinConfig};
use crate::entity::{
    Category, CoverageZone, DecisionRecord, EntityKey, EntityRecord, EntityStore, Kinematics,
    LoadReading,
};
use crate::error::{Result, TwinError};

/// A single entity observation from the physical feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub category: Category,
    pub position: Point2<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_rad: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadReading>,
}

impl Observation {
    pub fn vehicle(id: impl Into<String>, x: f64, y: f64, speed_kmh: f64, heading_rad: f64) -> Self {
        Self {
            id: id.into(),
            category: Category::Vehicle,
            position: Point2::new(x, y),
            speed_kmh: Some(speed_kmh),
            heading_rad: Some(heading_rad),
            load: None,
        }
    }

    pub fn station(category: Category, id: impl Into<String>, load: LoadReading) -> Self {
        Self {
            id: id.into(),
            category,
            position: Point2::origin(),
            speed_kmh: None,
            heading_rad: None,
            load: Some(load),
        }
    }
}

/// Everything the physical feed reported for one simulated tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationBatch {
    pub tick: u64,
    /// Simulated time in seconds.
    pub time: f64,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryAoi {
    pub category: Category,
    /// Seconds since the category was last refreshed.
    pub current: f64,
    /// Mean of `current` over every sync call so far.
    pub mean: f64,
    pub max: f64,
    pub refreshes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiSnapshot {
    pub time: f64,
    pub categories: [CategoryAoi; 4],
}

impl AoiSnapshot {
    pub fn get(&self, category: Category) -> &CategoryAoi {
        &self.categories[category.index()]
    }

    /// Mean of the current per-category AoI values.
    pub fn average(&self) -> f64 {
        self.categories.iter().map(|c| c.current).sum::<f64>() / self.categories.len() as f64
    }
}

#[derive(Debug, Clone)]
struct AoiTracker {
    current: [f64; 4],
    sum: [f64; 4],
    max: [f64; 4],
    refreshes: [u64; 4],
    samples: u64,
}

impl AoiTracker {
    fn new() -> Self {
        Self {
            current: [0.0; 4],
            sum: [0.0; 4],
            max: [0.0; 4],
            refreshes: [0; 4],
            samples: 0,
        }
    }

    fn advance(&mut self, elapsed: f64, present: &HashSet<Category>) {
        for category in Category::ALL {
            let i = category.index();
            if present.contains(&category) {
                self.current[i] = 0.0;
                self.refreshes[i] += 1;
            } else {
                self.current[i] += elapsed;
            }
            self.sum[i] += self.current[i];
            self.max[i] = self.max[i].max(self.current[i]);
        }
        self.samples += 1;
    }

    fn snapshot(&self, time: f64) -> AoiSnapshot {
        let samples = self.samples.max(1) as f64;
        let categories = Category::ALL.map(|category| {
            let i = category.index();
            CategoryAoi {
                category,
                current: self.current[i],
                mean: self.sum[i] / samples,
                max: self.max[i],
                refreshes: self.refreshes[i],
            }
        });
        AoiSnapshot { time, categories }
    }
}

/// Summary of one sync call, kept in a bounded log for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub tick: u64,
    pub time: f64,
    pub vehicles_synced: usize,
    pub infrastructure_synced: usize,
    pub evicted: usize,
    /// Vehicles reported again after having been evicted.
    pub returned: usize,
    pub stale_vehicles: usize,
    pub mean_entity_age: f64,
    pub max_entity_age: f64,
}

/// Immutable view handed to the task generator and the optimizer.
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    pub tick: u64,
    pub time: f64,
    pub store: EntityStore,
    pub aoi: AoiSnapshot,
    pub aoi_threshold_s: f64,
}

impl MirrorSnapshot {
    pub fn is_fresh(&self, record: &EntityRecord) -> bool {
        record.age(self.time) <= self.aoi_threshold_s
    }

    /// Vehicles recent enough to generate work, in id order.
    pub fn fresh_vehicles(&self) -> impl Iterator<Item = &EntityRecord> {
        self.store
            .by_category(Category::Vehicle)
            .filter(move |v| self.is_fresh(v))
    }

    /// Whether RSU load readings are older than the staleness threshold.
    pub fn rsu_data_stale(&self) -> bool {
        self.aoi.get(Category::Rsu).current > self.aoi_threshold_s
    }

    pub fn rsu(&self, id: &str) -> Option<&EntityRecord> {
        self.store.get(Category::Rsu, id)
    }

    pub fn mbs(&self) -> Option<&EntityRecord> {
        self.store.by_category(Category::Mbs).next()
    }

    /// Every RSU and MBS record, the nodes load balance is measured over.
    pub fn edge_nodes(&self) -> impl Iterator<Item = &EntityRecord> {
        self.store
            .iter()
            .filter(|r| matches!(r.category(), Category::Rsu | Category::Mbs))
    }
}

pub struct MirrorSynchronizer {
    config: MirrorConfig,
    store: EntityStore,
    rsu_zones: Vec<(String, CoverageZone)>,
    mbs_zone: Option<CoverageZone>,
    aoi: AoiTracker,
    last_time: Option<f64>,
    last_tick: u64,
    total_syncs: u64,
    sync_log: VecDeque<SyncRecord>,
    evicted_ids: EvictedIds,
}

/// Bounded memory of evicted vehicle ids, oldest forgotten first.
#[derive(Debug, Default)]
struct EvictedIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl EvictedIds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn remember(&mut self, id: String) {
        if self.capacity == 0 || !self.ids.insert(id.clone()) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id);
    }

    /// Forgets `id`, returning whether it was remembered.
    fn take(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            self.order.retain(|o| o != id);
            true
        } else {
            false
        }
    }
}

impl MirrorSynchronizer {
    pub fn new(cfg: &TwinConfig) -> Self {
        let store = EntityStore::from_config(cfg);
        let rsu_zones = store
            .by_category(Category::Rsu)
            .filter_map(|r| r.coverage.map(|z| (r.id().to_owned(), z)))
            .collect();
        let mbs_zone = store.by_category(Category::Mbs).find_map(|r| r.coverage);
        Self {
            config: cfg.mirror.clone(),
            store,
            rsu_zones,
            mbs_zone,
            aoi: AoiTracker::new(),
            last_time: None,
            last_tick: 0,
            total_syncs: 0,
            sync_log: VecDeque::new(),
            evicted_ids: EvictedIds::with_capacity(cfg.mirror.evicted_id_capacity),
        }
    }

    /// Ingests one feed batch, tagging the sync with the batch's tick.
    pub fn ingest(&mut self, batch: &ObservationBatch) -> Result<AoiSnapshot> {
        let aoi = self.sync(&batch.observations, batch.time)?;
        self.last_tick = batch.tick;
        if let Some(last) = self.sync_log.back_mut() {
            last.tick = batch.tick;
        }
        Ok(aoi)
    }

    /// Folds `observations` into the store at `simulated_time`.
    ///
    /// The whole batch is validated before anything is written, so a rejected
    /// batch leaves the mirror untouched.
    pub fn sync(&mut self, observations: &[Observation], simulated_time: f64) -> Result<AoiSnapshot> {
        if let Some(previous) = self.last_time {
            if simulated_time < previous {
                return Err(TwinError::TimeRegression {
                    previous,
                    current: simulated_time,
                });
            }
        }
        for obs in observations {
            if obs.category != Category::Vehicle
                && !self.store.contains(&EntityKey::new(obs.category, obs.id.as_str()))
            {
                return Err(TwinError::UnknownEntity {
                    category: obs.category,
                    id: obs.id.clone(),
                });
            }
        }

        let elapsed = self.last_time.map_or(0.0, |t| simulated_time - t);
        let mut present = HashSet::new();
        let mut vehicles_synced = 0;
        let mut infrastructure_synced = 0;
        let mut returned = 0;

        for obs in observations {
            present.insert(obs.category);
            if obs.category == Category::Vehicle {
                if self.apply_vehicle(obs, simulated_time) {
                    returned += 1;
                }
                vehicles_synced += 1;
            } else {
                self.apply_station(obs, simulated_time);
                infrastructure_synced += 1;
            }
        }

        let horizon = self.config.vehicle_eviction_s;
        let mut evicted_now = Vec::new();
        let evicted = self.store.retain(|key, record| {
            let keep = key.category != Category::Vehicle || record.age(simulated_time) <= horizon;
            if !keep {
                evicted_now.push(key.id.clone());
            }
            keep
        });
        if evicted > 0 {
            tracing::debug!(evicted, time = simulated_time, "Evicted long-unseen vehicles");
        }
        for id in evicted_now {
            self.evicted_ids.remember(id);
        }

        self.aoi.advance(elapsed, &present);
        self.last_time = Some(simulated_time);
        self.total_syncs += 1;

        let mut record = self.summarize(simulated_time, vehicles_synced, infrastructure_synced, evicted);
        record.returned = returned;
        tracing::debug!(
            time = simulated_time,
            vehicles = vehicles_synced,
            infrastructure = infrastructure_synced,
            stale = record.stale_vehicles,
            "Mirror synchronized"
        );
        if self.sync_log.len() == self.config.sync_log_capacity {
            self.sync_log.pop_front();
        }
        if self.config.sync_log_capacity > 0 {
            self.sync_log.push_back(record);
        }

        Ok(self.aoi.snapshot(simulated_time))
    }

    /// Returns true when the vehicle had been evicted earlier.
    fn apply_vehicle(&mut self, obs: &Observation, time: f64) -> bool {
        let key = EntityKey::new(Category::Vehicle, obs.id.as_str());
        let mut returned = false;
        if !self.store.contains(&key) {
            if self.evicted_ids.take(&obs.id) {
                tracing::warn!(vehicle = %obs.id, time, "Observation for an evicted vehicle; re-admitting it");
                returned = true;
            }
            self.store
                .insert(EntityRecord::vehicle(obs.id.clone(), obs.position, time));
        }
        let associated_rsu = self.serving_rsu(&obs.position);
        let mbs_covered = self.mbs_zone.is_some_and(|z| z.contains(&obs.position));

        if let Some(record) = self.store.get_mut(&key) {
            record.position = obs.position;
            if let Some(speed_kmh) = obs.speed_kmh {
                let heading_rad = obs
                    .heading_rad
                    .or(record.kinematics.map(|k| k.heading_rad))
                    .unwrap_or(0.0);
                record.kinematics = Some(Kinematics {
                    speed_kmh,
                    heading_rad,
                });
            }
            if let Some(load) = &obs.load {
                record.load.merge(load);
            }
            record.associated_rsu = associated_rsu;
            record.mbs_covered = mbs_covered;
            record.last_observed = time;
            record.observation_count += 1;
        }
        returned
    }

    fn apply_station(&mut self, obs: &Observation, time: f64) {
        let key = EntityKey::new(obs.category, obs.id.as_str());
        if let Some(record) = self.store.get_mut(&key) {
            if let Some(load) = &obs.load {
                record.load.merge(load);
            }
            record.last_observed = time;
            record.observation_count += 1;
        }
    }

    /// Nearest RSU whose coverage contains `p`.
    fn serving_rsu(&self, p: &Point2<f64>) -> Option<String> {
        self.rsu_zones
            .iter()
            .filter(|(_, zone)| zone.contains(p))
            .map(|(id, zone)| (id, nalgebra::distance(&zone.center, p)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id.clone())
    }

    fn summarize(&self, time: f64, vehicles: usize, infrastructure: usize, evicted: usize) -> SyncRecord {
        let threshold = self.config.aoi_threshold_s;
        let mut ages = 0.0;
        let mut max_age: f64 = 0.0;
        let mut stale_vehicles = 0;
        for record in self.store.iter() {
            let age = record.age(time);
            ages += age;
            max_age = max_age.max(age);
            if record.category() == Category::Vehicle && age > threshold {
                stale_vehicles += 1;
            }
        }
        SyncRecord {
            tick: self.last_tick,
            time,
            vehicles_synced: vehicles,
            infrastructure_synced: infrastructure,
            evicted,
            returned: 0,
            stale_vehicles,
            mean_entity_age: if self.store.is_empty() {
                0.0
            } else {
                ages / self.store.len() as f64
            },
            max_entity_age: max_age,
        }
    }

    /// Freezes the current state for one optimization run.
    pub fn snapshot(&self) -> MirrorSnapshot {
        let time = self.last_time.unwrap_or(0.0);
        MirrorSnapshot {
            tick: self.last_tick,
            time,
            store: self.store.clone(),
            aoi: self.aoi.snapshot(time),
            aoi_threshold_s: self.config.aoi_threshold_s,
        }
    }

    pub fn record_decision(&mut self, decision: DecisionRecord) {
        self.store.set_last_decision(decision);
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn aoi(&self) -> AoiSnapshot {
        self.aoi.snapshot(self.last_time.unwrap_or(0.0))
    }

    pub fn total_syncs(&self) -> u64 {
        self.total_syncs
    }

    pub fn sync_log(&self) -> impl Iterator<Item = &SyncRecord> {
        self.sync_log.iter()
    }
}
