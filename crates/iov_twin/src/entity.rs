//! Entity records and the store that holds them.
//!
//! The store is a plain ordered map keyed by `(category, id)`. It is shared
//! copy-on-write: a snapshot is a cheap `Arc` clone, and the next mutation
//! made by the synchronizer detaches it, so an in-flight optimization never
//! observes later physical updates.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::config::{StationConfig, TwinConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vehicle,
    Rsu,
    Mbs,
    Cloud,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Vehicle, Category::Rsu, Category::Mbs, Category::Cloud];

    pub fn index(self) -> usize {
        match self {
            Category::Vehicle => 0,
            Category::Rsu => 1,
            Category::Mbs => 2,
            Category::Cloud => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Vehicle => "vehicle",
            Category::Rsu => "rsu",
            Category::Mbs => "mbs",
            Category::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub category: Category,
    pub id: String,
}

impl EntityKey {
    pub fn new(category: Category, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub speed_kmh: f64,
    pub heading_rad: f64,
}

/// Load fields reported by stations. Every field is optional so partial
/// reports merge into the previous reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_len: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_occupancy: Option<f64>,
}

impl LoadReading {
    pub fn merge(&mut self, update: &LoadReading) {
        if update.queue_len.is_some() {
            self.queue_len = update.queue_len;
        }
        if let Some(u) = update.utilization {
            self.utilization = Some(u.clamp(0.0, 1.0));
        }
        if let Some(c) = update.cache_occupancy {
            self.cache_occupancy = Some(c.clamp(0.0, 1.0));
        }
    }

    pub fn utilization_or_idle(&self) -> f64 {
        self.utilization.unwrap_or(0.0)
    }
}

/// Circular coverage area of an RSU or MBS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageZone {
    pub center: Point2<f64>,
    pub radius_m: f64,
}

impl CoverageZone {
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        nalgebra::distance(&self.center, p) <= self.radius_m
    }
}

/// One mirrored physical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub key: EntityKey,
    pub position: Point2<f64>,
    pub kinematics: Option<Kinematics>,
    pub load: LoadReading,
    pub coverage: Option<CoverageZone>,
    /// Compute capacity, stations and cloud only.
    pub cpu_ghz: Option<f64>,
    /// Serving RSU, vehicles only.
    pub associated_rsu: Option<String>,
    /// Whether the vehicle sits inside MBS coverage.
    pub mbs_covered: bool,
    /// Simulated time of the last observation, seconds.
    pub last_observed: f64,
    pub observation_count: u64,
}

impl EntityRecord {
    fn station(category: Category, cfg: &StationConfig) -> Self {
        let center = Point2::new(cfg.x, cfg.y);
        Self {
            key: EntityKey::new(category, cfg.id.clone()),
            position: center,
            kinematics: None,
            load: LoadReading::default(),
            coverage: Some(CoverageZone {
                center,
                radius_m: cfg.coverage_m,
            }),
            cpu_ghz: Some(cfg.cpu_ghz),
            associated_rsu: None,
            mbs_covered: false,
            last_observed: 0.0,
            observation_count: 0,
        }
    }

    pub fn vehicle(id: impl Into<String>, position: Point2<f64>, time: f64) -> Self {
        Self {
            key: EntityKey::new(Category::Vehicle, id),
            position,
            kinematics: None,
            load: LoadReading::default(),
            coverage: None,
            cpu_ghz: None,
            associated_rsu: None,
            mbs_covered: false,
            last_observed: time,
            observation_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn category(&self) -> Category {
        self.key.category
    }

    pub fn age(&self, now: f64) -> f64 {
        (now - self.last_observed).max(0.0)
    }
}

/// Per-tier task counts of a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub vehicle: usize,
    pub rsu: usize,
    pub mbs: usize,
    pub cloud: usize,
}

impl TierCounts {
    pub fn total(&self) -> usize {
        self.vehicle + self.rsu + self.mbs + self.cloud
    }
}

/// The latest allocation decision, recorded back into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub tick: u64,
    pub time: f64,
    pub fitness: f64,
    pub latency: f64,
    pub load_imbalance: f64,
    pub tier_counts: TierCounts,
    /// `(task id, placement label)` in task order.
    pub placements: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
struct StoreData {
    records: BTreeMap<EntityKey, EntityRecord>,
    last_decision: Option<DecisionRecord>,
}

/// Latest known attributes of every physical entity.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    data: Arc<StoreData>,
}

impl EntityStore {
    /// Store pre-seeded with the fixed infrastructure from configuration.
    pub fn from_config(cfg: &TwinConfig) -> Self {
        let mut records = BTreeMap::new();
        for rsu in &cfg.topology.rsus {
            let r = EntityRecord::station(Category::Rsu, rsu);
            records.insert(r.key.clone(), r);
        }
        let mbs = EntityRecord::station(Category::Mbs, &cfg.topology.mbs);
        records.insert(mbs.key.clone(), mbs);

        let cloud = &cfg.topology.cloud;
        let cloud_record = EntityRecord {
            key: EntityKey::new(Category::Cloud, cloud.id.clone()),
            position: Point2::origin(),
            kinematics: None,
            load: LoadReading::default(),
            coverage: None,
            cpu_ghz: Some(cloud.cpu_ghz),
            associated_rsu: None,
            mbs_covered: false,
            last_observed: 0.0,
            observation_count: 0,
        };
        records.insert(cloud_record.key.clone(), cloud_record);

        Self {
            data: Arc::new(StoreData {
                records,
                last_decision: None,
            }),
        }
    }

    pub fn get(&self, category: Category, id: &str) -> Option<&EntityRecord> {
        self.data.records.get(&EntityKey::new(category, id))
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.data.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.data.records.values()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &EntityRecord> {
        self.data
            .records
            .values()
            .filter(move |r| r.key.category == category)
    }

    pub fn last_decision(&self) -> Option<&DecisionRecord> {
        self.data.last_decision.as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: &EntityKey) -> Option<&mut EntityRecord> {
        Arc::make_mut(&mut self.data).records.get_mut(key)
    }

    pub(crate) fn insert(&mut self, record: EntityRecord) {
        Arc::make_mut(&mut self.data)
            .records
            .insert(record.key.clone(), record);
    }

    pub(crate) fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&EntityKey, &mut EntityRecord) -> bool,
    {
        let data = Arc::make_mut(&mut self.data);
        let before = data.records.len();
        data.records.retain(keep);
        before - data.records.len()
    }

    pub(crate) fn set_last_decision(&mut self, decision: DecisionRecord) {
        Arc::make_mut(&mut self.data).last_decision = Some(decision);
    }
}
