use dashmap::DashMap;
use iov_twin::{
    AoiSnapshot, ConvergenceRecord, EntityRecord, EpochReport, EpochSummary, FitnessBreakdown,
    MirrorSynchronizer, TierCounts,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use tokio::sync::watch;

/// Everything the reporting endpoints read. Written only by the epoch loop.
pub struct CanonicalState {
    pub session_id: String,
    /// Dispatched placements per vehicle for the latest epoch, served by
    /// `/decision/:vehicle`.
    pub vehicle_decisions: DashMap<String, Vec<VehiclePlacement>>,
    pub mirror_tx: watch::Sender<Arc<MirrorView>>,
    last_decision: RwLock<Option<DecisionView>>,
    convergence: RwLock<Vec<ConvergenceRecord>>,
    history: RwLock<VecDeque<EpochSummary>>,
    history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehiclePlacement {
    pub task: String,
    pub placement: String,
    pub deadline_ms: f64,
    pub time_bounded: bool,
}

/// Read-only copy of the mirror as of the last sync.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorView {
    pub session_id: String,
    pub timestamp_ms: i64,
    pub tick: u64,
    pub simulated_time: f64,
    pub total_syncs: u64,
    pub aoi: Option<AoiSnapshot>,
    pub entities: Vec<EntityRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionView {
    pub tick: u64,
    pub timestamp_ms: i64,
    pub breakdown: FitnessBreakdown,
    pub tier_counts: TierCounts,
    pub iterations_run: usize,
    pub budget_exhausted: bool,
    /// `(task, placement)` pairs in task order.
    pub placements: Vec<(String, String)>,
    pub by_vehicle: BTreeMap<String, Vec<VehiclePlacement>>,
}

impl CanonicalState {
    pub fn new(history_capacity: usize) -> (Arc<Self>, watch::Receiver<Arc<MirrorView>>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(Arc::new(MirrorView {
            session_id: session_id.clone(),
            timestamp_ms: 0,
            tick: 0,
            simulated_time: 0.0,
            total_syncs: 0,
            aoi: None,
            entities: Vec::new(),
        }));
        let this = Arc::new(Self {
            session_id,
            vehicle_decisions: DashMap::new(),
            mirror_tx: tx,
            last_decision: RwLock::new(None),
            convergence: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            history_capacity,
        });
        (this, rx)
    }

    /// Publishes the mirror after a sync.
    pub fn broadcast_mirror(&self, tick: u64, mirror: &MirrorSynchronizer) {
        let aoi = mirror.aoi();
        let view = MirrorView {
            session_id: self.session_id.clone(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            tick,
            simulated_time: aoi.time,
            total_syncs: mirror.total_syncs(),
            aoi: Some(aoi),
            entities: mirror.store().iter().cloned().collect(),
        };
        self.mirror_tx.send_replace(Arc::new(view));
    }

    /// Stores one epoch's decision, replacing the previous one.
    pub fn record_epoch(&self, report: &EpochReport) {
        let outcome = &report.outcome;
        let placements = outcome.assignment.labels(&report.tasks);

        let mut by_vehicle: BTreeMap<String, Vec<VehiclePlacement>> = BTreeMap::new();
        for (task, (id, placement)) in report.tasks.iter().zip(&placements) {
            by_vehicle
                .entry(task.vehicle_id.clone())
                .or_default()
                .push(VehiclePlacement {
                    task: id.clone(),
                    placement: placement.clone(),
                    deadline_ms: task.deadline_ms,
                    time_bounded: task.time_bounded,
                });
        }
        self.vehicle_decisions.clear();
        for (vehicle, list) in &by_vehicle {
            self.vehicle_decisions.insert(vehicle.clone(), list.clone());
        }

        *self.last_decision.write() = Some(DecisionView {
            tick: report.tick,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            breakdown: outcome.breakdown.clone(),
            tier_counts: outcome.tier_counts,
            iterations_run: outcome.iterations_run,
            budget_exhausted: outcome.budget_exhausted,
            placements,
            by_vehicle,
        });
        *self.convergence.write() = outcome.convergence.clone();

        let mut history = self.history.write();
        if self.history_capacity > 0 {
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(report.summary());
        }
    }

    pub fn mirror_view(&self) -> Arc<MirrorView> {
        self.mirror_tx.borrow().clone()
    }

    pub fn last_decision(&self) -> Option<DecisionView> {
        self.last_decision.read().clone()
    }

    /// Latest placements for one vehicle.
    pub fn vehicle_decision(&self, vehicle: &str) -> Option<Vec<VehiclePlacement>> {
        self.vehicle_decisions.get(vehicle).map(|e| e.value().clone())
    }

    pub fn convergence(&self) -> Vec<ConvergenceRecord> {
        self.convergence.read().clone()
    }

    pub fn history(&self) -> Vec<EpochSummary> {
        self.history.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iov_twin::{MobilityConfig, ObservationSource, Pipeline, StandaloneMobility, TwinConfig};

    fn reports(epochs: u64) -> (Pipeline, Vec<EpochReport>) {
        let mut cfg = TwinConfig::default();
        cfg.gwo.population_size = 6;
        cfg.gwo.max_iterations = 5;
        let mut feed = StandaloneMobility::new(
            MobilityConfig {
                vehicles: 6,
                drop_probability: 0.0,
                ..Default::default()
            },
            &cfg.topology,
            cfg.seed,
        );
        let mut pipeline = Pipeline::new(&cfg).unwrap();
        let mut out = Vec::new();
        for _ in 0..epochs {
            let batch = feed.next_batch().unwrap().unwrap();
            out.push(pipeline.step(&batch).unwrap());
        }
        (pipeline, out)
    }

    #[test]
    fn test_record_epoch_replaces_decision_and_bounds_history() {
        let (state, _rx) = CanonicalState::new(2);
        let (_, reports) = reports(3);
        for r in &reports {
            state.record_epoch(r);
        }

        let history = state.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tick, 1);
        let last = reports.last().unwrap();
        let decision = state.last_decision().unwrap();
        assert_eq!(decision.tick, last.tick);
        assert_eq!(decision.placements.len(), last.tasks.len());
        assert_eq!(state.convergence().len(), last.outcome.convergence.len());

        let dispatched: usize = state.vehicle_decisions.iter().map(|e| e.value().len()).sum();
        assert_eq!(dispatched, last.tasks.len());
        let grouped: usize = decision.by_vehicle.values().map(Vec::len).sum();
        assert_eq!(grouped, last.tasks.len());

        let task = last.tasks.first().expect("epoch generated tasks");
        let mine = state.vehicle_decision(&task.vehicle_id).unwrap();
        assert_eq!(mine, decision.by_vehicle[&task.vehicle_id]);
        assert!(mine.iter().any(|p| p.task == task.id.to_string()));
        assert!(state.vehicle_decision("no_such_vehicle").is_none());
    }

    #[test]
    fn test_broadcast_mirror_publishes_entities() {
        let (state, rx) = CanonicalState::new(10);
        assert!(rx.borrow().entities.is_empty());
        let (pipeline, _) = reports(1);
        state.broadcast_mirror(0, pipeline.mirror());

        let view = state.mirror_view();
        assert_eq!(view.entities.len(), pipeline.mirror().store().len());
        assert_eq!(view.total_syncs, 1);
        assert!(view.aoi.is_some());
        assert_eq!(rx.borrow().session_id, state.session_id);
    }
}
