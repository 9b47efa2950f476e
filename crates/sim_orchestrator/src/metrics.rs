use crate::state::CanonicalState;
use axum::{extract::Path, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use iov_twin::{Category, EpochReport, Tier};
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// A container for all Prometheus metric collectors for the sim_orchestrator.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all concurrent tasks of the application.
pub struct Metrics {
    pub registry: Registry,
    /// Decision epochs completed.
    pub epochs_total: IntCounter,
    pub tasks_generated_total: IntCounter,
    /// Placements made, by tier.
    pub placements_total: IntCounterVec,
    /// Time-bounded tasks whose chosen placement misses the deadline.
    pub deadline_violations_total: IntCounter,
    pub best_fitness: Gauge,
    pub normalized_latency: Gauge,
    pub load_imbalance: Gauge,
    /// Modeled energy of the last dispatched assignment, in mJ.
    pub energy_mj: Gauge,
    /// Current Age of Information, by entity category.
    pub aoi_seconds: GaugeVec,
    pub tracked_vehicles: IntGauge,
    /// Wall-clock duration of the optimizer alone, excluding sync and task generation.
    pub optimizer_run_seconds: Histogram,
    /// Requests served by the reporting endpoints, by path.
    pub report_requests_total: IntCounterVec,
}

impl Metrics {
    /// Creates a new `Metrics` struct, initializing and registering all collectors.
    pub fn new() -> Self {
        // Create a custom registry to avoid conflicts with default metrics.
        let registry = Registry::new_custom(Some("sim_orchestrator".into()), None)
            .expect("Failed to create custom metrics registry");

        // A helper macro to create, register, and return a metric collector.
        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric;
                registry
                    .register(Box::new(collector.clone()))
                    .expect("Failed to register metric");
                collector
            }};
        }

        Self {
            epochs_total: reg!(IntCounter::new("epochs_total", "Decision epochs completed").unwrap()),
            tasks_generated_total: reg!(IntCounter::new(
                "tasks_generated_total",
                "Tasks generated across all epochs"
            )
            .unwrap()),
            placements_total: reg!(IntCounterVec::new(
                Opts::new("placements_total", "Task placements by execution tier"),
                &["tier"]
            )
            .unwrap()),
            deadline_violations_total: reg!(IntCounter::new(
                "deadline_violations_total",
                "Time-bounded tasks placed past their deadline"
            )
            .unwrap()),
            best_fitness: reg!(Gauge::new("best_fitness", "Fitness of the last dispatched assignment").unwrap()),
            normalized_latency: reg!(Gauge::new(
                "normalized_latency",
                "Normalized latency term of the last dispatched assignment"
            )
            .unwrap()),
            load_imbalance: reg!(Gauge::new(
                "load_imbalance",
                "Load imbalance term of the last dispatched assignment"
            )
            .unwrap()),
            energy_mj: reg!(Gauge::new("energy_mj", "Modeled energy of the last dispatched assignment").unwrap()),
            aoi_seconds: reg!(GaugeVec::new(
                Opts::new("aoi_seconds", "Age of Information by entity category"),
                &["category"]
            )
            .unwrap()),
            tracked_vehicles: reg!(IntGauge::new("tracked_vehicles", "Vehicle records held by the mirror").unwrap()),
            optimizer_run_seconds: reg!(Histogram::with_opts(
                HistogramOpts::new("optimizer_run_seconds", "Wall-clock duration of one epoch's optimization")
                    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
            )
            .unwrap()),
            report_requests_total: reg!(IntCounterVec::new(
                Opts::new("report_requests_total", "Reporting endpoint requests by path"),
                &["path"]
            )
            .unwrap()),
            registry,
        }
    }

    /// Folds one epoch into the collectors.
    pub fn observe_epoch(&self, report: &EpochReport) {
        let outcome = &report.outcome;
        self.epochs_total.inc();
        self.tasks_generated_total.inc_by(report.tasks.len() as u64);
        let counts = outcome.tier_counts;
        for (tier, n) in [
            (Tier::Vehicle, counts.vehicle),
            (Tier::Rsu, counts.rsu),
            (Tier::Mbs, counts.mbs),
            (Tier::Cloud, counts.cloud),
        ] {
            self.placements_total
                .with_label_values(&[tier.as_str()])
                .inc_by(n as u64);
        }
        self.deadline_violations_total
            .inc_by(outcome.breakdown.violations as u64);
        self.best_fitness.set(outcome.breakdown.fitness);
        self.normalized_latency.set(outcome.breakdown.latency);
        self.load_imbalance.set(outcome.breakdown.load_imbalance);
        self.energy_mj.set(outcome.breakdown.total_energy_mj);
        for category in Category::ALL {
            self.aoi_seconds
                .with_label_values(&[category.as_str()])
                .set(report.aoi.get(category).current);
        }
        self.tracked_vehicles.set(report.vehicles as i64);
    }

    /// Serves `/metrics` plus the read-only reporting endpoints.
    pub fn router(self: &Arc<Self>, state: Arc<CanonicalState>) -> Router {
        let registry = self.registry.clone();
        let m_state = self.clone();
        let m_decision = self.clone();
        let m_vehicle = self.clone();
        let m_convergence = self.clone();
        let m_history = self.clone();
        let s_state = state.clone();
        let s_decision = state.clone();
        let s_vehicle = state.clone();
        let s_convergence = state.clone();
        let s_history = state;

        Router::new()
            .route(
                "/metrics",
                get(move || {
                    let registry = registry.clone();
                    async move {
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        let encoder = TextEncoder::new();
                        encoder
                            .encode(&metric_families, &mut buffer)
                            .expect("Failed to encode metrics");
                        String::from_utf8(buffer)
                            .expect("Metrics buffer is not valid UTF-8")
                            .into_response()
                    }
                }),
            )
            .route(
                "/state",
                get(move || async move {
                    m_state.hit("/state");
                    Json(s_state.mirror_view().as_ref().clone()).into_response()
                }),
            )
            .route(
                "/decision",
                get(move || async move {
                    m_decision.hit("/decision");
                    Json(s_decision.last_decision()).into_response()
                }),
            )
            .route(
                "/decision/:vehicle",
                get(move |Path(vehicle): Path<String>| async move {
                    m_vehicle.hit("/decision/:vehicle");
                    match s_vehicle.vehicle_decision(&vehicle) {
                        Some(placements) => Json(placements).into_response(),
                        None => StatusCode::NOT_FOUND.into_response(),
                    }
                }),
            )
            .route(
                "/convergence",
                get(move || async move {
                    m_convergence.hit("/convergence");
                    Json(s_convergence.convergence()).into_response()
                }),
            )
            .route(
                "/history",
                get(move || async move {
                    m_history.hit("/history");
                    Json(s_history.history()).into_response()
                }),
            )
    }

    fn hit(&self, path: &str) {
        self.report_requests_total.with_label_values(&[path]).inc();
    }
}
