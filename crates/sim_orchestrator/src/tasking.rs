use crate::{metrics::Metrics, state::CanonicalState};
use iov_twin::{DecisionSink, EpochReport, ObservationSource, Pipeline};
use std::sync::Arc;

/// Dispatches each epoch's decision into the canonical state and metrics.
pub struct StateSink {
    state: Arc<CanonicalState>,
    metrics: Arc<Metrics>,
}

impl StateSink {
    pub fn new(state: Arc<CanonicalState>, metrics: Arc<Metrics>) -> Self {
        Self { state, metrics }
    }
}

impl DecisionSink for StateSink {
    fn dispatch(&mut self, report: &EpochReport) -> iov_twin::Result<()> {
        self.state.record_epoch(report);
        self.metrics.observe_epoch(report);
        tracing::debug!(
            tick = report.tick,
            vehicles = self.state.vehicle_decisions.len(),
            "Decision dispatched"
        );
        Ok(())
    }
}

/// Whether the feed still had data for the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochStatus {
    Ran,
    FeedExhausted,
}

/// Owns everything one epoch needs so it can be moved onto a blocking thread.
pub struct EpochRunner {
    pub pipeline: Pipeline,
    pub feed: Box<dyn ObservationSource>,
    pub sink: StateSink,
}

impl EpochRunner {
    pub fn run_epoch(&mut self) -> anyhow::Result<EpochStatus> {
        let Some(batch) = self.feed.next_batch()? else {
            return Ok(EpochStatus::FeedExhausted);
        };
        let report = self.pipeline.step(&batch)?;
        self.sink
            .metrics
            .optimizer_run_seconds
            .observe(self.pipeline.last_optimize_seconds());

        self.sink.state.broadcast_mirror(batch.tick, self.pipeline.mirror());
        self.sink.dispatch(&report)?;
        Ok(EpochStatus::Ran)
    }

    pub fn epochs(&self) -> u64 {
        self.pipeline.epochs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iov_twin::{MobilityConfig, StandaloneMobility, TwinConfig};

    #[test]
    fn test_runner_dispatches_until_feed_ends() {
        let mut cfg = TwinConfig::default();
        cfg.gwo.population_size = 5;
        cfg.gwo.max_iterations = 4;
        let feed = StandaloneMobility::new(
            MobilityConfig {
                vehicles: 4,
                max_ticks: Some(2),
                ..Default::default()
            },
            &cfg.topology,
            cfg.seed,
        );
        let (state, _rx) = CanonicalState::new(16);
        let metrics = Arc::new(Metrics::new());
        let mut runner = EpochRunner {
            pipeline: Pipeline::new(&cfg).unwrap(),
            feed: Box::new(feed),
            sink: StateSink::new(state.clone(), metrics.clone()),
        };

        assert_eq!(runner.run_epoch().unwrap(), EpochStatus::Ran);
        assert_eq!(runner.run_epoch().unwrap(), EpochStatus::Ran);
        assert_eq!(runner.run_epoch().unwrap(), EpochStatus::FeedExhausted);
        assert_eq!(runner.epochs(), 2);
        assert_eq!(metrics.epochs_total.get(), 2);
        assert_eq!(metrics.optimizer_run_seconds.get_sample_count(), 2);
        let last = state.history().last().cloned().unwrap();
        assert_eq!(metrics.energy_mj.get(), last.energy_mj);
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.mirror_view().tick, 1);
    }
}
