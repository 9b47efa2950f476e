//! Digital-twin mirror and Grey Wolf task allocation for a vehicular edge
//! network (vehicles, roadside units, one macro base station, cloud).
//!
//! Per decision epoch:
//!
//! 1. [`MirrorSynchronizer::ingest`] folds a feed batch into the
//!    [`EntityStore`] and updates Age-of-Information per category.
//! 2. [`MirrorSynchronizer::snapshot`] freezes the store for the run.
//! 3. [`TaskGenerator::generate`] derives pending tasks from fresh vehicles.
//! 4. [`GwoEngine::optimize`] searches task-to-tier assignments scored by
//!    [`FitnessEvaluator`].
//! 5. The best assignment is recorded back into the mirror.
//!
//! [`Pipeline`] strings these together; [`ObservationSource`] and
//! [`DecisionSink`] are the two boundaries to the outside world.

pub mod assignment;
pub mod config;
pub mod entity;
pub mod error;
pub mod feed;
pub mod fitness;
pub mod gwo;
pub mod mirror;
pub mod pipeline;
pub mod tasks;

pub use assignment::{Assignment, TaskPlacement, Tier};
pub use config::{PowerConfig, TwinConfig};
pub use entity::{Category, DecisionRecord, EntityRecord, EntityStore, LoadReading, TierCounts};
pub use error::{Result, TwinError};
pub use feed::{MobilityConfig, ObservationSource, ReplayFeed, StandaloneMobility};
pub use fitness::{FitnessBreakdown, FitnessEvaluator};
pub use gwo::{ConvergenceRecord, GwoEngine, OptimizationOutcome};
pub use mirror::{AoiSnapshot, MirrorSnapshot, MirrorSynchronizer, Observation, ObservationBatch};
pub use pipeline::{DecisionSink, EpochReport, EpochSummary, Pipeline};
pub use tasks::{DeadlineClass, Task, TaskGenerator, TaskId};
