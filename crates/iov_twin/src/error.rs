use thiserror::Error;

use crate::entity::Category;

/// Errors surfaced by the twin layer and the allocator.
///
/// Only configuration-class failures end up here. Missing observations are
/// absorbed by AoI accounting and deadline misses by the fitness penalty.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TwinError {
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("observation references unknown {category} `{id}` (fixed entities are set at configuration time)")]
    UnknownEntity { category: Category, id: String },

    #[error("simulated time went backwards: previous sync at {previous}s, got {current}s")]
    TimeRegression { previous: f64, current: f64 },

    #[error("task `{task}` has no available execution tier")]
    NoAvailableTier { task: String },

    #[error("assignment covers {found} tasks, expected {expected}")]
    IncompleteAssignment { expected: usize, found: usize },

    #[error("observation feed failed: {0}")]
    Feed(String),
}

impl TwinError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TwinError>;
