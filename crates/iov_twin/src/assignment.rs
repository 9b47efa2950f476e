use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use crate::entity::TierCounts;
use crate::error::{Result, TwinError};
use crate::tasks::{Task, TaskId};

/// Execution tier. The instance is implied by the task: `Vehicle` is the
/// originating vehicle and `Rsu` its serving RSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Vehicle,
    Rsu,
    Mbs,
    Cloud,
}

impl Tier {
    /// Candidate order used when decoding and breaking ties.
    pub const ORDER: [Tier; 4] = [Tier::Vehicle, Tier::Rsu, Tier::Mbs, Tier::Cloud];

    pub fn index(self) -> usize {
        match self {
            Tier::Vehicle => 0,
            Tier::Rsu => 1,
            Tier::Mbs => 2,
            Tier::Cloud => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Vehicle => "vehicle",
            Tier::Rsu => "rsu",
            Tier::Mbs => "mbs",
            Tier::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlacement {
    pub task: TaskId,
    pub tier: Tier,
}

/// One candidate solution: every pending task mapped to exactly one tier, in
/// task order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    entries: Vec<TaskPlacement>,
}

impl Assignment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_tiers(tasks: &[Task], tiers: impl IntoIterator<Item = Tier>) -> Self {
        Self {
            entries: tasks
                .iter()
                .zip(tiers)
                .map(|(t, tier)| TaskPlacement { task: t.id, tier })
                .collect(),
        }
    }

    /// Every task on the same tier.
    pub fn uniform(tasks: &[Task], tier: Tier) -> Self {
        Self::from_tiers(tasks, std::iter::repeat(tier))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskPlacement> {
        self.entries.iter()
    }

    pub fn placement(&self, index: usize) -> Option<&TaskPlacement> {
        self.entries.get(index)
    }

    pub fn tier(&self, index: usize) -> Option<Tier> {
        self.entries.get(index).map(|p| p.tier)
    }

    pub fn tier_of(&self, task: TaskId) -> Option<Tier> {
        self.entries.iter().find(|p| p.task == task).map(|p| p.tier)
    }

    /// Checks that each task of `tasks` appears exactly once, in order.
    pub fn verify(&self, tasks: &[Task]) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        let aligned = self.entries.len() == tasks.len()
            && self
                .entries
                .iter()
                .zip(tasks)
                .all(|(p, t)| p.task == t.id && seen.insert(p.task));
        if aligned {
            Ok(())
        } else {
            Err(TwinError::IncompleteAssignment {
                expected: tasks.len(),
                found: self.entries.len(),
            })
        }
    }

    pub fn tier_counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for p in &self.entries {
            match p.tier {
                Tier::Vehicle => counts.vehicle += 1,
                Tier::Rsu => counts.rsu += 1,
                Tier::Mbs => counts.mbs += 1,
                Tier::Cloud => counts.cloud += 1,
            }
        }
        counts
    }

    /// Human-readable `(task, placement)` pairs, naming the concrete instance.
    pub fn labels(&self, tasks: &[Task]) -> Vec<(String, String)> {
        self.entries
            .iter()
            .zip(tasks)
            .map(|(p, t)| {
                let place = match p.tier {
                    Tier::Vehicle => format!("vehicle:{}", t.vehicle_id),
                    Tier::Rsu => format!("rsu:{}", t.rsu_id.as_deref().unwrap_or("?")),
                    Tier::Mbs => "mbs".to_owned(),
                    Tier::Cloud => "cloud".to_owned(),
                };
                (p.task.to_string(), place)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(n: u64) -> Vec<Task> {
        (1..=n).map(|i| Task::new(i, "v", 10.0, 1.0, 10.0)).collect()
    }

    #[test]
    fn test_verify_accepts_complete_assignment() {
        let ts = tasks(3);
        let a = Assignment::from_tiers(&ts, [Tier::Vehicle, Tier::Cloud, Tier::Mbs]);
        assert!(a.verify(&ts).is_ok());
        let counts = a.tier_counts();
        assert_eq!((counts.vehicle, counts.rsu, counts.mbs, counts.cloud), (1, 0, 1, 1));
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_verify_rejects_missing_or_foreign_tasks() {
        let ts = tasks(3);
        let short = Assignment::from_tiers(&ts[..2], [Tier::Vehicle, Tier::Cloud]);
        assert!(matches!(
            short.verify(&ts),
            Err(TwinError::IncompleteAssignment { expected: 3, .. })
        ));

        let other = tasks(4);
        let shifted = Assignment::uniform(&other[1..], Tier::Cloud);
        assert!(shifted.verify(&ts).is_err());
    }

    #[test]
    fn test_labels_name_instances() {
        let ts = vec![Task::new(1, "v_9", 1.0, 1.0, 1.0).with_rsu("RSU_2")];
        let a = Assignment::uniform(&ts, Tier::Rsu);
        assert_eq!(a.labels(&ts), vec![("T-00001".to_string(), "rsu:RSU_2".to_string())]);
        assert_eq!(a.tier_of(TaskId(1)), Some(Tier::Rsu));
    }
}
