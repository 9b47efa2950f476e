use anyhow::Context;
use clap::{Parser, ValueEnum};
use iov_twin::{MobilityConfig, TwinConfig};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// `sim_orchestrator` - digital-twin mirror and GWO task allocator for a
/// vehicular edge network.
///
/// Drives one decision epoch per simulated tick: the mirror ingests the
/// tick's observations, pending tasks are generated from fresh vehicles and
/// the Grey Wolf Optimizer places them on vehicle, RSU, MBS or cloud.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Optional JSON file with `twin` and `mobility` sections.
    ///
    /// Missing fields fall back to the built-in reference deployment. Flags
    /// below override values from the file.
    #[arg(long, env = "ORCHESTRATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed for mobility, task sampling and the optimizer.
    #[arg(long, env = "TWIN_SEED")]
    pub seed: Option<u64>,

    /// Number of wolves in the GWO population.
    #[arg(long, env = "GWO_POPULATION")]
    pub population: Option<usize>,

    /// GWO iteration budget per epoch.
    #[arg(long, env = "GWO_ITERATIONS")]
    pub iterations: Option<usize>,

    /// Latency weight in the fitness; load imbalance gets `1 - w1`.
    #[arg(long, env = "FITNESS_W1")]
    pub w1: Option<f64>,

    /// Evaluate wolves on the rayon pool.
    #[arg(long, env = "GWO_PARALLEL")]
    pub parallel: bool,

    /// Stop after this many epochs; runs until the feed ends or a signal
    /// arrives when unset.
    #[arg(long, env = "SIM_STEPS")]
    pub steps: Option<u64>,

    /// Wall-clock pause between epochs, in milliseconds.
    #[arg(long, env = "SIM_TICK_INTERVAL_MS", default_value_t = 1000)]
    pub tick_interval_ms: u64,

    /// Where observations come from.
    #[arg(long, env = "SIM_FEED", value_enum, default_value_t = FeedKind::Standalone)]
    pub feed: FeedKind,

    /// JSON-lines trace consumed by `--feed replay`.
    #[arg(long, env = "SIM_REPLAY_PATH")]
    pub replay_path: Option<PathBuf>,

    /// Vehicles simulated by the standalone feed.
    #[arg(long, env = "SIM_VEHICLES")]
    pub vehicles: Option<usize>,

    /// Listen address for `/metrics` and the reporting endpoints.
    #[arg(long, env = "ORCHESTRATOR_HTTP_LISTEN_ADDR", default_value = "0.0.0.0:9091")]
    pub http_listen_addr: SocketAddr,

    /// Number of epoch summaries kept for `/history` and the results file.
    #[arg(long, env = "ORCHESTRATOR_HISTORY_CAPACITY", default_value_t = 10_000)]
    pub history_capacity: usize,

    /// Write the epoch summaries here as a JSON array on exit.
    #[arg(long, env = "ORCHESTRATOR_RESULTS_PATH")]
    pub results_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum FeedKind {
    /// Built-in seeded mobility model.
    Standalone,
    /// Recorded batches from `--replay-path`.
    Replay,
}

/// Shape of the optional `--config` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub twin: TwinConfig,
    pub mobility: MobilityConfig,
}

/// Fully resolved, validated settings. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub twin: TwinConfig,
    pub mobility: MobilityConfig,
    pub feed: FeedKind,
    pub replay_path: Option<PathBuf>,
    pub steps: Option<u64>,
    pub tick_interval: Duration,
    pub http_listen_addr: SocketAddr,
    pub history_capacity: usize,
    pub results_path: Option<PathBuf>,
}

impl Settings {
    pub fn load(args: Args) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
                serde_json::from_str::<FileConfig>(&raw)
                    .with_context(|| format!("Failed to parse config file '{}'", path.display()))?
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, args)
    }

    fn resolve(file: FileConfig, args: Args) -> anyhow::Result<Self> {
        let FileConfig {
            mut twin,
            mut mobility,
        } = file;

        if let Some(seed) = args.seed {
            twin.seed = seed;
        }
        if let Some(population) = args.population {
            twin.gwo.population_size = population;
        }
        if let Some(iterations) = args.iterations {
            twin.gwo.max_iterations = iterations;
        }
        if let Some(w1) = args.w1 {
            twin.fitness.w1 = w1;
        }
        if args.parallel {
            twin.gwo.parallel_evaluation = true;
        }
        if let Some(vehicles) = args.vehicles {
            mobility.vehicles = vehicles;
        }

        twin.validate().context("Invalid twin configuration")?;
        mobility.validate().context("Invalid mobility configuration")?;
        if args.feed == FeedKind::Replay && args.replay_path.is_none() {
            anyhow::bail!("--replay-path must be set when --feed replay is selected");
        }

        Ok(Self {
            twin,
            mobility,
            feed: args.feed,
            replay_path: args.replay_path,
            steps: args.steps,
            tick_interval: Duration::from_millis(args.tick_interval_ms),
            http_listen_addr: args.http_listen_addr,
            history_capacity: args.history_capacity,
            results_path: args.results_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["sim_orchestrator"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut file = FileConfig::default();
        file.twin.gwo.population_size = 12;
        file.twin.seed = 1;
        let settings = Settings::resolve(file, args(&["--seed", "7", "--w1", "0.25", "--vehicles", "5"])).unwrap();
        assert_eq!(settings.twin.seed, 7);
        assert_eq!(settings.twin.gwo.population_size, 12);
        assert_eq!(settings.twin.fitness.w1, 0.25);
        assert_eq!(settings.mobility.vehicles, 5);
        assert_eq!(settings.feed, FeedKind::Standalone);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        assert!(Settings::resolve(FileConfig::default(), args(&["--population", "2"])).is_err());
    }

    #[test]
    fn test_replay_requires_path() {
        assert!(Settings::resolve(FileConfig::default(), args(&["--feed", "replay"])).is_err());
        let ok = Settings::resolve(
            FileConfig::default(),
            args(&["--feed", "replay", "--replay-path", "trace.jsonl"]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file: FileConfig = serde_json::from_str(r#"{"twin": {"seed": 3}, "mobility": {"vehicles": 8}}"#).unwrap();
        assert_eq!(file.twin.seed, 3);
        assert_eq!(file.twin.gwo.population_size, 30);
        assert_eq!(file.mobility.vehicles, 8);
    }
}
