use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use wdp_algo::{AvailabilityModel, Resilience};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reclaimed-water distribution network planner", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Worker threads for parallel stages ("auto" = all cores)
    #[arg(long, default_value = "auto")]
    pub threads: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan a distribution network over a street graph
    Plan {
        /// Street graph JSON file
        graph: PathBuf,
        /// Construction budget (EUR)
        #[arg(long)]
        budget: f64,
        /// Treatment-plant node id
        #[arg(long)]
        source: u64,
        /// Resilience target
        #[arg(long, value_enum, default_value_t = ResilienceArg::None)]
        resilience: ResilienceArg,
        /// Validate candidates against the hydraulic verdict
        #[arg(long)]
        hydraulic_check: bool,
        /// Budget (EUR) for post-hoc secondary-path augmentation
        #[arg(long)]
        augment_budget: Option<f64>,
        /// Monte-Carlo repetitions for the availability stage
        #[arg(long, default_value_t = 10_000)]
        reps: usize,
        /// RNG seed for availability sampling
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Per-pipe failure weighting
        #[arg(long, value_enum, default_value_t = ModelArg::Current)]
        availability_model: ModelArg,
        /// Pipe failure incidence (failures per km per year)
        #[arg(long, default_value_t = 0.4)]
        failure_rate: f64,
        /// Write the report bundle here (JSON)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the planned network here (JSON)
        #[arg(long)]
        network_out: Option<PathBuf>,
    },
    /// Street-graph utilities
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
    /// Availability analysis of an existing sized network
    Availability {
        /// Sized network JSON file
        graph: PathBuf,
        /// Source node id
        #[arg(long)]
        source: u64,
        #[arg(long, default_value_t = 10_000)]
        reps: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, value_enum, default_value_t = ModelArg::Current)]
        availability_model: ModelArg,
        /// Failure incidence: percent per year (legacy) or per km per year (current)
        #[arg(long, default_value_t = 0.4)]
        failure_rate: f64,
        /// Ignore condition weighting and use one failure probability per pipe
        #[arg(long)]
        uniform_p: Option<f64>,
        /// Write the availability report here (JSON)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Print node/edge/demand statistics
    Stats {
        /// Street graph JSON file
        graph: PathBuf,
    },
    /// Export the topology for external tools
    Export {
        /// Street graph JSON file
        graph: PathBuf,
        /// Output format (graphviz/dot)
        #[arg(long, default_value = "dot")]
        format: String,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResilienceArg {
    None,
    K2,
}

impl From<ResilienceArg> for Resilience {
    fn from(value: ResilienceArg) -> Self {
        match value {
            ResilienceArg::None => Resilience::None,
            ResilienceArg::K2 => Resilience::K2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Legacy,
    Current,
}

impl From<ModelArg> for AvailabilityModel {
    fn from(value: ModelArg) -> Self {
        match value {
            ModelArg::Legacy => AvailabilityModel::Legacy,
            ModelArg::Current => AvailabilityModel::Current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_args_parse() {
        let cli = Cli::try_parse_from([
            "wdp",
            "plan",
            "city.json",
            "--budget",
            "2000000",
            "--source",
            "1810",
            "--resilience",
            "k2",
            "--augment-budget",
            "250000",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                budget,
                source,
                resilience,
                augment_budget,
                hydraulic_check,
                ..
            } => {
                assert_eq!(budget, 2_000_000.0);
                assert_eq!(source, 1810);
                assert_eq!(resilience, ResilienceArg::K2);
                assert_eq!(augment_budget, Some(250_000.0));
                assert!(!hydraulic_check);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_plan_requires_budget_and_source() {
        assert!(Cli::try_parse_from(["wdp", "plan", "city.json"]).is_err());
    }

    #[test]
    fn test_graph_stats_parse() {
        let cli = Cli::try_parse_from(["wdp", "graph", "stats", "city.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Graph {
                command: GraphCommands::Stats { .. }
            }
        ));
    }
}
