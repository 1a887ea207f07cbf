use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;
use wdp_algo::{
    availability, AvailabilityConfig, CancelToken, PlanConfig, Planner, StaticVerdictProbe,
};
use wdp_core::{graph_utils, Diagnostics, Network, NodeId};

mod cli;

use cli::{Cli, Commands, GraphCommands, ModelArg};

fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

fn load_graph(path: &Path) -> Result<Network> {
    let (network, diagnostics) = wdp_io::import_street_graph(path)
        .with_context(|| format!("importing street graph {}", path.display()))?;
    report_diagnostics(&diagnostics)?;
    info!("{}", network.stats());
    Ok(network)
}

fn report_diagnostics(diagnostics: &Diagnostics) -> Result<()> {
    for issue in diagnostics.warnings() {
        warn!("{issue}");
    }
    if diagnostics.has_errors() {
        bail!("street graph failed validation:\n{diagnostics}");
    }
    Ok(())
}

/// Report bundle as written to disk: the planner output plus provenance.
#[derive(Serialize)]
struct CliReport<T: Serialize> {
    generated_at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    report: T,
}

fn write_or_print<T: Serialize>(report: T, out: Option<&PathBuf>) -> Result<()> {
    let wrapped = CliReport {
        generated_at: Utc::now(),
        report,
    };
    match out {
        Some(path) => {
            wdp_io::write_report(&wrapped, path)
                .with_context(|| format!("writing report {}", path.display()))?;
            info!("report written to {}", path.display());
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&wrapped)?);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_plan(
    graph: &Path,
    budget: f64,
    source: u64,
    resilience: cli::ResilienceArg,
    hydraulic_check: bool,
    augment_budget: Option<f64>,
    reps: usize,
    seed: u64,
    model: ModelArg,
    failure_rate: f64,
    out: Option<&PathBuf>,
    network_out: Option<&PathBuf>,
) -> Result<()> {
    let street = load_graph(graph)?;

    let mut config = PlanConfig::new(budget, NodeId::new(source));
    config.resilience = resilience.into();
    config.hydraulic_check = hydraulic_check;
    config.augment_budget = augment_budget;
    config.monte_carlo_reps = reps;
    config.rng_seed = seed;
    config.availability_model = model.into();
    config.failure_rate = failure_rate;

    // No external solver is wired into this binary; the hydraulic flag runs
    // the speed-band sizer against an accepting verdict.
    let probe = StaticVerdictProbe::accepting();
    let mut planner = Planner::new(config);
    if hydraulic_check {
        warn!("no external hydraulic solver configured; accepting speed-band sizings");
        planner = planner.with_probe(&probe);
    }

    let outcome = planner.run(&street, &CancelToken::new())?;

    println!(
        "served {:.1}% of demand ({} consumers, {:.0} m of pipe, {:.0} EUR), stop: {:?}",
        outcome.report.build.percent_served,
        outcome.report.build.consumption_nodes.len(),
        outcome.report.build.pipe_length_meters,
        outcome.report.build.cost_eur,
        outcome.report.build.stop_reason,
    );
    if let Some(availability) = &outcome.report.availability {
        println!(
            "availability: network {:.4}, worst node {:.4}, YAUW {:.1} m3",
            availability.network_availability,
            availability.node_worst_availability,
            availability.yauw,
        );
    }

    if let Some(path) = network_out {
        wdp_io::export_network(&outcome.network, path)
            .with_context(|| format!("writing network {}", path.display()))?;
        info!("network written to {}", path.display());
    }
    write_or_print(&outcome.report, out)
}

#[allow(clippy::too_many_arguments)]
fn run_availability(
    graph: &Path,
    source: u64,
    reps: usize,
    seed: u64,
    model: ModelArg,
    failure_rate: f64,
    uniform_p: Option<f64>,
    out: Option<&PathBuf>,
) -> Result<()> {
    let network = load_graph(graph)?;
    let source_idx = network
        .node_index(NodeId::new(source))
        .with_context(|| format!("source node {source} not in graph"))?;
    let check_nodes: Vec<_> = network
        .demand_nodes()
        .into_iter()
        .filter(|&n| n != source_idx)
        .collect();
    if check_nodes.is_empty() {
        bail!("network has no demand nodes to check");
    }

    let report = match uniform_p {
        Some(p) => availability::evaluate_uniform(&network, source_idx, &check_nodes, p, reps, seed)?,
        None => {
            let config = AvailabilityConfig {
                repetitions: reps,
                seed,
                model: model.into(),
                failure_rate,
            };
            // Without probe results every pipe is its own isolation segment.
            availability::evaluate(&network, source_idx, &check_nodes, &config, None)?
        }
    };

    println!(
        "network availability {:.4} over {} repetitions (worst node {:.4})",
        report.network_availability, report.repetitions, report.node_worst_availability,
    );
    write_or_print(&report, out)
}

fn run_graph_command(command: GraphCommands) -> Result<()> {
    match command {
        GraphCommands::Stats { graph } => {
            let network = load_graph(&graph)?;
            let stats = graph_utils::graph_stats(&network)?;
            println!("{}", network.stats());
            println!(
                "components: {}, degree min/avg/max: {}/{:.2}/{}, density: {:.5}",
                stats.connected_components,
                stats.min_degree,
                stats.avg_degree,
                stats.max_degree,
                stats.density,
            );
            Ok(())
        }
        GraphCommands::Export { graph, format, out } => {
            let network = load_graph(&graph)?;
            let rendered = graph_utils::export_graph(&network, &format)?;
            match out {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("writing export {}", path.display()))?,
                None => println!("{rendered}"),
            }
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber")?;
    configure_threads(&cli.threads);

    match cli.command {
        Commands::Plan {
            graph,
            budget,
            source,
            resilience,
            hydraulic_check,
            augment_budget,
            reps,
            seed,
            availability_model,
            failure_rate,
            out,
            network_out,
        } => run_plan(
            &graph,
            budget,
            source,
            resilience,
            hydraulic_check,
            augment_budget,
            reps,
            seed,
            availability_model,
            failure_rate,
            out.as_ref(),
            network_out.as_ref(),
        ),
        Commands::Availability {
            graph,
            source,
            reps,
            seed,
            availability_model,
            failure_rate,
            uniform_p,
            out,
        } => run_availability(
            &graph,
            source,
            reps,
            seed,
            availability_model,
            failure_rate,
            uniform_p,
            out.as_ref(),
        ),
        Commands::Graph { command } => run_graph_command(command),
        Commands::Completions { shell, out } => {
            let mut command = Cli::command();
            match out {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    generate(shell, &mut command, "wdp", &mut file);
                }
                None => {
                    let mut stdout = io::stdout();
                    generate(shell, &mut command, "wdp", &mut stdout);
                    stdout.flush()?;
                }
            }
            Ok(())
        }
    }
}
