//! `skillforge` — thin CLI over the library: turn a HAR capture into an
//! `ApiData` + `CorrelationGraph` pair on disk, then replay or probe
//! against the live network. The pipeline itself takes no filesystem
//! or CLI dependency; everything here exists only to give it somewhere
//! durable to read and write.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use skillforge::chain::plan_chain_for_target;
use skillforge::clock::SystemClock;
use skillforge::config::{self, GlobalConfig};
use skillforge::correlation::CorrelationGraph;
use skillforge::executor::{execute_chain_for_target, ReqwestTransport};
use skillforge::har::wire::Har;
use skillforge::har::ApiData;
use skillforge::pipeline::build_api_data_and_graph_from_text;
use skillforge::prober::{execute_probes, generate_probes};
use skillforge::session::{har_entries_to_captured_exchanges, CapturedExchange, MaterializeOptions};

#[derive(Parser)]
#[command(name = "skillforge", version, about = "Turns captured HTTP traffic into replayable API skills")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a HAR file into `ApiData` + `CorrelationGraph`, written under `~/.skillforge/services/<service>/`.
    Analyze {
        /// Path to the captured .har file.
        har_path: PathBuf,
        /// URL that seeded the capture, used to pick the primary domain.
        #[arg(long)]
        seed_url: Option<String>,
        /// Override the inferred service name used for the output directory.
        #[arg(long)]
        service: Option<String>,
    },
    /// Replay the prerequisite chain for one endpoint index against the live network.
    Replay {
        /// Service name as written by `analyze`.
        service: String,
        /// Path to the original .har file (re-materialized into exchanges for replay).
        har_path: PathBuf,
        /// Index of the target request within the HAR's entry list.
        target_index: usize,
    },
    /// Show the prerequisite chain for a target index without executing it.
    Plan {
        service: String,
        target_index: usize,
    },
    /// Generate and execute speculative probes against a service's known endpoints.
    Probe {
        service: String,
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

fn load_har(path: &PathBuf) -> Har {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("failed to parse HAR {}: {e}", path.display()))
}

fn load_api_data(service: &str) -> ApiData {
    let path = config::api_data_path(service);
    let text = fs::read_to_string(&path).unwrap_or_else(|e| panic!("no analyzed data for {service} ({}): {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("corrupt api_data.json for {service}: {e}"))
}

fn load_graph(service: &str) -> CorrelationGraph {
    let path = config::correlation_graph_path(service);
    let text = fs::read_to_string(&path).unwrap_or_else(|e| panic!("no analyzed data for {service} ({}): {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("corrupt correlation_graph.json for {service}: {e}"))
}

fn materialize(har: &Har) -> Vec<CapturedExchange> {
    har_entries_to_captured_exchanges(&har.log.entries, MaterializeOptions::default())
}

async fn run_analyze(har_path: PathBuf, seed_url: Option<String>, service_override: Option<String>) {
    let text = fs::read_to_string(&har_path).unwrap_or_else(|e| panic!("failed to read {}: {e}", har_path.display()));
    let clock = SystemClock;
    let (mut api_data, graph) = build_api_data_and_graph_from_text(&text, seed_url.as_deref(), &clock);
    if let Some(service) = service_override {
        api_data.service = service;
    }

    config::ensure_service_dirs(&api_data.service);
    let api_data_json = serde_json::to_string_pretty(&api_data).expect("ApiData is always serializable");
    fs::write(config::api_data_path(&api_data.service), api_data_json).expect("failed to write api_data.json");
    let graph_json = serde_json::to_string_pretty(&graph).expect("CorrelationGraph is always serializable");
    fs::write(config::correlation_graph_path(&api_data.service), graph_json).expect("failed to write correlation_graph.json");

    tracing::info!(service = %api_data.service, endpoints = api_data.endpoints.len(), links = graph.links.len(), "analyzed HAR capture");
    println!("Analyzed {} into {}", har_path.display(), config::service_dir(&api_data.service).display());
    println!("  endpoints: {}", api_data.endpoints.len());
    println!("  correlation links: {}", graph.links.len());
}

async fn run_replay(service: String, har_path: PathBuf, target_index: usize) {
    let har = load_har(&har_path);
    let exchanges = materialize(&har);
    let graph = load_graph(&service);
    let config = config::read_config();

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.replay_timeout_secs))
        .build()
        .expect("reqwest client builds with a sane timeout");
    let transport = ReqwestTransport::with_client(client);

    let result = execute_chain_for_target(&exchanges, &graph, target_index, &transport, None, None, None)
        .await
        .unwrap_or_else(|e| panic!("replay failed for {service}#{target_index}: {e}"));
    tracing::info!(service = %service, target = target_index, chain = ?result.chain, "replayed chain");
    println!("Chain: {:?}", result.chain);
    for step in &result.per_step {
        println!("  step {} -> status {} ({})", step.step_index, step.status, if step.ok { "ok" } else { "failed" });
    }
    match result.final_result {
        Some(final_result) => println!("Final status: {}", final_result.status),
        None => println!("Final step did not produce a result."),
    }
}

fn run_plan(service: String, target_index: usize) {
    let graph = load_graph(&service);
    let chain = plan_chain_for_target(&graph, target_index).unwrap_or_else(|e| panic!("cannot plan {service}#{target_index}: {e}"));
    println!("Prerequisite chain for {service}#{target_index}: {chain:?}");
}

async fn run_probe(service: String, concurrency: Option<usize>) {
    let api_data = load_api_data(&service);
    let probes = generate_probes(&api_data);
    println!("Generated {} probes for {service}", probes.len());

    let config = config::read_config();
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.probe_timeout_secs))
        .build()
        .expect("reqwest client builds with a sane timeout");
    let transport: Arc<dyn skillforge::executor::Transport> = Arc::new(ReqwestTransport::with_client(client));

    let results = execute_probes(probes, transport, concurrency).await;
    let discovered: Vec<_> = results.iter().filter(|r| r.discovered).collect();
    tracing::info!(service = %service, probed = results.len(), discovered = discovered.len(), "probe run complete");
    for result in &discovered {
        println!("  discovered: {} {} ({:?}, status {})", result.probe.method, result.probe.url, result.probe.category, result.status);
    }
    println!("{} of {} probes discovered a new endpoint", discovered.len(), results.len());
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("skillforge=info")),
        )
        .init();

    config::ensure_dirs();
    let _: GlobalConfig = config::read_config();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { har_path, seed_url, service } => run_analyze(har_path, seed_url, service).await,
        Command::Replay { service, har_path, target_index } => run_replay(service, har_path, target_index).await,
        Command::Plan { service, target_index } => run_plan(service, target_index),
        Command::Probe { service, concurrency } => run_probe(service, concurrency).await,
    }
}
