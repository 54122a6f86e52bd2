//! kvsim CLI: replay tokenized workloads through the prefix-aware router.

use clap::{Parser, Subcommand};
use kvsim_core::config::RouterConfig;
use kvsim_core::metrics;
use kvsim_core::workload::{self, SyntheticWorkload, TokenizedRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kvsim",
    about = "Simulate prefix-aware KV-cache routing across LLM workers",
    version
)]
struct Cli {
    /// Default log filter when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

/// Synthetic workload knobs shared by several subcommands.
#[derive(clap::Args, Debug, Clone)]
struct SyntheticArgs {
    /// Number of requests to generate.
    #[arg(long, default_value = "1000")]
    requests: usize,
    /// Number of distinct shared system prompts.
    #[arg(long, default_value = "8")]
    prefixes: usize,
    /// Tokens per shared system prompt.
    #[arg(long, default_value = "512")]
    prefix_tokens: usize,
    /// Shortest per-request suffix, in tokens.
    #[arg(long, default_value = "32")]
    suffix_min: usize,
    /// Longest per-request suffix, in tokens.
    #[arg(long, default_value = "256")]
    suffix_max: usize,
    /// Vocabulary size for random token ids.
    #[arg(long, default_value = "32000")]
    vocab: u32,
    /// Random seed.
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl From<SyntheticArgs> for SyntheticWorkload {
    fn from(a: SyntheticArgs) -> Self {
        SyntheticWorkload {
            num_requests: a.requests,
            num_prefixes: a.prefixes,
            prefix_tokens: a.prefix_tokens,
            suffix_tokens_min: a.suffix_min,
            suffix_tokens_max: a.suffix_max,
            vocab_size: a.vocab,
            seed: a.seed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a workload through the router and print cache metrics.
    Run {
        /// Path to TOML configuration file (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSONL workload file; a synthetic workload is generated when omitted.
        #[arg(short, long)]
        workload: Option<PathBuf>,
        #[command(flatten)]
        synthetic: SyntheticArgs,
        /// Routing threads.
        #[arg(short, long, default_value = "1")]
        threads: usize,
        /// Outstanding requests per thread before the oldest completes.
        #[arg(long, default_value = "8")]
        in_flight: usize,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a synthetic shared-prefix workload.
    GenWorkload {
        #[command(flatten)]
        synthetic: SyntheticArgs,
        /// Output file path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replay the same workload across several kv_overlap_weight values.
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        workload: Option<PathBuf>,
        #[command(flatten)]
        synthetic: SyntheticArgs,
        /// Comma-separated list of overlap weights.
        #[arg(long, value_delimiter = ',', default_value = "0,0.5,1,2")]
        weights: Vec<f64>,
        #[arg(short, long, default_value = "1")]
        threads: usize,
        #[arg(long, default_value = "8")]
        in_flight: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available load models.
    ListLoadModels,
}

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            workload: workload_path,
            synthetic,
            threads,
            in_flight,
            output,
        } => {
            let config = load_config(config.as_deref());
            let requests = load_requests(workload_path.as_deref(), synthetic);
            info!(requests = requests.len(), threads, "replaying workload");

            let report = kvsim_core::run_workload(config, &requests, threads, in_flight)
                .unwrap_or_else(|e| fail("Error building router", e));
            println!("{}", metrics::format_table("kvsim", &report.metrics));
            println!(
                "  Routed {} requests ({} rejected) in {:.1}ms, {:.0} routes/s",
                report.requests_routed,
                report.requests_rejected,
                report.wall_time_ms,
                report.routes_per_sec
            );

            if let Some(path) = output {
                write_json(&path, &report);
            }
        }
        Commands::GenWorkload { synthetic, output } => {
            let requests = SyntheticWorkload::from(synthetic).generate();
            workload::write_workload(&requests, &output)
                .unwrap_or_else(|e| fail("Error writing workload", e));
            println!(
                "Generated {} requests to {}",
                requests.len(),
                output.display()
            );
        }
        Commands::Sweep {
            config,
            workload: workload_path,
            synthetic,
            weights,
            threads,
            in_flight,
            output,
        } => {
            let config = load_config(config.as_deref());
            let requests = load_requests(workload_path.as_deref(), synthetic);

            let results = kvsim_core::sweep_overlap_weight(
                &config,
                &requests,
                &weights,
                threads,
                in_flight,
            )
            .unwrap_or_else(|e| fail("Error building router", e));

            println!("\n{:=<70}", "  Overlap weight sweep  ");
            println!(
                "  {:>8}  {:>9}  {:>12}  {:>12}  {:>8}",
                "weight", "hit rate", "avg TTFT", "P99 TTFT", "speedup"
            );
            for (weight, report) in &results {
                let speedup = &report.metrics.speedup_stats;
                println!(
                    "  {:>8.2}  {:>8.1}%  {:>10.1}ms  {:>10.1}ms  {:>7.2}x",
                    weight,
                    report.metrics.cache_performance.cache_hit_rate * 100.0,
                    speedup.avg_actual_ttft_ms,
                    speedup.actual_ttft.p99,
                    speedup.avg_speedup_ratio
                );
            }
            println!("{:=<70}", "");

            if let Some(path) = output {
                let rows: Vec<SweepRow<'_>> = results
                    .iter()
                    .map(|(kv_overlap_weight, report)| SweepRow {
                        kv_overlap_weight: *kv_overlap_weight,
                        report,
                    })
                    .collect();
                write_json(&path, &rows);
            }
        }
        Commands::ListLoadModels => {
            println!("Available load models:");
            for name in kvsim_algorithms::available_load_models() {
                println!("  - {}", name);
            }
        }
    }
}

#[derive(Serialize)]
struct SweepRow<'a> {
    kv_overlap_weight: f64,
    report: &'a kvsim_core::ReplayReport,
}

fn load_config(path: Option<&Path>) -> RouterConfig {
    match path {
        Some(p) => RouterConfig::from_file(p).unwrap_or_else(|e| fail("Error loading config", e)),
        None => RouterConfig::default(),
    }
}

fn load_requests(path: Option<&Path>, synthetic: SyntheticArgs) -> Vec<TokenizedRequest> {
    match path {
        Some(p) => workload::load_workload(p).unwrap_or_else(|e| fail("Error loading workload", e)),
        None => SyntheticWorkload::from(synthetic).generate(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    let json =
        serde_json::to_string_pretty(value).unwrap_or_else(|e| fail("Error serializing results", e));
    std::fs::write(path, json).unwrap_or_else(|e| fail("Error writing results", e));
    println!("Results written to {}", path.display());
}
