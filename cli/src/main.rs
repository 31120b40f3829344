//! Command-line surface for the RTGS settlement simulator.
//!
//! Thin wrapper over the core crate: loads a JSON configuration, runs the
//! engine, and prints summaries. Schema commands expose the machine-readable
//! cost and policy documentation.

use clap::{Parser, Subcommand, ValueEnum};
use rtgs_simulator_core::costs::schema_docs as cost_schema_docs;
use rtgs_simulator_core::policy::tree::schema_docs as policy_schema_docs;
use rtgs_simulator_core::{Orchestrator, OrchestratorConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rtgs-sim", about = "Intraday RTGS settlement simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulation from a JSON configuration file
    Run {
        /// Path to the configuration file
        #[arg(long)]
        config: PathBuf,

        /// Override the configured RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many ticks (default: the full episode)
        #[arg(long)]
        ticks: Option<usize>,

        /// Print per-tick summaries
        #[arg(long)]
        verbose: bool,
    },

    /// Print the cost model schema
    CostSchema {
        #[arg(long, value_enum, default_value_t = SchemaFormat::Markdown)]
        format: SchemaFormat,
    },

    /// Print the policy DSL schema
    PolicySchema {
        #[arg(long, value_enum, default_value_t = SchemaFormat::Markdown)]
        format: SchemaFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaFormat {
    Markdown,
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Run {
            config,
            seed,
            ticks,
            verbose,
        } => {
            let raw = std::fs::read_to_string(&config)
                .map_err(|e| format!("cannot read {}: {}", config.display(), e))?;
            let mut parsed: OrchestratorConfig =
                serde_json::from_str(&raw).map_err(|e| format!("invalid config: {}", e))?;
            if let Some(seed) = seed {
                parsed.rng_seed = seed;
            }

            let mut engine = Orchestrator::new(parsed).map_err(|e| e.to_string())?;
            let limit = ticks.unwrap_or(engine.episode_end_tick());

            while !engine.is_complete() && engine.current_tick() < limit {
                let result = engine.tick().map_err(|e| e.to_string())?;
                if verbose {
                    println!(
                        "tick {:>5}  arrivals {:>3}  settled {:>3} ({} cents)  lsm {}/{}  q2 {}",
                        result.tick,
                        result.arrivals,
                        result.rtgs_settled,
                        result.rtgs_settled_value,
                        result.lsm_bilateral_offsets,
                        result.lsm_cycles_settled,
                        result.queue2_size,
                    );
                }
            }

            let snapshot = engine.snapshot();
            println!("simulation complete at tick {}", snapshot.tick);
            println!("events emitted: {}", engine.event_log().len());
            for (agent_id, balance) in &snapshot.balances {
                let cost = engine
                    .total_costs(agent_id)
                    .map(|c| c.total())
                    .unwrap_or(0);
                println!(
                    "  {:<12} balance {:>14}  total cost {:>10}  queue1 {:>4}",
                    agent_id, balance, cost, snapshot.queue1_sizes[agent_id]
                );
            }
            println!("queue2 residual: {}", snapshot.queue2_size);
            Ok(())
        }

        Command::CostSchema { format } => {
            match format {
                SchemaFormat::Markdown => println!("{}", cost_schema_docs::cost_schema_markdown()),
                SchemaFormat::Json => println!("{}", cost_schema_docs::cost_schema_json()),
            }
            Ok(())
        }

        Command::PolicySchema { format } => {
            match format {
                SchemaFormat::Markdown => {
                    println!("{}", policy_schema_docs::policy_schema_markdown())
                }
                SchemaFormat::Json => println!("{}", policy_schema_docs::policy_schema_json()),
            }
            Ok(())
        }
    }
}
