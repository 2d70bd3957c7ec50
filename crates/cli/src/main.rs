//! `nodeflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `plan` — validate a node manifest and print its execution plan.
//! - `demo` — run the built-in order-processing pipeline.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{Engine, EngineConfig, NodeConfig, NodeDefinition, NodeSpec, RunResult, TracingLogger};
use nodes::order::{
    CompleteOrder, CreateShippingLabel, ProcessPayment, ReserveInventory, ValidateOrder,
    COMPLETE_ORDER, CREATE_SHIPPING_LABEL, PROCESS_PAYMENT, RESERVE_INVENTORY, VALIDATE_ORDER,
};

#[derive(Parser)]
#[command(
    name = "nodeflow",
    about = "In-process dependency-ordered node execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a JSON array of node specs and print the batched plan.
    Plan {
        /// Path to the manifest file.
        path: std::path::PathBuf,
    },
    /// Run the order-processing demo pipeline.
    Demo {
        #[arg(long, default_value = "ORD_001")]
        order_id: String,
        /// Make the payment provider decline the charge.
        #[arg(long)]
        decline_payment: bool,
        /// Maximum nodes of one batch running at once.
        #[arg(long, env = "NODEFLOW_MAX_CONCURRENCY")]
        max_concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Plan { path } => plan(&path),
        Command::Demo {
            order_id,
            decline_payment,
            max_concurrency,
        } => demo(order_id, decline_payment, max_concurrency).await,
    }
}

fn plan(path: &std::path::Path) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let specs: Vec<NodeSpec> = serde_json::from_str(&content).context("invalid manifest JSON")?;

    match engine::build_plan(&specs) {
        Ok(plan) => {
            println!("Execution order: {:?}", plan.order);
            for (i, batch) in plan.batches.iter().enumerate() {
                println!("  batch {i}: {batch:?}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Invalid node graph: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn demo(
    order_id: String,
    decline_payment: bool,
    max_concurrency: Option<usize>,
) -> anyhow::Result<ExitCode> {
    let payment = ProcessPayment {
        decline: decline_payment,
    };

    let mut engine = Engine::with_logger(Arc::new(TracingLogger))
        .with_config(EngineConfig { max_concurrency });
    engine
        .add_node(NodeDefinition::from_node(VALIDATE_ORDER, ValidateOrder))?
        .add_node(
            NodeDefinition::from_node(PROCESS_PAYMENT, payment)
                .depends_on([VALIDATE_ORDER])
                .with_config(
                    NodeConfig::default()
                        .with_timeout(Duration::from_secs(5))
                        .with_retries(2, Duration::from_millis(100)),
                ),
        )?
        .add_node(
            NodeDefinition::from_node(RESERVE_INVENTORY, ReserveInventory)
                .depends_on([VALIDATE_ORDER]),
        )?
        .add_node(
            NodeDefinition::from_node(CREATE_SHIPPING_LABEL, CreateShippingLabel)
                .depends_on([PROCESS_PAYMENT, RESERVE_INVENTORY]),
        )?
        .add_node(
            NodeDefinition::from_node(COMPLETE_ORDER, CompleteOrder)
                .depends_on([CREATE_SHIPPING_LABEL]),
        )?;

    info!(order_id = %order_id, "processing order");
    let initial = json!({
        "orderId": order_id,
        "inventoryReserved": false,
        "orderStatus": "pending",
    });
    let result = engine.execute(&initial).await;

    println!("{}", serde_json::to_string_pretty(&report(&result))?);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(result: &RunResult) -> serde_json::Value {
    json!({
        "success": result.success,
        "error": result.error.as_ref().map(ToString::to_string),
        "context": result.context,
        "metrics": result.metrics,
    })
}
