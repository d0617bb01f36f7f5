/// Keel - managed Kubernetes clusters with hardened node groups
///
/// Declares a managed control plane, a hardened launch template, a managed
/// node group and its role bindings, then realizes them in dependency order.
mod config;
mod declare;
mod driver;
mod error;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::StackConfig;
use crate::declare::types::KubectlLayerLookup;
use crate::declare::{compose, StackDeclaration};
use crate::driver::{HttpProvider, InMemoryProvider, Provider, Realizer};

#[derive(Parser)]
#[command(name = "keel")]
#[command(
    about = "Provision managed Kubernetes clusters with hardened node groups",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "stack.yaml")]
    config: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Use an in-memory provider instead of the gateway
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    Init,

    /// Print the declaration graph without touching the provider
    Plan,

    /// Create or update the cluster and node group
    Apply,

    /// Destroy every declared resource
    Destroy,

    /// Show the live state of every declared resource
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keel={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Init => init_config(&cli).await,
        Commands::Plan => plan_stack(&cli).await,
        Commands::Apply => with_provider(&cli, ProviderCommand::Apply).await,
        Commands::Destroy => with_provider(&cli, ProviderCommand::Destroy).await,
        Commands::Status => with_provider(&cli, ProviderCommand::Status).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration and compose the declaration graph
fn load_stack(cli: &Cli) -> Result<(StackConfig, StackDeclaration)> {
    let config = StackConfig::from_file(&cli.config).context("Failed to load configuration")?;
    let spec = config.stack_spec()?;
    let stack = compose(&spec, &config.provider.catalog(), &KubectlLayerLookup)
        .context("Failed to compose declarations")?;
    Ok((config, stack))
}

/// Commands that talk to a provider
#[derive(Clone, Copy)]
enum ProviderCommand {
    Apply,
    Destroy,
    Status,
}

/// Run a command against the configured provider, or in memory with --dry-run
async fn with_provider(cli: &Cli, command: ProviderCommand) -> Result<()> {
    let (config, stack) = load_stack(cli)?;
    info!("Stack: {} (cluster {})", config.stack_name, stack.cluster.name());

    if cli.dry_run {
        info!("Dry run: using in-memory provider");
        let provider = InMemoryProvider::new(config.provider.region.clone());
        let result = run_command(cli, command, &stack, &provider).await;
        for call in provider.calls().await {
            debug!("  {:?} {} {}", call.op, call.kind, call.name);
        }
        result
    } else {
        let token = config.get_provider_token()?;
        let provider = HttpProvider::new(&config.provider, token)?;
        run_command(cli, command, &stack, &provider).await
    }
}

async fn run_command<P: Provider>(
    cli: &Cli,
    command: ProviderCommand,
    stack: &StackDeclaration,
    provider: &P,
) -> Result<()> {
    match command {
        ProviderCommand::Apply => apply_stack(cli, stack, provider).await,
        ProviderCommand::Destroy => destroy_stack(stack, provider).await,
        ProviderCommand::Status => show_status(stack, provider).await,
    }
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = StackConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the network, cluster and node group sections");
    info!("  2. Set your provider token:");
    info!("     export {}=your-token-here", config::TOKEN_ENV);
    info!("  3. Review the plan, then apply it:");
    info!("     keel plan && keel apply");

    Ok(())
}

/// Print the composed declaration graph
async fn plan_stack(cli: &Cli) -> Result<()> {
    let (_, stack) = load_stack(cli)?;
    let yaml = serde_yaml::to_string(&stack.graph.plan())?;
    println!("{}", yaml);
    info!("{} resources planned", stack.graph.len());
    Ok(())
}

/// Realize the stack and write its outputs
async fn apply_stack<P: Provider>(
    cli: &Cli,
    stack: &StackDeclaration,
    provider: &P,
) -> Result<()> {
    info!("Starting stack realization...");

    let mut realizer = Realizer::new(&stack.graph, provider);
    let report = realizer.apply().await.context("Failed to apply stack")?;

    tokio::fs::create_dir_all(&cli.output)
        .await
        .context("Failed to create output directory")?;
    let outputs_path = cli.output.join("outputs.json");
    tokio::fs::write(&outputs_path, serde_json::to_vec_pretty(&report)?)
        .await
        .context("Failed to write outputs")?;

    info!("✓ Stack applied successfully!");
    info!("");
    for resource in &report.resources {
        info!(
            "  {} {}: {} ({})",
            resource.kind,
            resource.name,
            resource.state,
            resource
                .change
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    let cluster = report.cluster(&stack.cluster)?;
    let launch_template = report.launch_template(&stack.launch_template)?;
    let node_group = report.node_group(stack.identity.node_group())?;
    info!("");
    info!("Cluster {}: {}", cluster.name, cluster.endpoint);
    info!("Cluster role: {}", cluster.role_arn);
    info!(
        "Launch template: {} (version {})",
        launch_template.id, launch_template.latest_version
    );
    info!("Node group {} role: {}", node_group.name, node_group.role_arn);
    for binding in &stack.bindings {
        info!("Bound: {}", binding.name());
    }
    info!("Outputs written to {}", outputs_path.display());

    Ok(())
}

/// Destroy an existing stack
async fn destroy_stack<P: Provider>(stack: &StackDeclaration, provider: &P) -> Result<()> {
    info!("Starting stack destruction...");

    let deleted = driver::destroy(&stack.graph, provider)
        .await
        .context("Failed to destroy stack")?;

    info!("✓ Stack destroyed ({} resources deleted)", deleted.len());
    Ok(())
}

/// Show stack status
async fn show_status<P: Provider>(stack: &StackDeclaration, provider: &P) -> Result<()> {
    let statuses = driver::status(&stack.graph, provider).await?;

    info!("Cluster: {}", stack.cluster.name());
    info!("");
    for status in statuses {
        match status.live {
            Some(live) => {
                let outputs = serde_json::to_string(&live.outputs)?;
                info!("  - {} {}: present {}", status.kind, status.name, outputs);
            }
            None => info!("  - {} {}: absent", status.kind, status.name),
        }
    }

    Ok(())
}
