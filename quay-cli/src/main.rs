mod config;
mod display;
mod state;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;

use quay_aws::StackProvider;
use quay_aws::schemas;
use quay_core::declaration::Declaration;
use quay_core::differ::create_plan;
use quay_core::interpreter::{Interpreter, order_states};
use quay_core::resource::ResourceId;
use quay_state::{LockInfo, StateBackend, create_backend};

use crate::config::QuayConfig;
use crate::state::{RecordContext, StateCheckpoint};

#[derive(Parser)]
#[command(name = "quay")]
#[command(about = "Deploy a containerized web app to AWS Fargate", long_about = None)]
struct Cli {
    /// Path to the stack configuration
    #[arg(short, long, global = true, default_value = "quay.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and the declared stack
    Validate,
    /// Show the resources in apply order with their dependencies
    Graph {
        /// Show teardown order instead
        #[arg(long)]
        destroy: bool,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Check recorded resources against the provider first
        #[arg(long)]
        refresh: bool,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,

        /// Check recorded resources against the provider first
        #[arg(long)]
        refresh: bool,
    },
    /// Destroy every recorded resource
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print the outputs recorded by the last apply
    Output,
    /// Remove a stale state lock
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let path = cli.config.as_path();

    let result = match cli.command {
        Commands::Validate => run_validate(path),
        Commands::Graph { destroy } => run_graph(path, destroy),
        Commands::Plan { refresh } => run_plan(path, refresh).await,
        Commands::Apply {
            auto_approve,
            refresh,
        } => run_apply(path, auto_approve, refresh).await,
        Commands::Destroy { auto_approve } => run_destroy(path, auto_approve).await,
        Commands::Output => run_output(path).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(path, &lock_id).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "quay", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_validate(path: &Path) -> Result<()> {
    let config = QuayConfig::load(path)?;

    println!("{}", "Validating...".cyan());

    let declaration = config.declare()?;
    let resources = declaration.sorted_resources()?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );

    for resource in &resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

fn run_graph(path: &Path, destroy: bool) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let declaration = config.declare()?;
    let graph = declaration.validate_graph()?;

    let order = if destroy {
        graph.destroy_order()?
    } else {
        graph.topological_order()?
    };

    display::print_graph(&declaration, &graph, &order, destroy);
    Ok(())
}

async fn open_backend(config: &QuayConfig) -> Result<Box<dyn StateBackend>> {
    create_backend(&config.backend, &config.stack.app_name)
        .await
        .context("Failed to open state backend")
}

async fn run_plan(path: &Path, refresh: bool) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let declaration = config.declare()?;
    let backend = open_backend(&config).await?;

    let recorded = state::read_recorded(backend.as_ref()).await?;
    let mut current = recorded.states();
    if refresh {
        let provider = StackProvider::for_region(&config.stack.region).await;
        current = state::refresh(&provider, current).await?;
    }

    let desired = declaration.sorted_resources()?;
    let plan = create_plan(&desired, &current, &schemas::all_schemas());
    display::print_plan(&plan);
    Ok(())
}

/// Release `lock`, reporting `result` first when both fail
async fn release(backend: &dyn StateBackend, lock: &LockInfo, result: Result<()>) -> Result<()> {
    match backend.release_lock(lock).await {
        Ok(()) => result,
        Err(e) if result.is_err() => {
            log::warn!("Failed to release lock {}: {}", lock.id, e);
            result
        }
        Err(e) => Err(e).context(format!("Failed to release lock {}", lock.id)),
    }
}

/// Ask for an explicit "yes"
fn confirm(question: &str) -> Result<bool> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to confirm.".yellow());
    print!("\n  Enter a value: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_apply(path: &Path, auto_approve: bool, refresh: bool) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let declaration = config.declare()?;
    let backend = open_backend(&config).await?;
    backend.init().await?;

    let lock = backend.acquire_lock("apply").await?;
    log::debug!("acquired lock {}", lock.id);

    let provider = StackProvider::for_region(&config.stack.region).await;
    let result = apply_locked(&declaration, backend.as_ref(), provider, auto_approve, refresh).await;
    release(backend.as_ref(), &lock, result).await
}

async fn apply_locked(
    declaration: &Declaration,
    backend: &dyn StateBackend,
    provider: StackProvider,
    auto_approve: bool,
    refresh: bool,
) -> Result<()> {
    let recorded = state::read_recorded(backend).await?;
    let mut current = recorded.states();
    if refresh {
        current = state::refresh(&provider, current).await?;
    }

    let desired = declaration.sorted_resources()?;
    let plan = create_plan(&desired, &current, &schemas::all_schemas());

    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        display::print_outputs(&recorded.outputs);
        return Ok(());
    }

    display::print_plan(&plan);
    println!();

    if !auto_approve && !confirm("Do you want to perform these actions?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let context = RecordContext::new(declaration, |t| provider.provider_name(t));
    let checkpoint = StateCheckpoint::new(backend, recorded, context);
    let result = Interpreter::new(provider)
        .apply_with_checkpoint(&plan, &current, &checkpoint)
        .await;

    display::print_apply_result(&plan, &result);

    let order: Vec<ResourceId> = desired.iter().map(|r| r.id.clone()).collect();
    let states = order_states(result.states.clone(), &order);
    let outputs = state::resolve_outputs(declaration, &states);
    let saved = checkpoint.finish(&states, outputs).await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Apply complete! {} changes applied.",
                result.success_count
            )
            .green()
            .bold()
        );
        display::print_outputs(&saved.outputs);
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Apply failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            )
            .red()
            .bold()
        );
        match result.outcomes.iter().find_map(|o| o.as_ref().err()) {
            Some(e) => bail!("{}", e),
            None => bail!("Apply failed"),
        }
    }
}

async fn run_destroy(path: &Path, auto_approve: bool) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let backend = open_backend(&config).await?;

    let lock = backend.acquire_lock("destroy").await?;
    let provider = StackProvider::for_region(&config.stack.region).await;
    let result = destroy_locked(backend.as_ref(), provider, auto_approve).await;
    release(backend.as_ref(), &lock, result).await
}

async fn destroy_locked(
    backend: &dyn StateBackend,
    provider: StackProvider,
    auto_approve: bool,
) -> Result<()> {
    let recorded = state::read_recorded(backend).await?;
    let current = recorded.states();

    // Nothing declared: every recorded resource is deleted, newest first
    let plan = create_plan(&[], &current, &schemas::all_schemas());
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.effects().len().to_string().red()
    );
    println!();

    if !auto_approve
        && !confirm("Do you really want to destroy all resources? This action cannot be undone.")?
    {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let checkpoint = StateCheckpoint::new(backend, recorded, RecordContext::default());
    let result = Interpreter::new(provider)
        .apply_with_checkpoint(&plan, &current, &checkpoint)
        .await;

    display::print_apply_result(&plan, &result);
    checkpoint
        .finish(&result.states, Default::default())
        .await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            )
            .red()
            .bold()
        );
        match result.outcomes.iter().find_map(|o| o.as_ref().err()) {
            Some(e) => bail!("{}", e),
            None => bail!("Destroy failed"),
        }
    }
}

async fn run_output(path: &Path) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let backend = open_backend(&config).await?;
    let recorded = state::read_recorded(backend.as_ref()).await?;

    if recorded.outputs.is_empty() {
        println!("{}", "No outputs recorded. Run `quay apply` first.".yellow());
        return Ok(());
    }
    display::print_outputs(&recorded.outputs);
    Ok(())
}

async fn run_force_unlock(path: &Path, lock_id: &str) -> Result<()> {
    let config = QuayConfig::load(path)?;
    let backend = open_backend(&config).await?;
    backend.force_unlock(lock_id).await?;
    println!("{}", format!("Lock {} released.", lock_id).green());
    Ok(())
}
