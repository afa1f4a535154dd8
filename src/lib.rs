// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod model;
pub mod rules;
pub mod stages;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::{LoggingEventSink, ParallelExecutionManager, RunOptions};
use crate::exec::DockerCliRuntime;
use crate::stages::RunStagePlanner;
use crate::types::CleanupOption;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - dependency graph for the requested task
/// - the execution manager and the docker-backed runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let graph = DependencyGraph::for_task(&cfg, &args.task)?;
    let options = run_options(&args);

    if args.dry_run {
        print_dry_run(&cfg, &graph, &options);
        return Ok(0);
    }

    let runtime = Arc::new(DockerCliRuntime::new(cfg.project_name.clone()));
    let manager = ParallelExecutionManager::for_task(
        graph,
        &cfg.project_name,
        runtime,
        Arc::new(LoggingEventSink),
        &options,
    );

    // Ctrl-C → interrupt, which fails the run stage and starts cleanup.
    {
        let interrupt = manager.interrupt_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            interrupt.interrupt().await;
        });
    }

    info!(task = %args.task, "running task");
    let outcome = manager.run().await?;

    for event in outcome.events.iter().filter(|e| e.is_failure()) {
        eprintln!("{event}");
    }

    if let Some(instructions) = &outcome.manual_cleanup {
        eprintln!();
        eprintln!("{}", instructions.reason);
        eprintln!();
        for command in &instructions.commands {
            eprintln!("  {command}");
        }
    }

    Ok(outcome.exit_code)
}

/// Translate CLI flags into [`RunOptions`].
pub fn run_options(args: &CliArgs) -> RunOptions {
    let mut options = RunOptions::default();

    if let Some(n) = args.max_parallelism {
        options.max_parallelism = n.max(1);
    }
    if args.no_cleanup_after_failure {
        options.behaviour_after_failure = CleanupOption::DontCleanup;
    }
    if args.no_cleanup_after_success {
        options.behaviour_after_success = CleanupOption::DontCleanup;
    }

    options
}

/// Print the container graph and the planned run-stage rules.
fn print_dry_run(cfg: &ConfigFile, graph: &DependencyGraph, options: &RunOptions) {
    println!("taskyard dry-run");
    println!("  project = {}", cfg.project_name);
    println!("  task = {}", graph.task_name());
    println!("  task container = {}", graph.task_container_name());
    println!("  max_parallelism = {}", options.max_parallelism);
    println!();

    println!("containers ({}), in startup order:", graph.len());
    for name in graph.startup_order() {
        let Some(node) = graph.node_for(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      image: {}", node.container().image_source);
        if !node.depends_on_containers().is_empty() {
            println!("      depends on: {:?}", node.depends_on_containers());
        }
        if let Some(command) = &node.config().command {
            println!("      command: {command}");
        }
        if !node.container().setup_commands.is_empty() {
            println!("      setup commands: {:?}", node.container().setup_commands);
        }
    }
    println!();

    let stage = RunStagePlanner::new(options.runtime_type, cfg.project_name.clone())
        .create_stage(graph);
    println!("run stage rules ({}):", stage.remaining_rules().len());
    for rule in stage.remaining_rules() {
        println!("  - {rule}");
    }

    debug!("dry-run complete (no execution)");
}
