use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use heml_theme_build::config::{Cli, Config, TaskCommand};
use heml_theme_build::error::BuildError;
use heml_theme_build::pipeline::{Pipeline, Task, COMPILE_USAGE};
use heml_theme_build::styles::SassCommand;
use heml_theme_build::templates::HemlCommand;
use heml_theme_build::watcher::watch;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let config_error = e
                .downcast_ref::<BuildError>()
                .map(BuildError::is_config_error)
                .unwrap_or(false);
            if config_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Nothing is loaded or written for an incomplete compile invocation
    if let TaskCommand::Compile { email: None } = cli.task {
        eprintln!("Parameter --email is missing.\n{COMPILE_USAGE}");
        return Ok(ExitCode::from(2));
    }

    let config = Config::from_cli(&cli).context("Failed to load configuration")?;
    let sass = SassCommand::new(&config.sass_binary);
    let heml = HemlCommand::new(&config.heml_binary);
    let pipeline = Pipeline::new(&config, &sass, &heml);

    if config.verbose {
        eprintln!(
            "Building {} theme(s) from {} with {} worker(s)",
            config.themes.len(),
            config.layout.source.display(),
            config.jobs
        );
    }

    if let Some(task) = cli.task.pipeline_task() {
        return run_task(&pipeline, task);
    }

    match &cli.task {
        TaskCommand::Compile { email } => {
            let target = pipeline.compile_email(email.as_deref())?;
            println!("Compiled {}", target.display());
            Ok(ExitCode::SUCCESS)
        }
        TaskCommand::Watch => run_watch(&pipeline),
        other => Err(anyhow!("{other:?} has no runner")),
    }
}

fn run_task(pipeline: &Pipeline<'_>, task: Task) -> Result<ExitCode> {
    let config = pipeline.config();
    let summary = pipeline
        .run(task)
        .with_context(|| format!("Task '{task}' failed"))?;

    for archive in &summary.archives {
        println!("  {}", archive.display());
    }
    if task == Task::Deploy {
        println!(
            "Deployed {} files to {}",
            summary.deployed_files,
            config.deploy_dir()?.display()
        );
    }
    println!(
        "Finished '{}' ({} stage(s)) in {:.2}s",
        task,
        summary.stages.len(),
        summary.duration.as_secs_f64()
    );
    Ok(ExitCode::SUCCESS)
}

fn run_watch(pipeline: &Pipeline<'_>) -> Result<ExitCode> {
    let config = pipeline.config();
    // Fail before watching if deployment is not configured
    config.deploy_dir()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    watch(&config.layout.source, running.clone(), || {
        pipeline.run(Task::Deploy).map(|_| ())
    })?;

    if running.load(Ordering::SeqCst) {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("\nWatch stopped");
        Ok(ExitCode::from(130))
    }
}
