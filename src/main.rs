//! Runs every login suite under a directory, once per configured viewport.

use anyhow::Context;
use clap::Parser;
use flow_runner::{Config, Params, Runner};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "login-e2e")]
#[command(about = "Run the admin panel login suites")]
#[command(version)]
struct Cli {
    /// Directory of suite files (*.yaml directly inside it)
    #[arg(default_value = "suites")]
    dir: PathBuf,

    /// Only run suites whose file name or title contains this
    #[arg(short, long)]
    filter: Option<String>,

    /// Run in headless mode (overrides suites)
    #[arg(long)]
    headless: bool,

    /// Set a parameter for every suite (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

/// One finished run.
struct Outcome {
    label: String,
    success: bool,
    error: Option<String>,
    duration_ms: u64,
}

/// `*.yaml` files directly inside `dir`, sorted by name.
fn suite_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_selected(path: &Path, filter: Option<&str>) -> bool {
    let file = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    filter.map_or(true, |f| file.contains(f))
}

fn selected(path: &Path, config: &Config, filter: Option<&str>) -> bool {
    file_selected(path, filter) || filter.is_some_and(|f| config.name.contains(f))
}

/// A browser that fails to shut down does not override the run's outcome.
fn keep_run_result<T, E: std::fmt::Display>(
    label: &str,
    run: Result<T, E>,
    closed: Result<(), E>,
) -> Result<T, E> {
    if let Err(e) = closed {
        warn!("Failed to close browser for {}: {}", label, e);
    }
    run
}

async fn run_suite(config: &Config, base: &Path) -> anyhow::Result<Vec<Outcome>> {
    let mut outcomes = Vec::new();
    for run in config.expand_viewports() {
        let label = format!("{} @ {}", run.name, run.browser.effective_viewport());
        info!("Running {}", label);

        let mut runner = Runner::new(&run.browser)
            .await
            .with_context(|| format!("launching browser for {}", label))?;
        let result = runner.run_with_base_path(&run, base).await;
        let closed = runner.close().await;
        let result = keep_run_result(&label, result, closed)?;

        if result.success {
            println!("✓ {} ({}ms)", label, result.duration_ms);
        } else {
            println!("✗ {} ({}ms)", label, result.duration_ms);
            if let Some(ref error) = result.error {
                println!("    {}", error);
            }
            if let Some(ref path) = result.screenshot {
                println!("    screenshot: {}", path.display());
            }
        }
        outcomes.push(Outcome {
            label,
            success: result.success,
            error: result.error,
            duration_ms: result.duration_ms,
        });
    }
    Ok(outcomes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let params = Params::from_args(&cli.params)?;

    let mut suites = Vec::new();
    for path in suite_files(&cli.dir)? {
        let mut config = match Config::load_with_params(&path, &params) {
            Ok(config) => config,
            // e.g. a missing password for a suite the filter excludes anyway
            Err(e) if !file_selected(&path, cli.filter.as_deref()) => {
                debug!("skipping {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("loading {}", path.display()));
            }
        };
        if !selected(&path, &config, cli.filter.as_deref()) {
            continue;
        }
        if cli.headless {
            config.browser.headless = true;
        }
        suites.push(config);
    }
    if suites.is_empty() {
        anyhow::bail!("no suites selected in {}", cli.dir.display());
    }

    let mut outcomes = Vec::new();
    for config in &suites {
        outcomes.extend(run_suite(config, &cli.dir).await?);
    }

    let failed: Vec<&Outcome> = outcomes.iter().filter(|o| !o.success).collect();
    let total_ms: u64 = outcomes.iter().map(|o| o.duration_ms).sum();
    println!();
    println!(
        "{} passed, {} failed ({} runs, {}ms)",
        outcomes.len() - failed.len(),
        failed.len(),
        outcomes.len(),
        total_ms
    );
    for outcome in &failed {
        println!(
            "  ✗ {}: {}",
            outcome.label,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
