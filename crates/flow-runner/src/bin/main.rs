use clap::Parser;
use flow_runner::{Config, Params, Runner, Viewport};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "flow-runner")]
#[command(about = "Run one YAML login flow")]
#[command(version)]
struct Cli {
    /// Flow file to run
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Run at a single viewport, e.g. 375x812 (overrides config)
    #[arg(long, value_name = "WxH")]
    viewport: Option<Viewport>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> flow_runner::Result<()> {
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

    // RUST_LOG wins over -v/-q
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
    let mut config = Config::load_with_params(&cli.config, &params)?;

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Target: {}", config.target.url);
        println!("  Actions: {}", config.actions.len());
        if !config.params.is_empty() {
            println!("  Parameters: {}", config.params.len());
            for (name, def) in &config.params {
                let req = if def.required { " (required)" } else { "" };
                let desc = def.description.as_deref().unwrap_or("");
                println!("    - {}{}: {}", name, req, desc);
            }
        }
        let viewports: Vec<String> = config
            .expand_viewports()
            .iter()
            .map(|c| c.browser.effective_viewport().to_string())
            .collect();
        println!("  Viewports: {}", viewports.join(", "));
        if let Some(ref on_failure) = config.on_failure {
            if let Some(ref retry) = on_failure.retry {
                println!("  Retry attempts: {}", retry.attempts);
            }
        }
        return Ok(());
    }

    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(viewport) = cli.viewport {
        config.browser.viewport = Some(viewport);
        config.browser.viewports.clear();
    }

    // Includes resolve relative to the flow file
    let base_path = cli
        .config
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."));

    let mut failed = false;
    for run in config.expand_viewports() {
        let viewport = run.browser.effective_viewport();
        println!("Running: {} @ {}", run.name, viewport);

        let mut runner = Runner::new(&run.browser).await?;
        let result = runner.run_with_base_path(&run, base_path).await?;
        runner.close().await?;

        println!();
        if result.success {
            println!("✓ Success");
        } else {
            failed = true;
            println!("✗ Failed");
            if let Some(ref error) = result.error {
                println!("  Error: {}", error);
            }
            if let Some(ref path) = result.screenshot {
                println!("  Screenshot: {}", path.display());
            }
        }
        println!("  Actions: {}", result.actions_executed);
        println!("  Duration: {}ms", result.duration_ms);
        if result.retries > 0 {
            println!("  Retries: {}", result.retries);
        }
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}
