use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;

use bn128_packager::config::loader::render_config;
use bn128_packager::config::{resolve_config, ConfigOverrides};
use bn128_packager::{LogCollector, Orchestrator, PipelineConfig};

/// Build, test and install libbn128.so
#[derive(Parser, Debug)]
#[command(name = "bn128-packager", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline: prepare output, fetch, clean, test, build, relocate
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Do not echo step output to the terminal (still written to the log)
        #[arg(short, long)]
        quiet: bool,

        /// Include debug records in the log
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the actions a run would perform without executing them
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the resolved configuration as TOML
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Configuration file (defaults to ./bn128-packager.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory the toolchain runs in and the artifact is built in
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Resource root the artifact is installed under
    #[arg(long, value_name = "DIR")]
    output_base: Option<PathBuf>,

    /// Where run logs and reports are written
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<PipelineConfig> {
        let overrides = ConfigOverrides {
            working_dir: self.working_dir.clone(),
            output_base: self.output_base.clone(),
            log_dir: self.log_dir.clone(),
        };
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let (config, source) = resolve_config(self.config.as_deref(), &cwd, &overrides)
            .context("Failed to load configuration")?;
        match source {
            Some(path) => log::debug!("Configuration loaded from {}", path.display()),
            None => log::debug!("Using built-in configuration"),
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run {
            config,
            quiet,
            verbose,
        } => run_pipeline(config.load()?, quiet, verbose).await,
        Commands::Plan { config } => {
            let (_cancel_tx, cancel_rx) = watch::channel(false);
            let orchestrator = Orchestrator::new(config.load()?, cancel_rx, None);
            for (i, action) in orchestrator.plan().iter().enumerate() {
                println!("{}. {}", i + 1, action);
            }
            Ok(0)
        }
        Commands::ShowConfig { config } => {
            print!("{}", render_config(&config.load()?)?);
            Ok(0)
        }
    }
}

async fn run_pipeline(config: PipelineConfig, quiet: bool, verbose: bool) -> anyhow::Result<i32> {
    let log_dir = config.log_dir();
    let collector = Arc::new(
        LogCollector::new(log_dir.clone(), !quiet)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?,
    );

    let max_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = log::set_boxed_logger(Box::new((*collector).clone()))
        .map(|()| log::set_max_level(max_level))
    {
        eprintln!("warning: failed to install logger: {}", e);
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping the current step");
            let _ = cancel_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(config, cancel_rx, Some(collector.clone()));
    let code = match orchestrator.run().await {
        Ok(report) => {
            if let Some(ref artifact) = report.artifact_path {
                log::info!(
                    "Pipeline completed: {} ({} ms)",
                    artifact.display(),
                    report.total_duration_ms()
                );
            }
            0
        }
        Err(e) => {
            log::error!("{}", e);
            if quiet {
                eprintln!("error: {}", e.user_message());
            }
            e.exit_code()
        }
    };

    if let Err(e) = collector.wait_for_empty().await {
        eprintln!("warning: failed to flush logs: {}", e);
    }
    if let Some(path) = collector.session_log_path() {
        if quiet && code != 0 {
            eprintln!("see {}", path.display());
        }
    }

    Ok(code)
}
