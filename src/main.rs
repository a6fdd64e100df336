//! codex-sdk - Run and benchmark `codex exec` turns from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codex_sdk::config::{ConfigError, ConfigLoader, SandboxMode, SdkConfig, TurnOptions};
use codex_sdk::display;
use codex_sdk::exec::RunError;
use codex_sdk::input::{Input, UserInput};
use codex_sdk::thread::{Codex, TurnAggregator, TurnBatch};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SandboxArg {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl From<SandboxArg> for SandboxMode {
    fn from(arg: SandboxArg) -> Self {
        match arg {
            SandboxArg::ReadOnly => SandboxMode::ReadOnly,
            SandboxArg::WorkspaceWrite => SandboxMode::WorkspaceWrite,
            SandboxArg::DangerFullAccess => SandboxMode::DangerFullAccess,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "codex-sdk",
    about = "Run and benchmark codex exec turns",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn and stream its events.
    Run {
        /// The prompt to send.
        prompt: String,
        /// Model override.
        #[arg(short, long)]
        model: Option<String>,
        /// Sandbox mode override.
        #[arg(long, value_enum)]
        sandbox: Option<SandboxArg>,
        /// Working directory for the agent.
        #[arg(long)]
        cd: Option<PathBuf>,
        /// Continue an existing thread.
        #[arg(long)]
        resume: Option<String>,
        /// Attach a local image (repeatable).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Skip the git repository check.
        #[arg(long)]
        skip_git_repo_check: bool,
        /// Print raw JSON events instead of formatted output.
        #[arg(long)]
        json: bool,
        /// Do not truncate long output.
        #[arg(long)]
        raw: bool,
    },
    /// Run the same prompt repeatedly with bounded parallelism.
    Bench {
        /// The prompt to send.
        prompt: String,
        /// Number of runs.
        #[arg(short = 'n', long, default_value_t = 5)]
        runs: usize,
        /// Maximum concurrent codex processes.
        #[arg(short = 'j', long, default_value_t = 2)]
        max_parallel: usize,
        /// Model override.
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("All {0} benchmark runs failed")]
    BenchFailed(usize),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<SdkConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling");
            token.cancel();
        }
    });
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
async fn run_turn(
    mut config: SdkConfig,
    prompt: String,
    model: Option<String>,
    sandbox: Option<SandboxArg>,
    cd: Option<PathBuf>,
    resume: Option<String>,
    images: Vec<PathBuf>,
    skip_git_repo_check: bool,
    json: bool,
    raw: bool,
) -> Result<(), CliError> {
    if let Some(model) = model {
        config.thread.model = Some(model);
    }
    if let Some(sandbox) = sandbox {
        config.thread.sandbox_mode = Some(sandbox.into());
    }
    if let Some(cd) = cd {
        config.thread.working_directory = Some(cd);
    }
    config.thread.skip_git_repo_check |= skip_git_repo_check;

    let codex = Codex::new(&config.codex);
    let mut thread = match resume {
        Some(id) => codex.resume_thread(id, config.thread),
        None => codex.start_thread(config.thread),
    };

    let input = if images.is_empty() {
        Input::Text(prompt)
    } else {
        let mut items = vec![UserInput::Text { text: prompt }];
        items.extend(images.into_iter().map(|path| UserInput::LocalImage { path }));
        Input::Items(items)
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut turn = thread
        .run_streamed(input, TurnOptions::new().with_cancellation(cancel))
        .await?;
    let mut aggregator = TurnAggregator::new();

    while let Some(event) = turn.next_event().await {
        let event = event?;
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => display::print_raw_event(&line),
                Err(e) => tracing::warn!(error = %e, "Failed to re-encode event"),
            }
        } else {
            display::print_event(&event, raw);
        }
        if aggregator.apply(&event).is_break() {
            turn.close().await;
            break;
        }
    }
    drop(turn);

    let result = aggregator.finish()?;
    if !json {
        display::print_final_response(&result.final_response);
    }
    tracing::info!(thread_id = ?thread.id(), "Turn finished");
    Ok(())
}

async fn run_bench(
    mut config: SdkConfig,
    prompt: &str,
    runs: usize,
    max_parallel: usize,
    model: Option<String>,
) -> Result<(), CliError> {
    if let Some(model) = model {
        config.thread.model = Some(model);
    }

    let batch = TurnBatch::new(Codex::new(&config.codex), config.thread, max_parallel);
    cancel_on_ctrl_c(batch.cancellation_token());

    tracing::info!(runs, max_parallel = batch.max_parallel(), "Starting benchmark");
    let report = batch.run(prompt, runs).await;
    for outcome in &report.outcomes {
        if let Err(e) = &outcome.result {
            tracing::warn!(index = outcome.index, error = %e, "Run failed");
        }
    }
    display::print_batch_summary(&report.stats);

    if report.stats.all_failed() {
        return Err(CliError::BenchFailed(report.stats.runs()));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run {
            prompt,
            model,
            sandbox,
            cd,
            resume,
            images,
            skip_git_repo_check,
            json,
            raw,
        } => {
            run_turn(
                config,
                prompt,
                model,
                sandbox,
                cd,
                resume,
                images,
                skip_git_repo_check,
                json,
                raw,
            )
            .await
        }
        Commands::Bench {
            prompt,
            runs,
            max_parallel,
            model,
        } => run_bench(config, &prompt, runs, max_parallel, model).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Run(e)) if e.is_cancelled() => {
            display::print_error(&e.to_string());
            ExitCode::from(130)
        }
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
