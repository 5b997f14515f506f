use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pokerbots_env::config::{EnvConfig, ProfileKind};
use pokerbots_env::engine::{Engine, EngineProcess, EngineSettings, RemoteEngine};
use pokerbots_env::runner::{Policy, Runner, RunnerConfig};
use pokerbots_env::{PokerEnv, parse_line, web};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pokerbots-env",
    version,
    about = "Reinforcement-learning adapter for a line-protocol poker engine",
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON environment config (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse one protocol line and print the message and its features
    Parse {
        line: String,

        #[arg(long)]
        profile: Option<ProfileArg>,
    },
    /// Show which protocol action an action index maps to
    Decode { index: usize },
    /// Play episodes against an engine with a fixed policy
    Play {
        /// Connect to an engine already listening on HOST:PORT
        #[arg(long, conflicts_with = "engine_dir")]
        connect: Option<SocketAddr>,

        /// Launch the engine found in this directory
        #[arg(long, required_unless_present = "connect")]
        engine_dir: Option<PathBuf>,

        /// Port the launched engine listens on
        #[arg(long, default_value_t = 12345)]
        port: u16,

        #[arg(long, default_value_t = 1)]
        episodes: u32,

        /// RNG seed (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "random")]
        policy: PolicyArg,

        /// Disable ANSI colors in CLI output
        #[arg(long = "no-color", default_value_t = false)]
        no_color: bool,
    },
    /// Serve the environment over HTTP
    Serve {
        /// Address to bind (HOST:PORT)
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum ProfileArg {
    Compact,
    Extended,
}

impl From<ProfileArg> for ProfileKind {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Compact => ProfileKind::Compact,
            ProfileArg::Extended => ProfileKind::Extended,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum PolicyArg {
    Random,
    Passive,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Random => Policy::Random,
            PolicyArg::Passive => Policy::Passive,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = color_eyre::install();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EnvConfig::load(path)?,
        None => EnvConfig::default(),
    };

    match cli.command {
        Commands::Parse { line, profile } => run_parse(config, &line, profile),
        Commands::Decode { index } => run_decode(config, index),
        Commands::Play {
            connect,
            engine_dir,
            port,
            episodes,
            seed,
            policy,
            no_color,
        } => {
            let runner_config = RunnerConfig {
                episodes,
                seed,
                policy: policy.into(),
                no_color,
                ..RunnerConfig::default()
            };
            tokio::task::spawn_blocking(move || match (connect, engine_dir) {
                (Some(addr), _) => {
                    let engine =
                        RemoteEngine::new(addr, config.connect_timeout, config.read_timeout);
                    play(PokerEnv::new(engine, config)?, runner_config)
                }
                (None, Some(dir)) => {
                    let mut settings = EngineSettings::training(dir);
                    settings.port = port;
                    settings.connect_timeout = config.connect_timeout;
                    settings.read_timeout = config.read_timeout;
                    play(PokerEnv::new(EngineProcess::new(settings), config)?, runner_config)
                }
                (None, None) => anyhow::bail!("either --connect or --engine-dir is required"),
            })
            .await?
        }
        Commands::Serve { addr } => {
            let addr: SocketAddr = addr.parse().context("invalid --addr")?;
            web::serve(addr, config).await
        }
    }
}

fn run_parse(mut config: EnvConfig, line: &str, profile: Option<ProfileArg>) -> Result<()> {
    if let Some(profile) = profile {
        config.profile = profile.into();
    }
    let Some(message) = parse_line(line) else {
        println!("{}", json!({ "message": null }));
        return Ok(());
    };
    let encoder = config.encoder()?;
    let features: serde_json::Map<String, serde_json::Value> = encoder
        .encode(&message)
        .into_iter()
        .enumerate()
        .filter(|(_, value)| *value != 0.0)
        .map(|(index, value)| (index.to_string(), json!(value)))
        .collect();
    let output = json!({
        "message": message,
        "width": encoder.len(),
        "features": features,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_decode(config: EnvConfig, index: usize) -> Result<()> {
    let actions = config.action_space()?;
    println!("{} ({})", actions.decode(index), actions.describe(index));
    Ok(())
}

fn play<E: Engine>(env: PokerEnv<E>, config: RunnerConfig) -> Result<()> {
    let mut runner = Runner::new(env, config);
    let summary = runner.run()?;
    runner.print_summary(&summary);
    Ok(())
}
