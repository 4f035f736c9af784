//! Speaker Vetting CLI
//!
//! The `speaker-vet` command researches a candidate conference speaker,
//! scores them, and sends the report over Slack.
//!
//! ## Commands
//!
//! - `run`: vet one speaker
//! - `batch`: vet speakers from a JSON file concurrently
//! - `schema`: print the scorecard JSON Schema
//! - `init-config`: write the default crew configuration
//! - `validate-config`: check a crew configuration file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use vetting_adapters::{ExaSearch, OpenAiGeneration, SlackMessaging};
use vetting_core::{
    Capabilities, CrewConfig, Pipeline, PipelineResult, QualificationScoreCard, SpeakerProfile,
    METRICS,
};

#[derive(Parser, Debug)]
#[command(name = "speaker-vet")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Research, score and report on candidate conference speakers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Vet a single speaker
    Run {
        /// Speaker's full name
        #[arg(long)]
        name: String,

        /// Proposed talk topic
        #[arg(long)]
        topic: String,

        /// Employer or organisation
        #[arg(long)]
        affiliation: Option<String>,

        /// Crew configuration (TOML); defaults are used if omitted
        #[arg(short, long, env = "SPEAKER_VET_CONFIG")]
        config: Option<PathBuf>,

        /// Override the report recipient's display name
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Vet every speaker listed in a JSON file
    Batch {
        /// JSON array of {"name", "topic", "affiliation"?} objects
        #[arg(short, long)]
        input: PathBuf,

        /// Maximum concurrent runs
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Crew configuration (TOML)
        #[arg(short, long, env = "SPEAKER_VET_CONFIG")]
        config: Option<PathBuf>,

        /// Override the report recipient's display name
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Print the scorecard JSON Schema
    Schema,

    /// Write the default crew configuration
    InitConfig {
        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Parse and validate a crew configuration file
    ValidateConfig {
        /// Path to the TOML file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vetting_core::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Run {
            name,
            topic,
            affiliation,
            config,
            recipient,
        } => {
            let mut profile = SpeakerProfile::new(name, topic);
            profile.affiliation = affiliation;
            cmd_run(config.as_deref(), recipient, profile).await
        }
        Commands::Batch {
            input,
            concurrency,
            config,
            recipient,
        } => cmd_batch(config.as_deref(), recipient, &input, concurrency).await,
        Commands::Schema => cmd_schema(),
        Commands::InitConfig { output, force } => cmd_init_config(output.as_deref(), force),
        Commands::ValidateConfig { config } => cmd_validate_config(&config),
    };

    METRICS.flush();
    outcome
}

/// Load the crew configuration, applying CLI overrides.
fn load_config(path: Option<&Path>, recipient: Option<String>) -> Result<CrewConfig> {
    let mut config = match path {
        Some(path) => CrewConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CrewConfig::default(),
    };
    if let Some(recipient) = recipient {
        config.delivery.recipient = recipient;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn live_capabilities() -> Result<Capabilities> {
    Ok(Capabilities {
        search: Arc::new(ExaSearch::from_env().context("failed to configure Exa search")?),
        generation: Arc::new(
            OpenAiGeneration::from_env().context("failed to configure OpenAI generation")?,
        ),
        messaging: Arc::new(
            SlackMessaging::from_env().context("failed to configure Slack messaging")?,
        ),
    })
}

fn build_pipeline(config: CrewConfig, capabilities: Capabilities) -> Result<Pipeline> {
    let digest = config.digest();
    let pipeline =
        Pipeline::from_config(config, capabilities).context("failed to build pipeline")?;
    info!(config_digest = %digest, stages = ?pipeline.stage_kinds(), "pipeline ready");
    Ok(pipeline)
}

fn read_profiles(path: &Path) -> Result<Vec<SpeakerProfile>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let profiles: Vec<SpeakerProfile> = serde_json::from_str(&text)
        .with_context(|| format!("{} must hold a JSON array of speaker profiles", path.display()))?;
    if profiles.is_empty() {
        bail!("{} contains no speaker profiles", path.display());
    }
    Ok(profiles)
}

/// Fail unless every run was delivered.
fn ensure_delivered(results: &[PipelineResult]) -> Result<()> {
    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.delivered())
        .map(|r| format!("{} ({})", r.profile.name, r.state))
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("not delivered: {}", failed.join(", ")))
    }
}

async fn cmd_run(
    config: Option<&Path>,
    recipient: Option<String>,
    profile: SpeakerProfile,
) -> Result<()> {
    let config = load_config(config, recipient)?;
    let pipeline = build_pipeline(config, live_capabilities()?)?;

    let result = pipeline.run(profile).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(failure) = &result.failure {
        warn!(state = %result.state, kind = ?failure.kind, "{}", failure.message);
    }
    ensure_delivered(std::slice::from_ref(&result))
}

async fn cmd_batch(
    config: Option<&Path>,
    recipient: Option<String>,
    input: &Path,
    concurrency: usize,
) -> Result<()> {
    let profiles = read_profiles(input)?;
    let config = load_config(config, recipient)?;
    let pipeline = Arc::new(build_pipeline(config, live_capabilities()?)?);

    let results = run_batch(pipeline, profiles, concurrency).await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    ensure_delivered(&results)
}

async fn run_batch(
    pipeline: Arc<Pipeline>,
    profiles: Vec<SpeakerProfile>,
    concurrency: usize,
) -> Vec<PipelineResult> {
    let total = profiles.len();
    let results = pipeline.run_many(profiles, concurrency).await;
    let delivered = results.iter().filter(|r| r.delivered()).count();
    info!(total, delivered, failed = total - delivered, "batch complete");
    results
}

fn cmd_schema() -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&QualificationScoreCard::json_schema())?
    );
    Ok(())
}

fn cmd_init_config(output: Option<&Path>, force: bool) -> Result<()> {
    let text = CrewConfig::default().to_toml_string()?;
    match output {
        None => print!("{text}"),
        Some(path) => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote default crew config");
        }
    }
    Ok(())
}

fn cmd_validate_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path), None)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "valid": true,
            "path": path.display().to_string(),
            "recipient": config.delivery.recipient,
            "digest": config.digest(),
        }))?
    );
    Ok(())
}
