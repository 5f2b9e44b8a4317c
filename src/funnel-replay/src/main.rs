//! Funnel replay: plays a scripted visitor journey through the experiment
//! assigner and page instrumentation, then prints the PostHog batches that
//! would have been sent.

mod context;
mod journey;

use std::path::PathBuf;

use clap::Parser;
use funnel_core::config::AppConfig;
use serde_json::json;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::journey::{Journey, Pacing};

#[derive(Parser, Debug)]
#[command(name = "funnel-replay")]
#[command(about = "Replay a visitor journey through the funnel instrumentation")]
#[command(version)]
struct Cli {
    /// Journey script (JSON)
    #[arg(long)]
    journey: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, env = "FUNNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Analytics project key (overrides config)
    #[arg(long, env = "FUNNEL__ANALYTICS__API_KEY")]
    api_key: Option<String>,

    /// Durable assignment store (overrides config)
    #[arg(long)]
    durable_path: Option<PathBuf>,

    /// Pace steps by the wall clock instead of the scripted timeline
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Force an assignment before replaying, as `experiment=variant`
    #[arg(long = "force", value_parser = parse_force)]
    force: Vec<(String, String)>,

    /// Drop every stored assignment before replaying
    #[arg(long, default_value_t = false)]
    clear_experiments: bool,
}

fn parse_force(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((experiment, variant)) if !experiment.is_empty() && !variant.is_empty() => {
            Ok((experiment.to_string(), variant.to_string()))
        }
        _ => Err(format!("expected experiment=variant, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funnel_replay=info,funnel_web_sdk=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(api_key) = cli.api_key {
        config.analytics.api_key = Some(api_key);
    }
    if let Some(path) = cli.durable_path {
        config.storage.durable_path = Some(path);
    }

    let journey = Journey::load(&cli.journey)?;
    info!(
        url = %journey.url,
        steps = journey.steps.len(),
        realtime = cli.realtime,
        "replaying journey"
    );

    let pacing = if cli.realtime {
        Pacing::Realtime
    } else {
        Pacing::scripted()
    };
    let ctx = AppContext::build_with_clock(config, pacing.clock());
    if cli.clear_experiments {
        ctx.assigner.clear_all_experiments();
    }
    for (experiment, variant) in &cli.force {
        ctx.assigner.force_variant(experiment, variant);
    }

    let summary = journey::replay(&ctx, journey, &pacing).await?;
    let batches = ctx.shutdown();

    let report = json!({
        "summary": summary,
        "batches": batches,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
