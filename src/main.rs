use anyhow::{bail, Context, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wacc_kernel::engine::InputSnapshot;
use wacc_kernel::recovery::{ProtectedError, RecoveryOrchestrator, RecoveryOutcome};
use wacc_kernel::{Services, WaccConfig, WaccEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    // 2. Load config + input
    let mut args = std::env::args().skip(1);
    let input_path = args
        .next()
        .context("usage: wacc-kernel <input.json> [config.json]")?;
    let config = match args.next() {
        Some(path) => WaccConfig::from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => WaccConfig::default(),
    }
    .with_env_overrides()?;

    let raw = std::fs::read_to_string(&input_path)
        .with_context(|| format!("reading input snapshot {input_path}"))?;
    let input: InputSnapshot =
        serde_json::from_str(&raw).with_context(|| format!("parsing {input_path}"))?;

    // 3. Wire services + boundary
    let services = Services::from_config(&config);
    let engine = WaccEngine::new(services.clone(), &config.validation);
    let boundary = RecoveryOrchestrator::new("cli", services, config.recovery.clone());
    tracing::info!(boundary = %boundary.id(), "WACC kernel ready");

    // 4. Calculate, retrying while the boundary recovers
    let result = loop {
        match boundary.protect(|| engine.calculate(&input)).await {
            Ok(result) => break result,
            Err(ProtectedError::Failed {
                outcome: RecoveryOutcome::Recovered(report),
                error,
            }) => {
                tracing::warn!(%error, attempt = %report.attempt_label(), "Retrying calculation");
            }
            Err(err) => bail!(err),
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    tracing::debug!(metrics = ?engine.metrics(), "Telemetry snapshot");
    Ok(())
}
