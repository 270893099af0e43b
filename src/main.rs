use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use ingress_adapter_jao::core::{CorridorId, FetchWindow, RunReport, WatermarkStore};
use ingress_adapter_jao::domain::model::{format_timestamp, CorridorOutcome};
use ingress_adapter_jao::utils::error::ErrorSeverity;
use ingress_adapter_jao::utils::logger::{self, LogSettings};
use ingress_adapter_jao::utils::validation::Validate;
use ingress_adapter_jao::{
    AdapterConfig, CliArgs, CorridorRegistry, DataLakeStorage, IngestionOrchestrator, JaoClient,
    LocalStorage, ObjectSink, OrchestratorOptions, StateFileWatermarkStore,
};
use std::sync::Arc;

const EXIT_CONFIG: i32 = 2;
const EXIT_STARTUP: i32 = 3;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let (config_path, config) = match AdapterConfig::discover(args.config.as_deref()) {
        Ok(found) => found,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(EXIT_CONFIG);
        }
    };

    let log_settings = match config.logging_file(&config_path) {
        Some(path) => match LogSettings::from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("❌ {}", e.user_friendly_message());
                std::process::exit(EXIT_CONFIG);
            }
        },
        None => LogSettings::default(),
    };
    logger::init_logger(&log_settings.verbose(args.verbose));

    tracing::info!("Starting ingress-adapter-jao");
    tracing::info!("📁 Configuration loaded from {}", config_path.display());
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(EXIT_CONFIG);
    }

    let exit_code = match run(&args, &config, Utc::now()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ Run aborted before processing corridors: {:#}", e);
            eprintln!("❌ {:#}", e);
            EXIT_STARTUP
        }
    };
    std::process::exit(exit_code);
}

async fn run(args: &CliArgs, config: &AdapterConfig, now: DateTime<Utc>) -> anyhow::Result<i32> {
    let default_watermark = config.default_watermark()?;
    let jao = Arc::new(JaoClient::from_config(config)?);

    let corridors = CorridorRegistry::from_config(config)?
        .resolve(jao.as_ref())
        .await
        .context("cannot resolve the corridor list")?;
    tracing::info!("📋 {} corridors to process", corridors.len());

    let datalake = if args.is_local() {
        None
    } else {
        Some(DataLakeStorage::from_config(config)?)
    };
    let datalake = || {
        datalake
            .clone()
            .ok_or_else(|| anyhow!("data lake storage is not configured"))
    };

    let store: Arc<dyn WatermarkStore> = match &args.state_file {
        Some(path) => {
            let (storage, name) = LocalStorage::for_file(path);
            Arc::new(StateFileWatermarkStore::load(storage, name, default_watermark).await?)
        }
        None => {
            let path = format!("{}/{}", config.datasets.source, config.state_path());
            Arc::new(StateFileWatermarkStore::load(datalake()?, path, default_watermark).await?)
        }
    };

    let options = OrchestratorOptions {
        max_window: config.max_window(),
        max_concurrent_corridors: config.max_concurrent_corridors(),
    };

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No fetch, upload or commit will occur");
        perform_dry_run(store.as_ref(), &corridors, &options, now).await?;
        return Ok(0);
    }

    let orchestrator = match &args.output_dir {
        Some(dir) => IngestionOrchestrator::new(
            jao.clone(),
            Arc::new(ObjectSink::new(LocalStorage::new(dir))),
            store,
        ),
        None => IngestionOrchestrator::new(
            jao.clone(),
            Arc::new(ObjectSink::new(datalake()?).with_prefix(&config.datasets.source)),
            store,
        ),
    }
    .with_options(options);

    let report = orchestrator.run(&corridors, now).await;
    display_summary(&report);
    Ok(report.exit_code())
}

async fn perform_dry_run(
    store: &dyn WatermarkStore,
    corridors: &[CorridorId],
    options: &OrchestratorOptions,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    for corridor in corridors {
        let mut watermark = store.get(corridor).await?;
        println!("  {} (watermark {})", corridor, format_timestamp(watermark));

        let mut planned = 0;
        while let Some(window) = FetchWindow::next(corridor, watermark, now, options.max_window) {
            println!("    -> {}", window.sink_key());
            watermark = window.end;
            planned += 1;
        }
        if planned == 0 {
            println!("    up to date");
        }
    }
    Ok(())
}

fn display_summary(report: &RunReport) {
    for corridor in &report.corridors {
        let watermark = corridor
            .watermark
            .map(format_timestamp)
            .unwrap_or_else(|| "unknown".to_string());
        match &corridor.outcome {
            CorridorOutcome::Done if !corridor.advanced() => tracing::info!(
                corridor = %corridor.corridor,
                watermark = %watermark,
                "Corridor up to date"
            ),
            CorridorOutcome::Done => tracing::info!(
                corridor = %corridor.corridor,
                windows = corridor.windows_committed,
                records = corridor.records_uploaded,
                watermark = %watermark,
                "Corridor done"
            ),
            // 依嚴重程度決定要不要吵醒值班人員
            CorridorOutcome::Failed { stage, error, .. } => match error.severity() {
                ErrorSeverity::High | ErrorSeverity::Critical => tracing::error!(
                    corridor = %corridor.corridor,
                    stage = %stage,
                    kind = ?error.kind(),
                    watermark = %watermark,
                    "🚨 {}",
                    error.recovery_suggestion()
                ),
                ErrorSeverity::Low | ErrorSeverity::Medium => tracing::warn!(
                    corridor = %corridor.corridor,
                    stage = %stage,
                    kind = ?error.kind(),
                    watermark = %watermark,
                    "💡 {}",
                    error.recovery_suggestion()
                ),
            },
        }
    }

    let failed = report.failed().count();
    if failed == 0 {
        tracing::info!(
            "✅ Ingestion run completed: {} corridors, {} records uploaded",
            report.corridors.len(),
            report.total_records()
        );
        println!(
            "✅ {} corridors processed, {} records uploaded",
            report.corridors.len(),
            report.total_records()
        );
    } else {
        tracing::error!(
            "❌ Ingestion run finished with {} of {} corridors failed",
            failed,
            report.corridors.len()
        );
        eprintln!(
            "❌ {} of {} corridors failed; their windows are retried on the next run",
            failed,
            report.corridors.len()
        );
    }
}
