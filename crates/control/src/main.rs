use std::sync::Arc;

use anyhow::Result;
use bastion_control_api::AppState;
use bastion_control_config::{Cli, CliCommand, Config, LogFormat, StorageBackend};
use bastion_control_core::{
    BackgroundJobs, LeaderElection, MasterKey, SecretEncryptor, logging, metrics,
};
use bastion_control_storage::{StorageConfig, create_storage_backend};
use clap::Parser;

fn log_config(config: &Config) -> logging::LogConfig {
    logging::LogConfig {
        format: match config.log_format {
            LogFormat::Json => logging::LogFormat::Json,
            LogFormat::Text => logging::LogFormat::Full,
            LogFormat::Auto => {
                if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                    logging::LogFormat::Full
                } else {
                    logging::LogFormat::Json
                }
            },
        },
        filter: Some(config.log_level.clone()),
        ..Default::default()
    }
}

fn instance_id(config: &Config) -> String {
    config.instance_id.clone().unwrap_or_else(|| format!("control-{:08x}", rand::random::<u32>()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    config.validate()?;

    if let Some(CliCommand::CheckConfig) = cli.command {
        println!("Configuration is valid");
        return Ok(());
    }

    if let Err(e) = logging::init_logging(log_config(&config)) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if config.is_dev_mode() {
        tracing::info!(
            "Development mode enabled via --dev-mode flag: using memory storage, internal errors exposed"
        );
    }

    let effective_storage = config.effective_storage();
    let instance_id = instance_id(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        instance_id = %instance_id,
        storage = %effective_storage,
        listen = %config.listen,
        "Starting Bastion Control"
    );

    metrics::install_prometheus()?;

    // Storage backend
    let storage_config = match effective_storage {
        StorageBackend::Memory => StorageConfig::memory(),
        StorageBackend::Sqlite => StorageConfig::sqlite(config.sqlite_path.clone()),
    };
    let storage = create_storage_backend(&storage_config).await?;
    tracing::info!(backend = %effective_storage, "Storage initialized");

    // The CA key only needs a persistent master key when the CA itself persists
    let master_key = if storage.is_durable() {
        MasterKey::load_or_generate(&config.key_file)?
    } else {
        MasterKey::ephemeral()
    };
    let encryptor = SecretEncryptor::from_master_key(&master_key)?;

    let leader = Arc::new(LeaderElection::new(storage.clone(), instance_id.clone()));
    if let Err(e) = leader.try_acquire_leadership().await {
        tracing::warn!(error = %e, "Initial leadership attempt failed");
    }
    Arc::clone(&leader).start_lease_renewal();

    let config = Arc::new(config);
    let state = AppState::initialize(
        Arc::clone(&config),
        storage.clone(),
        encryptor,
        Some(Arc::clone(&leader)),
        instance_id,
    )
    .await?;
    tracing::info!("Credential authority initialized");

    let interrupted = state.orchestrator.recover_interrupted().await?;
    if interrupted > 0 {
        tracing::warn!(count = interrupted, "Failed jobs interrupted by the previous shutdown");
    }

    let background = BackgroundJobs::new(storage, Arc::clone(&leader))
        .with_job_retention(config.job_retention());
    background.start().await;

    let served = bastion_control_api::serve(state).await;

    tracing::info!("Shutting down gracefully");
    background.stop().await;
    leader.shutdown().await;

    served
}
