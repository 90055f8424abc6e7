mod cli;

use anyhow::{Context, Result};
use chrono::Days;
use clap::Parser;
use cli::{Args, Command};
use meterbook::contact::ContactClient;
use meterbook::logging::{StructuredLogger, get_logger, init_logging};
use meterbook::report::{render_hourly_markdown, render_status};
use meterbook::sync::ResolutionOutcome;
use meterbook::{
    Clock, Config, ContractLock, Resolution, ResilientFetcher, RetryPolicy, SyncCoordinator,
    SyncService, SystemClock, UsageStore,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    args.credentials.apply(&mut config);
    config.validate()?;
    init_logging(&config.logging)?;

    let logger = get_logger("main");
    logger.info(&format!("Meterbook {} starting", env!("APP_VERSION")));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.tz()?));

    match args.command {
        Command::Status => {
            let store = load_store(&config, clock).await?;
            print!("{}", render_status(&store));
        }
        Command::ExportHourly { output, days } => {
            let today = clock.today();
            let from = today.checked_sub_days(Days::new(u64::from(days))).unwrap_or(today);
            let store = load_store(&config, clock).await?;
            let records = store.records(Resolution::Hourly).map(|(_, record)| record);
            let markdown = render_hourly_markdown(records, from, today);
            std::fs::write(&output, markdown)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote hourly usage {} to {} into {}", from, today, output.display());
        }
        Command::Sync { force } => {
            let (_client, mut coordinator) = connect(&config, clock, &logger).await?;
            let report = if force {
                coordinator.force_sync().await?
            } else {
                coordinator.sync().await?
            };
            for (resolution, outcome) in &report.outcomes {
                let line = match outcome {
                    ResolutionOutcome::NotDue => "not due".to_string(),
                    ResolutionOutcome::UpToDate => "up to date".to_string(),
                    ResolutionOutcome::Synced {
                        fetched,
                        merged,
                        pruned,
                    } => format!("fetched {}, merged {}, pruned {}", fetched, merged, pruned),
                    ResolutionOutcome::Failed(reason) => format!("failed: {}", reason),
                };
                println!("{:<8} {}", resolution.as_str(), line);
            }
        }
        Command::Run => {
            let (client, coordinator) = connect(&config, clock, &logger).await?;
            let handle = SyncService::new(coordinator, config.sync.cycle_interval())
                .with_reauth(client)
                .start();
            let mut updates = handle.subscribe();

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        logger.info("Interrupt received, stopping");
                        break;
                    }
                    update = updates.recv() => match update {
                        Ok(update) => logger.info(&format!(
                            "Usage data updated for contract {} ({} records merged)",
                            update.contract_id,
                            update.report.merged()
                        )),
                        Err(RecvError::Lagged(missed)) => {
                            logger.warn(&format!("Missed {} update notifications", missed));
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }

            handle.shutdown().await?;
            logger.info("Shutdown complete");
        }
    }

    Ok(())
}

async fn load_store(config: &Config, clock: Arc<dyn Clock>) -> Result<UsageStore> {
    if config.contract_id.trim().is_empty() {
        anyhow::bail!("contract_id must be configured to read the cache");
    }
    let mut store = UsageStore::new(
        &config.contract_id,
        config.cache_path(),
        ContractLock::new(),
        clock,
    );
    store.load().await.context("Failed to read the usage cache")?;
    Ok(store)
}

/// Log in, resolve the contract and assemble a coordinator for it
async fn connect(
    config: &Config,
    clock: Arc<dyn Clock>,
    logger: &StructuredLogger,
) -> Result<(Arc<ContactClient>, SyncCoordinator)> {
    let client = Arc::new(ContactClient::new(
        &config.api,
        &config.account_id,
        clock.timezone(),
    )?);
    client.authenticate().await.context("Login failed")?;

    let contract_id = if config.contract_id.trim().is_empty() {
        let picked = client.first_contract().await?;
        logger.info(&format!(
            "Using contract {} of account {}",
            picked.contract_id, picked.account_id
        ));
        if config.account_id.trim().is_empty() {
            client.set_account_id(&picked.account_id).await;
        }
        picked.contract_id
    } else {
        config.contract_id.clone()
    };

    let store = UsageStore::new(
        &contract_id,
        config.cache_path(),
        ContractLock::new(),
        clock.clone(),
    );
    let fetcher = ResilientFetcher::new(client.clone(), RetryPolicy::from(&config.sync.retry));
    let coordinator = SyncCoordinator::new(&contract_id, store, fetcher, config.sync.clone(), clock);
    Ok((client, coordinator))
}
