use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use killboard_client::KillboardClient;
use killboard_common::{load_config, Config, FileConfig};
use killboard_relay::{
    aggregate::Aggregator,
    notify::{NoopBackend, NotifyBackend, NotifyRouter},
    poller::{DeltaPoller, PollerSettings},
    reports::ReportService,
    scheduler::{Scheduler, Trigger},
    traits::EventSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("killboard=info".parse()?))
        .init();

    info!("Killboard relay starting...");

    // Load config
    let env = Config::from_env();
    env.log_redacted();

    let settings = if env.config_path.exists() {
        load_config(&env.config_path)?
    } else {
        warn!(path = %env.config_path.display(), "Config file not found, using defaults");
        FileConfig::default()
    };

    let classifier = settings.reports.classifier()?;
    let normalizer = settings.normalization.normalizer();

    let client = KillboardClient::new(
        &settings.source.base_url,
        env.api_key.clone(),
        settings.source.timeout(),
    )
    .context("Failed to build killboard client")?;
    let source: Arc<dyn EventSource> = Arc::new(client);

    // Build notification backend: Discord if configured, otherwise Noop
    let channels = [
        settings.relay.kills_channel.as_str(),
        settings.relay.deaths_channel.as_str(),
        settings.reports.channel.as_str(),
    ];
    let notifier: Arc<dyn NotifyBackend> =
        match NotifyRouter::from_env(&channels, env.webhook_url.clone(), settings.source.timeout())? {
            Some(router) => {
                info!("Discord notifications enabled");
                Arc::new(router)
            }
            None => {
                info!("No DISCORD_WEBHOOK_URL set, notifications disabled");
                Arc::new(NoopBackend)
            }
        };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut poller = DeltaPoller::new(
        source.clone(),
        notifier.clone(),
        normalizer.clone(),
        PollerSettings::from_config(&settings),
    );
    let primed = poller.prime().await;
    info!("Cursors primed: {primed}");
    let poller_task = tokio::spawn(poller.run(shutdown_rx.clone()));

    let scheduler_task = if settings.reports.enabled {
        let aggregator = Aggregator::new(classifier, normalizer, &settings.leaderboards);
        let reports = Arc::new(ReportService::new(
            source,
            notifier,
            aggregator,
            settings.source.timeout(),
        ));
        let triggers = Trigger::standard_set(&settings.reports)?;
        let scheduler = Arc::new(Scheduler::new(triggers, classifier.timezone(), reports));
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        info!("Scheduled reports disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for in-flight work");
    if shutdown_tx.send(true).is_err() {
        debug!("Background tasks already stopped before shutdown signal");
    }

    if let Err(e) = poller_task.await {
        warn!(error = %e, "Poller task ended abnormally");
    }
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    info!("Killboard relay stopped");
    Ok(())
}
