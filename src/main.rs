use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{Level, info, warn};

use ndpr_guard::{
    BanService, ConsoleServerControl, EnforcementGate, GuardConfig, JoinWatcher, RemoteBanClient,
    ServerControl, SnapshotSyncer,
    config::sanitize_for_logging,
    console::{OperatorCommand, OperatorContext},
};

/// How often the server log is checked for new joins
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - the server mode must be set explicitly
    let config = Arc::new(GuardConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check the NDPR_* environment variables.");
        e
    })?);

    init_logging(&config)?;

    info!("Starting NDPR ban guard");
    info!(
        "Server mode: {}, log: {}, partition: {}",
        if config.server.online_mode { "online" } else { "offline" },
        config.server.log_path.display(),
        config.partition()
    );
    if config.has_token() {
        info!("API token: {}", sanitize_for_logging(&config.remote.token));
    } else {
        warn!("NDPR_TOKEN not set, the ban database will not be updated");
    }

    let service: Arc<dyn BanService> = Arc::new(RemoteBanClient::new(&config.remote)?);
    let syncer = Arc::new(SnapshotSyncer::new(&config, service.clone()));

    // Enforce with the last known list until the first sync completes
    if syncer.load_persisted().await.is_none() {
        warn!("No local ban database yet, joins are allowed until the first sync");
    }

    let gate = Arc::new(EnforcementGate::from_config(&config));
    let control: Arc<dyn ServerControl> = Arc::new(ConsoleServerControl::stdout());
    let operator = Arc::new(OperatorContext {
        config: config.clone(),
        syncer: syncer.clone(),
        gate: gate.clone(),
        service,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_task = tokio::spawn({
        let syncer = syncer.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { syncer.run(shutdown_rx).await }
    });

    let (join_tx, mut join_rx) = mpsc::channel::<String>(64);
    let watcher = JoinWatcher::from_end(config.server.log_path.clone()).await;
    let watch_task = tokio::spawn(watcher.run(JOIN_POLL_INTERVAL, join_tx, shutdown_rx));

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let partition = config.partition();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(player) = join_rx.recv() => {
                let gate = gate.clone();
                let syncer = syncer.clone();
                let control = control.clone();
                tokio::spawn(async move {
                    gate.on_player_join(&player, partition, &syncer, control.as_ref())
                        .await;
                });
            }
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match OperatorCommand::parse(&line) {
                    Some(Ok(command)) => {
                        let operator = operator.clone();
                        tokio::spawn(async move {
                            for reply in operator.execute(command).await {
                                eprintln!("[NDPR] {}", reply);
                            }
                        });
                    }
                    Some(Err(message)) => eprintln!("[NDPR] {}", message),
                    None => {}
                },
                Ok(None) => {
                    info!("Operator input closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read operator input");
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let (sync_result, watch_result) = tokio::join!(sync_task, watch_task);
    if let Err(e) = sync_result {
        warn!(error = %e, "Sync task ended abnormally");
    }
    if let Err(e) = watch_result {
        warn!(error = %e, "Join watcher ended abnormally");
    }

    info!("NDPR ban guard stopped");
    Ok(())
}

/// Initialize logging on stderr; stdout carries console commands
fn init_logging(config: &GuardConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
