use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use taskdeck_app::config::AppConfig;
use taskdeck_app::notify::AutoDismiss;
use taskdeck_engine::{DueReminder, Engine, EngineConfig, EngineEvent};
use taskdeck_store::JsonFileStore;
use taskdeck_sync::MemoryBroker;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::parse();
    let data_dir = config.data_dir();
    info!("taskdeck starting");
    info!("data dir: {}", data_dir.display());

    let store = Arc::new(JsonFileStore::new(&data_dir));
    let broker = Arc::new(MemoryBroker::new());
    let engine = Engine::spawn(
        store,
        broker,
        EngineConfig {
            poll_interval: config.poll_interval(),
            remind_policy: config.remind_policy,
            handshake_timeout: config.handshake_timeout(),
            ..Default::default()
        },
    )
    .await;

    let stats = engine.stats().await?;
    info!(
        "{} tasks loaded ({}% complete)",
        stats.total,
        stats.completion_percent()
    );

    if let Some(room) = &config.room {
        info!("joining room {room}");
        engine.join_room(room).await?;
    }

    let mut auto_dismiss = AutoDismiss::new(Duration::from_secs(config.auto_dismiss));
    let mut events = engine.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                engine.shutdown().await.ok();
                break;
            }
            event = events.recv() => match event {
                Ok(EngineEvent::ReminderDue(due)) => {
                    match &due {
                        DueReminder::Task { task } => {
                            info!("reminder due: task \"{}\"", task.title);
                        }
                        DueReminder::Attachment {
                            task_title,
                            attachment,
                            ..
                        } => {
                            info!(
                                "reminder due: attachment \"{}\" on task \"{}\"",
                                attachment.name, task_title
                            );
                        }
                    }
                    auto_dismiss.arm(engine.clone());
                }
                Ok(EngineEvent::CollectionChanged) => debug!("collection changed"),
                Ok(EngineEvent::SyncStatusChanged(status)) => {
                    info!("collaboration status: {status}");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("missed {n} events"),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}
