//! Startup wiring: open the links, spawn the long-running tasks, serve HTTP.

use elocker_network::PeerManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{GatewayConfig, SensorMode};
use crate::correlator::Correlator;
use crate::error::{GatewayError, Result};
use crate::http;
use crate::link::open_serial;
use crate::lock::{LockController, run_lock_pump};
use crate::sensor::{SensorPoller, run_sensor_pump};
use crate::service::Gateway;
use crate::state::GatewayState;
use crate::store::ThresholdStore;

const READINGS_CHANNEL_CAPACITY: usize = 16;

/// Run the gateway until a task fails or every task has ended.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let store = ThresholdStore::new(&config.store.path);
    let thresholds = store
        .load_or_init()
        .map_err(|source| GatewayError::Store {
            path: config.store.path.clone(),
            source,
        })?;
    let state = Arc::new(GatewayState::new(thresholds, config.sensor.auto_unlock));

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let (lock_writer, lock_chunks) = open_serial("lock", &config.lock.port, config.lock.baud_rate)
        .map_err(|source| GatewayError::Serial {
            name: "lock",
            port: config.lock.port.clone(),
            source,
        })?
        .into_parts();
    let lock = LockController::new(
        lock_writer,
        config.lock.controller_id,
        Duration::from_millis(config.lock.settle_ms),
    );

    tasks.spawn(pumped(run_lock_pump(
        lock_chunks,
        state.clone(),
        lock.clone(),
        config.lock.release_empty_slots,
    )));
    {
        let lock = lock.clone();
        let interval = Duration::from_millis(config.lock.poll_interval_ms);
        tasks.spawn(async move {
            lock.run_poll(interval).await;
            Ok(())
        });
    }

    let poller = match config.sensor.mode {
        SensorMode::Serial => {
            let (writer, chunks) =
                open_serial("sensor", &config.sensor.port, config.sensor.baud_rate)
                    .map_err(|source| GatewayError::Serial {
                        name: "sensor",
                        port: config.sensor.port.clone(),
                        source,
                    })?
                    .into_parts();
            let correlator = Arc::new(Correlator::new(writer));
            tasks.spawn(pumped(run_sensor_pump(
                chunks,
                config.sensor.framing.into(),
                correlator.clone(),
            )));
            Some(SensorPoller::new(
                correlator,
                config.device_ids(),
                Duration::from_millis(config.sensor.timeout_ms),
            ))
        }
        SensorMode::Network => None,
    };

    let gateway = Arc::new(Gateway::new(state, store, lock, poller));

    if config.sensor.mode == SensorMode::Network {
        let manager = PeerManager::new(config.discovery_config()?, config.peer_link_config());
        let (tx, mut rx) = mpsc::channel(READINGS_CHANNEL_CAPACITY);

        tasks.spawn(async move {
            manager.run(tx).await?;
            Ok(())
        });

        let gateway = gateway.clone();
        tasks.spawn(async move {
            while let Some(batch) = rx.recv().await {
                gateway.ingest_readings(&batch).await;
            }
            Ok(())
        });
    }

    let listener = TcpListener::bind(&config.http.bind)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: config.http.bind.clone(),
            source,
        })?;
    let bind = config.http.bind.clone();
    tasks.spawn(async move {
        http::serve(listener, gateway)
            .await
            .map_err(|source| GatewayError::Bind { addr: bind, source })
    });

    info!(mode = ?config.sensor.mode, "Gateway started");

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tasks.shutdown().await;
                return Err(e);
            }
            Err(e) => error!(error = %e, "Gateway task panicked"),
        }
    }
    Ok(())
}

async fn pumped(pump: impl Future<Output = ()>) -> Result<()> {
    pump.await;
    Ok(())
}
