//! Beacon lifecycle: wires the store, the write consumer and the service.

use beacon_auth::CredentialManager;
use beacon_core::BeaconConfig;
use beacon_queue::ConsumerStats;
use beacon_state::StateStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::service::StatusService;

/// A running Beacon instance. Must be started inside a tokio runtime.
pub struct Beacon {
    service: StatusService,
    shutdown_tx: watch::Sender<bool>,
    consumer: JoinHandle<ConsumerStats>,
}

impl Beacon {
    /// Take the store's writer, spawn the write consumer and build the
    /// service around it.
    pub fn start(store: StateStore, config: &BeaconConfig) -> ServiceResult<Self> {
        let writer = store.take_writer().ok_or(ServiceError::WriterUnavailable)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, consumer) = beacon_queue::spawn(writer, shutdown_rx);

        let credentials = CredentialManager::new(store.clone())
            .with_collision_backoff(config.credentials.collision_backoff());
        let service =
            StatusService::new(store, credentials, queue, config.service.provision_verify);

        info!(database = %config.database_path().display(), "beacon started");
        Ok(Self {
            service,
            shutdown_tx,
            consumer,
        })
    }

    pub fn service(&self) -> &StatusService {
        &self.service
    }

    /// Stop the consumer after it applies everything already queued.
    pub async fn shutdown(self) -> ServiceResult<ConsumerStats> {
        // The consumer may already have exited; joining still reports it.
        let _ = self.shutdown_tx.send(true);
        let stats = self
            .consumer
            .await
            .map_err(|e| ServiceError::Consumer(e.to_string()))?;
        info!(
            applied = stats.applied,
            skipped = stats.skipped,
            "beacon stopped"
        );
        Ok(stats)
    }
}
