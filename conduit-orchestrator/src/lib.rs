//! Conduit orchestrator
//!
//! Runs CI/CD pipelines: pipeline definitions, activities (runs) driven
//! through a state machine by executor callbacks, cron and webhook
//! triggers, and a live change stream.

pub mod api;
pub mod config;
pub mod db;
pub mod hub;
pub mod locks;
pub mod provider;
pub mod repository;
pub mod scheduler;
pub mod scm;
pub mod service;
pub mod store;

use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::Hub;
use crate::provider::PipelineProvider;
use crate::scheduler::SchedulerHandle;
use crate::scm::SourceControl;
use crate::service::{Coordinator, EngineError};
use crate::store::ObjectStore;

/// A running orchestrator: the coordinator plus its background loops
pub struct App {
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Spawn the change hub and the scheduler, seed cron runners from the
    /// stored pipelines and reconcile activities left in flight.
    pub async fn start(
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn PipelineProvider>,
        scm: Arc<dyn SourceControl>,
        subscriber_buffer: usize,
    ) -> Result<Self, EngineError> {
        let shutdown = CancellationToken::new();
        let (hub, hub_task) = Hub::spawn(subscriber_buffer, shutdown.clone());
        let (scheduler, commands) = SchedulerHandle::channel();
        let coordinator = Arc::new(Coordinator::new(store, provider, scm, hub, scheduler));

        let seed = match coordinator.list_pipelines().await {
            Ok(pipelines) => pipelines,
            Err(e) => {
                shutdown.cancel();
                return Err(e);
            }
        };
        let scheduler_task =
            scheduler::registry::spawn(commands, coordinator.clone(), seed, shutdown.clone());

        let app = Self {
            coordinator,
            shutdown,
            tasks: vec![hub_task, scheduler_task],
        };
        if let Err(e) = app.coordinator.sync_in_flight().await {
            tracing::error!("Failed to reconcile in-flight activities: {}", e);
        }
        Ok(app)
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn router(&self) -> Router {
        api::create_router(self.coordinator.clone())
    }

    /// Stop the background loops and every cron runner
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    }
}
