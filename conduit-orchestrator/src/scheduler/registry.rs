//! Scheduler registry
//!
//! Holds at most one running `CronRunner` per pipeline. The map lives inside
//! a single control loop; every other task talks to it through
//! `SchedulerHandle`, whose requests share one channel and are therefore
//! applied in the order they were sent.

use conduit_core::domain::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{CronRunner, FireHandler};

/// Request processed by the registry loop
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Add or replace the runner of a pipeline
    Register(CronRunner),
    /// Stop and remove the runner of a pipeline
    Unregister(Uuid),
}

/// Runner map owned by the registry loop
pub struct Registry {
    runners: HashMap<Uuid, CronRunner>,
    handler: Arc<dyn FireHandler>,
}

impl Registry {
    pub fn new(handler: Arc<dyn FireHandler>) -> Self {
        Self {
            runners: HashMap::new(),
            handler,
        }
    }

    /// Add or replace the runner of `runner.pipeline_id()`.
    ///
    /// An existing runner with the same spec and timezone is kept untouched. Otherwise the
    /// existing runner is stopped before the new one starts; a runner with an
    /// empty spec only removes.
    pub fn register(&mut self, mut runner: CronRunner) {
        let pipeline_id = runner.pipeline_id();
        tracing::debug!("Registering cron runner for pipeline {} ({})", pipeline_id, runner.spec());

        if let Some(existing) = self.runners.get(&pipeline_id) {
            if existing.spec() == runner.spec() && existing.timezone() == runner.timezone() {
                return;
            }
        }
        if let Some(mut existing) = self.runners.remove(&pipeline_id) {
            existing.stop();
        }
        if runner.is_empty() {
            return;
        }

        runner.add_job(self.handler.clone());
        runner.start();
        self.runners.insert(pipeline_id, runner);
    }

    pub fn unregister(&mut self, pipeline_id: Uuid) {
        tracing::debug!("Unregistering cron runner for pipeline {}", pipeline_id);
        if let Some(mut existing) = self.runners.remove(&pipeline_id) {
            existing.stop();
        }
    }

    pub fn apply(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Register(runner) => self.register(runner),
            SchedulerCommand::Unregister(pipeline_id) => self.unregister(pipeline_id),
        }
    }

    /// Stop every runner
    pub fn shutdown(&mut self) {
        for (_, mut runner) in self.runners.drain() {
            runner.stop();
        }
    }

    pub fn get(&self, pipeline_id: Uuid) -> Option<&CronRunner> {
        self.runners.get(&pipeline_id)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

/// Sender side of the registry loop; cheap to clone
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Create a handle and the receiver to pass to `spawn`
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SchedulerCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    pub fn register(&self, runner: CronRunner) {
        self.send(SchedulerCommand::Register(runner));
    }

    pub fn unregister(&self, pipeline_id: Uuid) {
        self.send(SchedulerCommand::Unregister(pipeline_id));
    }

    /// Bring the pipeline's runner in line with its current definition.
    ///
    /// Scheduled pipelines get their runner registered (or replaced), all
    /// others are unregistered. A spec that fails to parse leaves the
    /// pipeline unscheduled.
    pub fn sync_pipeline(&self, pipeline: &Pipeline) {
        if !pipeline.is_scheduled() {
            self.unregister(pipeline.id);
            return;
        }
        match CronRunner::for_pipeline(pipeline) {
            Ok(runner) => self.register(runner),
            Err(e) => {
                tracing::error!("Pipeline {} cannot be scheduled: {}", pipeline.id, e);
                self.unregister(pipeline.id);
            }
        }
    }

    fn send(&self, command: SchedulerCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Scheduler is not running, request dropped");
        }
    }
}

/// Spawn the registry loop.
///
/// The registry is seeded with every activated pipeline carrying a cron
/// spec, then serves requests until `shutdown` is cancelled or every handle
/// is dropped, at which point all runners are stopped.
pub fn spawn(
    mut commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    handler: Arc<dyn FireHandler>,
    seed: Vec<Pipeline>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut registry = Registry::new(handler);

        for pipeline in seed.iter().filter(|p| p.is_scheduled()) {
            match CronRunner::for_pipeline(pipeline) {
                Ok(runner) => registry.register(runner),
                Err(e) => tracing::error!("Pipeline {} cannot be scheduled: {}", pipeline.id, e),
            }
        }
        tracing::info!("Scheduler started with {} cron runner(s)", registry.len());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => registry.apply(command),
                    None => break,
                },
            }
        }

        registry.shutdown();
        tracing::info!("Scheduler stopped");
    })
}
