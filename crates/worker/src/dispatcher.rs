use crate::error::DispatchError;
use crate::retry::RetryPolicy;
use crate::task::{TaskReport, run_task};
use configuration::WorkerSettings;
use executor::{CalculationExecutor, ExecutionMode};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How the caller wants a calculation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Inline, the caller awaits the result.
    Sync,
    /// Queued to the worker pool, the caller polls the record.
    Async,
}

struct Job {
    calculation_id: Uuid,
    reply: oneshot::Sender<TaskReport>,
}

/// Receives the report of a queued calculation.
#[derive(Debug)]
pub struct JobHandle {
    calculation_id: Uuid,
    reply: oneshot::Receiver<TaskReport>,
}

impl JobHandle {
    pub fn calculation_id(&self) -> Uuid {
        self.calculation_id
    }

    pub async fn wait(self) -> Result<TaskReport, DispatchError> {
        self.reply
            .await
            .map_err(|_| DispatchError::WorkerLost(self.calculation_id))
    }
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatched {
    Queued(JobHandle),
    Inline(TaskReport),
}

struct WorkerContext {
    executor: CalculationExecutor,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Runs calculations inline or on a pool of tokio tasks.
pub struct Dispatcher {
    context: Arc<WorkerContext>,
    queue: Option<mpsc::Sender<Job>>,
    capacity: usize,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `settings.concurrency` workers. Must be called inside a tokio runtime.
    pub fn start(executor: CalculationExecutor, settings: &WorkerSettings) -> Self {
        Self::with_policy(executor, RetryPolicy::from_settings(settings), settings)
    }

    pub fn with_policy(executor: CalculationExecutor, policy: RetryPolicy, settings: &WorkerSettings) -> Self {
        let capacity = settings.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let context = Arc::new(WorkerContext {
            executor,
            policy,
            attempt_timeout: settings.attempt_timeout(),
            in_flight: Mutex::new(HashSet::new()),
        });

        let concurrency = settings.concurrency.max(1);
        let workers = (0..concurrency)
            .map(|n| tokio::spawn(worker_loop(n, Arc::clone(&receiver), Arc::clone(&context))))
            .collect();
        info!(concurrency, capacity, "Worker pool started");

        Self {
            context,
            queue: Some(sender),
            capacity,
            workers,
        }
    }

    /// A dispatcher without a pool. Every async dispatch falls back to inline.
    pub fn inline(executor: CalculationExecutor, settings: &WorkerSettings) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                executor,
                policy: RetryPolicy::from_settings(settings),
                attempt_timeout: settings.attempt_timeout(),
                in_flight: Mutex::new(HashSet::new()),
            }),
            queue: None,
            capacity: 0,
            workers: Vec::new(),
        }
    }

    pub fn executor(&self) -> &CalculationExecutor {
        &self.context.executor
    }

    /// Queues a calculation. Fails when the queue is full or closed, or when
    /// the calculation is already waiting or running.
    pub async fn submit(&self, calculation_id: Uuid) -> Result<JobHandle, DispatchError> {
        let queue = self.queue.as_ref().ok_or(DispatchError::Closed)?;

        let mut in_flight = self.context.in_flight.lock().await;
        if !in_flight.insert(calculation_id) {
            return Err(DispatchError::AlreadyQueued(calculation_id));
        }

        let (reply, receiver) = oneshot::channel();
        match queue.try_send(Job { calculation_id, reply }) {
            Ok(()) => {
                debug!(calculation_id = %calculation_id, "Calculation queued");
                Ok(JobHandle {
                    calculation_id,
                    reply: receiver,
                })
            }
            Err(e) => {
                in_flight.remove(&calculation_id);
                Err(match e {
                    TrySendError::Full(_) => DispatchError::QueueFull(self.capacity),
                    TrySendError::Closed(_) => DispatchError::Closed,
                })
            }
        }
    }

    /// Runs a calculation inline as a single attempt.
    pub async fn run_sync(&self, calculation_id: Uuid) -> TaskReport {
        run_task(
            &self.context.executor,
            calculation_id,
            &RetryPolicy::no_retry(),
            self.context.attempt_timeout,
            ExecutionMode::Sync,
        )
        .await
    }

    /// Queues in async mode, falling back to inline execution when the queue
    /// cannot take the job.
    pub async fn dispatch(&self, calculation_id: Uuid, mode: DispatchMode) -> Result<Dispatched, DispatchError> {
        if mode == DispatchMode::Sync {
            return Ok(Dispatched::Inline(self.run_sync(calculation_id).await));
        }
        match self.submit(calculation_id).await {
            Ok(handle) => Ok(Dispatched::Queued(handle)),
            Err(e @ (DispatchError::QueueFull(_) | DispatchError::Closed)) => {
                warn!(calculation_id = %calculation_id, reason = %e, "Queue unavailable, running synchronously");
                Ok(Dispatched::Inline(self.run_sync(calculation_id).await))
            }
            Err(e) => Err(e),
        }
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(mut self) {
        self.queue.take();
        for result in join_all(self.workers.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(n: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, context: Arc<WorkerContext>) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker = n, "Queue closed, worker exiting");
            return;
        };

        let report = run_task(
            &context.executor,
            job.calculation_id,
            &context.policy,
            context.attempt_timeout,
            ExecutionMode::Async,
        )
        .await;
        context.in_flight.lock().await.remove(&job.calculation_id);

        // The submitter may have stopped listening.
        let _ = job.reply.send(report);
    }
}
