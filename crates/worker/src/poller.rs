use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use configuration::WorkerSettings;
use database::CalculationStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Feeds `Pending` calculations from the store into the worker pool.
pub struct Poller {
    store: Arc<dyn CalculationStore>,
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    batch_size: usize,
}

impl Poller {
    pub fn new(store: Arc<dyn CalculationStore>, dispatcher: Arc<Dispatcher>, settings: &WorkerSettings) -> Self {
        Self {
            store,
            dispatcher,
            every: settings.poll_interval().max(MIN_POLL_INTERVAL),
            batch_size: settings.queue_capacity.max(1),
        }
    }

    /// Submits the oldest pending calculations once. Returns how many were queued.
    pub async fn poll_once(&self) -> Result<usize, DispatchError> {
        let pending = self.store.list_pending(self.batch_size).await?;
        let mut queued = 0;
        for calculation in pending {
            match self.dispatcher.submit(calculation.id).await {
                Ok(_) => queued += 1,
                Err(DispatchError::AlreadyQueued(_)) => {}
                Err(DispatchError::QueueFull(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(queued)
    }

    /// Polls on an interval until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        info!(interval_secs = self.every.as_secs(), "Polling for pending calculations");
        let mut timer = interval(self.every);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Poller stopping");
                    return;
                }
                _ = timer.tick() => match self.poll_once().await {
                    Ok(0) => {}
                    Ok(queued) => info!(queued, "Queued pending calculations"),
                    Err(e) => error!(error = %e, "Polling for pending calculations failed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, inverse_series};
    use core_types::CalculationStatus;

    #[tokio::test]
    async fn test_poll_once_queues_pending_work() {
        let fixture = Fixture::new(inverse_series(3)).await;
        let dispatcher = Arc::new(Dispatcher::start(fixture.executor(), &fixture.settings.worker));
        let poller = Poller::new(fixture.repo.clone(), dispatcher.clone(), &fixture.settings.worker);

        assert_eq!(poller.poll_once().await.unwrap(), 1);

        let mut status = CalculationStatus::Pending;
        for _ in 0..200 {
            status = fixture.stored().await.status;
            if status == CalculationStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, CalculationStatus::Completed);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_without_pool_reports_closed_queue() {
        let fixture = Fixture::new(Vec::new()).await;
        let dispatcher = Arc::new(Dispatcher::inline(fixture.executor(), &fixture.settings.worker));
        let poller = Poller::new(fixture.repo.clone(), dispatcher, &fixture.settings.worker);
        assert!(matches!(poller.poll_once().await, Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let fixture = Fixture::new(Vec::new()).await;
        let dispatcher = Arc::new(Dispatcher::start(fixture.executor(), &fixture.settings.worker));
        let poller = Poller::new(fixture.repo.clone(), dispatcher, &fixture.settings.worker);

        tokio::time::timeout(Duration::from_secs(5), poller.run(async {}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_floored() {
        let mut fixture = Fixture::new(Vec::new()).await;
        fixture.settings.worker.poll_interval_secs = 0;
        let dispatcher = Arc::new(Dispatcher::start(fixture.executor(), &fixture.settings.worker));
        let poller = Poller::new(fixture.repo.clone(), dispatcher, &fixture.settings.worker);
        assert_eq!(poller.every, MIN_POLL_INTERVAL);

        tokio::time::timeout(Duration::from_secs(5), poller.run(async {}))
            .await
            .unwrap();
    }
}
