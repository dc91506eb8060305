//! Polling worker that feeds inbound deliveries to the handler.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use series_store::SeriesStore;

use crate::bus::MessageBus;
use crate::error::BusError;
use crate::handler::{Disposition, NumberingHandler};

/// Counts of dispositions across one or more polled batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub acknowledged: usize,
    pub rejected: usize,
    pub retried: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.acknowledged + self.rejected + self.retried
    }

    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Acknowledged(_) => self.acknowledged += 1,
            Disposition::Rejected(_) => self.rejected += 1,
            Disposition::Retry(_) => self.retried += 1,
        }
    }
}

impl std::ops::AddAssign for BatchReport {
    fn add_assign(&mut self, other: Self) {
        self.acknowledged += other.acknowledged;
        self.rejected += other.rejected;
        self.retried += other.retried;
    }
}

/// Pulls batches from the inbound topic and handles each batch concurrently.
///
/// Any number of workers, in one process or many, may share a store; the
/// numbering protocol does not rely on this worker being the only one.
pub struct NumberingWorker<S: SeriesStore, B: MessageBus> {
    handler: Arc<NumberingHandler<S, B>>,
}

impl<S: SeriesStore, B: MessageBus> Clone for NumberingWorker<S, B> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S: SeriesStore, B: MessageBus> NumberingWorker<S, B> {
    pub fn new(handler: NumberingHandler<S, B>) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> &NumberingHandler<S, B> {
        &self.handler
    }

    /// Polls one batch and handles it. An empty report means nothing was
    /// pending.
    pub async fn poll_once(&self) -> Result<BatchReport, BusError> {
        let config = self.handler.config();
        let batch = self
            .handler
            .bus()
            .poll(&config.inbound_topic, config.batch_size)
            .await?;

        let dispositions = join_all(batch.iter().map(|d| self.handler.handle(d))).await;

        let mut report = BatchReport::default();
        for disposition in &dispositions {
            report.record(disposition);
        }
        Ok(report)
    }

    /// Handles batches until the inbound topic has nothing pending.
    ///
    /// Deliveries left for retry stay in flight and are not seen again until
    /// the transport redelivers them.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> Result<BatchReport, BusError> {
        let mut total = BatchReport::default();
        loop {
            let report = self.poll_once().await?;
            if report.total() == 0 {
                break;
            }
            total += report;
        }
        tracing::debug!(
            acknowledged = total.acknowledged,
            rejected = total.rejected,
            retried = total.retried,
            "inbound topic drained"
        );
        Ok(total)
    }

    /// Runs until `shutdown` resolves, sleeping `poll_interval` whenever the
    /// topic is empty. Bus errors are logged and polling continues.
    ///
    /// Shutdown is checked between batches, so at most the batch in progress
    /// completes after it fires.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> BatchReport {
        tokio::pin!(shutdown);
        let interval = self.handler.config().poll_interval;
        let mut total = BatchReport::default();

        tracing::info!(
            topic = %self.handler.config().inbound_topic,
            series = %self.handler.config().series_name,
            "numbering worker started"
        );

        loop {
            if shutdown.as_mut().now_or_never().is_some() {
                break;
            }

            let idle = match self.poll_once().await {
                Ok(report) => {
                    total += report;
                    report.total() == 0
                }
                Err(e) => {
                    tracing::warn!(error = %e, "poll failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    () = shutdown.as_mut() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }

        tracing::info!(
            acknowledged = total.acknowledged,
            rejected = total.rejected,
            retried = total.retried,
            "numbering worker stopped"
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::config::PipelineConfig;
    use numbering::NumberingService;
    use series_store::{InMemorySeriesStore, NewSeries};

    type TestWorker = NumberingWorker<InMemorySeriesStore, InMemoryBus>;

    async fn worker(batch_size: usize) -> (TestWorker, InMemoryBus) {
        let store = InMemorySeriesStore::new();
        store
            .create_series(NewSeries::new("1", "invoice"))
            .await
            .unwrap();
        let bus = InMemoryBus::new();
        let config = PipelineConfig {
            batch_size,
            ..PipelineConfig::default()
        };
        let handler = NumberingHandler::new(NumberingService::new(store), bus.clone(), config);
        (NumberingWorker::new(handler), bus)
    }

    fn prepared(id: &str) -> Vec<u8> {
        format!(r#"{{"ID":"{id}","Type":"invoice","Amount":10,"Currency":"EUR"}}"#).into_bytes()
    }

    #[tokio::test]
    async fn test_drain_processes_every_batch() {
        let (worker, bus) = worker(3).await;
        for i in 0..10 {
            bus.publish("document-prepared", prepared(&format!("doc-{i}")))
                .await
                .unwrap();
        }

        let report = worker.drain().await.unwrap();
        assert_eq!(report.acknowledged, 10);
        assert_eq!(bus.pending_count("document-prepared").await, 0);
        assert_eq!(bus.published("invoice-created").await.len(), 10);
    }

    #[tokio::test]
    async fn test_poll_once_on_empty_topic() {
        let (worker, _) = worker(4).await;
        assert_eq!(worker.poll_once().await.unwrap(), BatchReport::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (worker, bus) = worker(4).await;
        bus.publish("document-prepared", prepared("docA"))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn({
            let worker = worker.clone();
            async move {
                worker
                    .run(async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        while bus.acked_count().await < 1 {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();

        let report = running.await.unwrap();
        assert_eq!(report.acknowledged, 1);
    }

    #[tokio::test]
    async fn test_run_stops_between_batches_under_load() {
        let (worker, bus) = worker(1).await;
        for i in 0..500 {
            bus.publish("document-prepared", prepared(&format!("doc-{i}")))
                .await
                .unwrap();
        }

        let report = worker.run(std::future::ready(())).await;
        assert!(report.total() <= 1);
        assert!(bus.pending_count("document-prepared").await >= 499);
    }
}
