//! Line-oriented bridges between stdio and the bus, series seeding, and
//! the shutdown hand-off for messages that could not be settled.

use std::time::Duration;

use pipeline::{BusError, DeadLetter, Delivery, InMemoryBus, MessageBus, NumberingWorker};
use series_store::{NewSeries, Series, SeriesStore, StoreError};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Errors surfaced by the service wiring.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes every non-blank line of `reader` to `topic`.
///
/// Lines are forwarded verbatim; validating them is the handler's job.
pub async fn feed_lines<R, B>(reader: R, bus: &B, topic: &str) -> Result<usize, ServiceError>
where
    R: AsyncBufRead + Unpin,
    B: MessageBus,
{
    let mut lines = reader.lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        bus.publish(topic, line.into_bytes()).await?;
        metrics::counter!("service_lines_read_total").increment(1);
        count += 1;
    }
    tracing::info!(count, topic, "input exhausted");
    Ok(count)
}

/// Drains `topic`, writing each payload as one line and acknowledging it
/// once written.
pub async fn forward_published<W, B>(
    bus: &B,
    topic: &str,
    writer: &mut W,
    batch_size: usize,
) -> Result<usize, ServiceError>
where
    W: AsyncWrite + Unpin,
    B: MessageBus,
{
    let mut count = 0;
    loop {
        let batch = bus.poll(topic, batch_size).await?;
        if batch.is_empty() {
            break;
        }
        for delivery in batch {
            writer.write_all(&delivery.payload).await?;
            writer.write_all(b"\n").await?;
            bus.ack(&delivery).await?;
            metrics::counter!("service_lines_written_total").increment(1);
            count += 1;
        }
    }
    writer.flush().await?;
    Ok(count)
}

/// Creates the named series unless it already exists.
///
/// Seeding is an operator action performed before traffic starts; the
/// numbering path itself never creates series.
pub async fn ensure_series<S: SeriesStore>(
    store: &S,
    name: &str,
    doc_type: &str,
    baseline: i64,
) -> Result<Series, ServiceError> {
    match store
        .create_series(NewSeries::new(name, doc_type).starting_at(baseline))
        .await
    {
        Ok(series) => Ok(series),
        Err(StoreError::SeriesAlreadyExists(_)) => {
            tracing::debug!(name, "series already seeded");
            Ok(store.find_series(name).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Gives deliveries still held on `topic` a bounded number of further
/// attempts, backing off between rounds.
///
/// Returns whatever is still unacknowledged afterwards. Those messages
/// exist nowhere else once the process exits.
pub async fn settle_unacked<S: SeriesStore>(
    worker: &NumberingWorker<S, InMemoryBus>,
    bus: &InMemoryBus,
    topic: &str,
    attempts: u32,
    backoff: Duration,
) -> Vec<Delivery> {
    let mut wait = backoff;
    for attempt in 1..=attempts {
        if held(bus, topic).await.is_empty() {
            break;
        }
        tokio::time::sleep(wait).await;
        wait *= 2;

        let requeued = bus.redeliver_unacked_on(topic).await;
        tracing::warn!(attempt, requeued, "retrying held messages before exit");
        if let Err(e) = worker.drain().await {
            tracing::warn!(error = %e, "drain during shutdown failed");
        }
    }
    held(bus, topic).await
}

async fn held(bus: &InMemoryBus, topic: &str) -> Vec<Delivery> {
    bus.unacked()
        .await
        .into_iter()
        .filter(|d| d.topic == topic)
        .collect()
}

/// Writes deliveries that could not be settled as dead letters, one per
/// line, so they can be replayed.
pub async fn park_stranded<W>(
    deliveries: &[Delivery],
    writer: &mut W,
) -> Result<usize, ServiceError>
where
    W: AsyncWrite + Unpin,
{
    for delivery in deliveries {
        let dead_letter = DeadLetter {
            source_topic: delivery.topic.clone(),
            sequence: delivery.sequence,
            reason: "still unacknowledged at shutdown".to_string(),
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
        };
        writer.write_all(&dead_letter.encode()?).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(deliveries.len())
}
