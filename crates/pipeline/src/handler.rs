//! Per-message handling: decode, number, publish, acknowledge.

use common::{FiscalNumber, SeriesId};
use numbering::{NumberingError, NumberingService};
use series_store::SeriesStore;
use tokio::sync::OnceCell;

use crate::bus::{Delivery, MessageBus};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{DeadLetter, DocumentPreparedEvent, InvoiceCreatedEvent};

/// What happened to an inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Numbered, published, and acknowledged.
    Acknowledged(FiscalNumber),
    /// Unprocessable; parked on the dead-letter topic and acknowledged.
    Rejected(String),
    /// Left unacknowledged for the transport to redeliver.
    Retry(String),
}

/// Handles `document-prepared` deliveries against one series.
pub struct NumberingHandler<S: SeriesStore, B: MessageBus> {
    numbering: NumberingService<S>,
    bus: B,
    config: PipelineConfig,
    series_id: OnceCell<SeriesId>,
}

impl<S: SeriesStore, B: MessageBus> NumberingHandler<S, B> {
    pub fn new(numbering: NumberingService<S>, bus: B, config: PipelineConfig) -> Self {
        Self {
            numbering,
            bus,
            config,
            series_id: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn numbering(&self) -> &NumberingService<S> {
        &self.numbering
    }

    /// Handles one delivery. Never panics on bad input and never
    /// acknowledges a message whose outcome is uncertain.
    #[tracing::instrument(
        skip_all,
        fields(sequence = delivery.sequence, redeliveries = delivery.redeliveries)
    )]
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        metrics::counter!("pipeline_messages_received_total").increment(1);

        let prepared = match DocumentPreparedEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => return self.reject(delivery, e.to_string()).await,
        };

        match self.number_and_publish(&prepared).await {
            Ok(fiscal_number) => match self.bus.ack(delivery).await {
                Ok(()) => {
                    metrics::counter!("pipeline_messages_acknowledged_total").increment(1);
                    tracing::info!(
                        document_id = %prepared.id,
                        %fiscal_number,
                        "invoice created"
                    );
                    Disposition::Acknowledged(fiscal_number)
                }
                Err(e) => self.retry(&prepared, PipelineError::Bus(e)),
            },
            Err(PipelineError::Numbering(NumberingError::EmptyDocumentId)) => {
                self.reject(delivery, NumberingError::EmptyDocumentId.to_string())
                    .await
            }
            Err(PipelineError::Numbering(e @ NumberingError::SeriesExhausted(_))) => {
                tracing::error!(
                    document_id = %prepared.id,
                    error = %e,
                    "numbering series has no values left; parking message"
                );
                self.reject(delivery, e.to_string()).await
            }
            Err(e) => self.retry(&prepared, e),
        }
    }

    async fn number_and_publish(&self, prepared: &DocumentPreparedEvent) -> Result<FiscalNumber> {
        let series_id = self.series_id().await?;
        let assignment = self
            .numbering
            .assign_fiscal_number(series_id, &prepared.document_id())
            .await?;

        let created = InvoiceCreatedEvent::from_prepared(prepared, assignment.fiscal_number);
        let payload = created.encode().map_err(PipelineError::Encode)?;
        self.bus
            .publish(&self.config.outbound_topic, payload)
            .await?;

        Ok(assignment.fiscal_number)
    }

    async fn series_id(&self) -> Result<SeriesId> {
        let id = self
            .series_id
            .get_or_try_init(|| self.numbering.resolve_series(&self.config.series_name))
            .await?;
        Ok(*id)
    }

    fn retry(&self, prepared: &DocumentPreparedEvent, err: PipelineError) -> Disposition {
        metrics::counter!("pipeline_messages_retried_total").increment(1);
        match &err {
            PipelineError::Numbering(NumberingError::SeriesNotFound(series)) => {
                tracing::error!(
                    document_id = %prepared.id,
                    series = %series,
                    "numbering series is not seeded; message held for redelivery"
                );
            }
            PipelineError::Numbering(e) if e.is_transient() => {
                tracing::warn!(
                    document_id = %prepared.id,
                    error = %e,
                    unknown_outcome = e.is_unknown_outcome(),
                    "transient numbering failure, leaving message unacknowledged"
                );
            }
            _ => {
                tracing::error!(
                    document_id = %prepared.id,
                    error = %err,
                    "message processing failed, leaving message unacknowledged"
                );
            }
        }
        Disposition::Retry(err.to_string())
    }

    async fn reject(&self, delivery: &Delivery, reason: String) -> Disposition {
        tracing::warn!(%reason, "rejecting message to dead-letter topic");

        let dead_letter = DeadLetter {
            source_topic: delivery.topic.clone(),
            sequence: delivery.sequence,
            reason: reason.clone(),
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
        };

        let parked = match dead_letter.encode() {
            Ok(payload) => self
                .bus
                .publish(&self.config.dead_letter_topic, payload)
                .await
                .map_err(PipelineError::Bus),
            Err(e) => Err(PipelineError::Encode(e)),
        };
        if let Err(e) = parked {
            tracing::error!(
                error = %e,
                "dead-letter publish failed, leaving message unacknowledged"
            );
            metrics::counter!("pipeline_messages_retried_total").increment(1);
            return Disposition::Retry(e.to_string());
        }

        if let Err(e) = self.bus.ack(delivery).await {
            tracing::warn!(error = %e, "ack after dead-letter failed");
            metrics::counter!("pipeline_messages_retried_total").increment(1);
            return Disposition::Retry(e.to_string());
        }

        metrics::counter!("pipeline_messages_rejected_total").increment(1);
        Disposition::Rejected(reason)
    }
}
