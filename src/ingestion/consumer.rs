//! Event bus and the task consuming it

use crate::ingestion::error::{IngestError, IngestResult};
use crate::ingestion::events::LifecycleEvent;
use crate::ingestion::pipeline::IngestionPipeline;
use crate::metrics::SEARCH_METRICS;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Sending half of the lifecycle event bus
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::Sender<LifecycleEvent>,
}

impl EventSender {
    /// Queue an event, waiting while the bus is full
    pub async fn send(&self, event: LifecycleEvent) -> IngestResult<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| IngestError::ChannelClosed)
    }
}

/// Create a bounded event bus
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<LifecycleEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (EventSender { sender }, receiver)
}

/// Applies lifecycle events to the index, one at a time, until cancelled
pub struct EventConsumer {
    pipeline: Arc<IngestionPipeline>,
    receiver: mpsc::Receiver<LifecycleEvent>,
    cancel: CancellationToken,
}

impl EventConsumer {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        receiver: mpsc::Receiver<LifecycleEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            receiver,
            cancel,
        }
    }

    /// Consume until the token is cancelled or every sender is dropped;
    /// returns the number of events handled
    pub async fn run(mut self) -> usize {
        info!("Event consumer started");
        let mut handled = 0usize;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            self.handle(&event).await;
            handled += 1;
        }

        info!(handled, "Event consumer stopped");
        handled
    }

    async fn handle(&self, event: &LifecycleEvent) {
        let event_type = event.event_type();

        match self.pipeline.apply(event).await {
            Ok(Some(report)) => {
                SEARCH_METRICS
                    .events
                    .with_label_values(&[event_type, "applied"])
                    .inc();
                debug!(
                    event = event_type,
                    space = %event.space_id(),
                    indexed = report.indexed,
                    removed = report.removed,
                    "Event applied"
                );
            }
            Ok(None) => {
                SEARCH_METRICS
                    .events
                    .with_label_values(&[event_type, "ignored"])
                    .inc();
                debug!(event = event_type, space = %event.space_id(), "Event needs no index change");
            }
            Err(e) => {
                SEARCH_METRICS
                    .events
                    .with_label_values(&[event_type, "failed"])
                    .inc();
                error!(event = event_type, space = %event.space_id(), error = %e, "Event handling failed");
            }
        }
    }
}
