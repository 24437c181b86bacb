//! NATS bridge feeding broker events into the in-process event bus

use crate::ingestion::consumer::EventSender;
use crate::ingestion::error::{IngestError, IngestResult};
use crate::ingestion::events::{EventEnvelope, LifecycleEvent};
use async_nats::Client;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Decode one broker message
pub fn decode_event(payload: &[u8]) -> IngestResult<LifecycleEvent> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)?;
    Ok(envelope.event)
}

/// Subscribes to the lifecycle subject and forwards decoded events
pub struct NatsEventBridge {
    client: Client,
    subject: String,
    sender: EventSender,
}

impl NatsEventBridge {
    pub async fn connect(url: &str, subject: impl Into<String>, sender: EventSender) -> IngestResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| IngestError::Broker(format!("NATS connection failed: {}", e)))?;

        Ok(Self {
            client,
            subject: subject.into(),
            sender,
        })
    }

    /// Forward events until cancelled, the subscription ends or the bus closes
    pub async fn run(self, cancel: CancellationToken) -> IngestResult<()> {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| IngestError::Broker(format!("NATS subscribe failed: {}", e)))?;

        info!(subject = %self.subject, "NATS event bridge subscribed");

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = subscriber.next() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match decode_event(&message.payload) {
                Ok(event) => self.sender.send(event).await?,
                Err(e) => warn!(subject = %self.subject, error = %e, "Dropping undecodable event"),
            }
        }

        info!(subject = %self.subject, "NATS event bridge stopped");
        Ok(())
    }
}
