//! Ingestion: keeps the per-space indexes consistent with storage
//!
//! Full walks run on demand through [`IngestionPipeline::index_space`].
//! Incremental changes arrive as [`LifecycleEvent`]s on an in-process
//! channel, fed by the HTTP surface and optionally by a NATS subject, and
//! are applied by a single [`EventConsumer`] task.

mod config;
mod consumer;
mod error;
mod events;
mod extractor;
mod nats;
mod pipeline;

pub use config::{EventsConfig, IngestionConfig};
pub use consumer::{event_channel, EventConsumer, EventSender};
pub use error::{IngestError, IngestResult};
pub use events::{EventEnvelope, EventMetadata, LifecycleEvent};
pub use extractor::{BasicExtractor, Extractor, PlainTextExtractor};
pub use nats::{decode_event, NatsEventBridge};
pub use pipeline::{IndexSpaceReport, IngestionPipeline};
