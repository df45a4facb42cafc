//! One collection-and-publish tick
//!
//! ```text
//! TrafficSource::sample → metric::extract → metric::format_payload → Publisher::publish
//! ```
//!
//! Any failure abandons the current tick only. Nothing is carried over to the
//! next one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, trace};

use crate::TrafficSample;
use crate::actors::scheduler::Job;
use crate::config::{Granularity, SourceConfig};
use crate::metric::{Unit, extract, format_payload};
use crate::publisher::{PublishError, Publisher};
use crate::source::{SourceError, TrafficSource};

#[derive(Debug)]
pub enum TickError {
    /// Counters could not be collected, nothing was published
    Source(SourceError),

    /// The metric was computed but could not be handed to the broker
    Publish(PublishError),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Source(err) => write!(f, "collection failed: {err}"),
            TickError::Publish(err) => write!(f, "publish failed: {err}"),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TickError::Source(err) => Some(err),
            TickError::Publish(err) => Some(err),
        }
    }
}

impl From<SourceError> for TickError {
    fn from(err: SourceError) -> Self {
        TickError::Source(err)
    }
}

impl From<PublishError> for TickError {
    fn from(err: PublishError) -> Self {
        TickError::Publish(err)
    }
}

/// What a successful tick delivered
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: TrafficSample,
    pub value: f64,
    pub payload: String,
}

pub struct Pipeline {
    source: Arc<dyn TrafficSource>,
    publisher: Arc<dyn Publisher>,
    interface: String,
    granularity: Granularity,
    unit: Unit,
    topic: String,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn TrafficSource>,
        publisher: Arc<dyn Publisher>,
        config: &SourceConfig,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            source,
            publisher,
            interface: config.interface.clone(),
            granularity: config.granularity,
            unit: config.unit,
            topic: topic.into(),
        }
    }

    #[instrument(skip(self), fields(interface = %self.interface, topic = %self.topic))]
    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        let sample = match self.source.sample(&self.interface, self.granularity).await {
            Ok(sample) => sample,
            Err(e) => {
                error!("collection failed, interface: {}: {e}", self.interface);
                return Err(e.into());
            }
        };
        trace!("sampled rx={} tx={}", sample.rx, sample.tx);

        let value = extract(&sample, self.unit);
        let payload = format_payload(value);

        if let Err(e) = self.publisher.publish(&self.topic, &payload).await {
            error!("publish failed, topic: {}, payload: {payload}: {e}", self.topic);
            return Err(e.into());
        }
        info!("publish success, topic: {}, payload: {payload}", self.topic);

        Ok(TickReport {
            sample,
            value,
            payload,
        })
    }
}

#[async_trait]
impl Job for Pipeline {
    async fn run(&self) -> anyhow::Result<()> {
        self.run_tick().await?;
        Ok(())
    }
}
