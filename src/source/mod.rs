//! Traffic counter sources
//!
//! A source produces one [`TrafficSample`] per call. The agent only ever
//! talks to the [`TrafficSource`] trait, the vnStat adapter is the production
//! implementation.

use std::fmt;

use async_trait::async_trait;

use crate::TrafficSample;
use crate::config::Granularity;

pub mod vnstat;

pub use vnstat::VnstatSource;

/// Errors that abandon a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The provider could not be launched or exited unsuccessfully
    Unavailable(String),

    /// The provider ran but its output does not contain the requested period
    MalformedOutput(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "traffic source unavailable: {msg}"),
            SourceError::MalformedOutput(msg) => {
                write!(f, "malformed traffic source output: {msg}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Counters for the most recent period of `granularity` on `interface`.
    async fn sample(
        &self,
        interface: &str,
        granularity: Granularity,
    ) -> Result<TrafficSample, SourceError>;
}
