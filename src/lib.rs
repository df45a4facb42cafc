pub mod actors;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metric;
pub mod pipeline;
pub mod publisher;
pub mod source;
pub mod util;

/// Cumulative traffic of one interface for a single reporting period.
///
/// Produced fresh on every tick by a [`source::TrafficSource`] and discarded
/// once the derived metric has been computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSample {
    /// Received counter
    pub rx: u64,
    /// Transmitted counter
    pub tx: u64,
}

impl TrafficSample {
    pub fn new(rx: u64, tx: u64) -> Self {
        Self { rx, tx }
    }
}
