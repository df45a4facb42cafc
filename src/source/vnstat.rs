//! vnStat adapter
//!
//! Runs `vnstat -i <interface> --json <mode> 1` and reads the first entry of
//! the requested series from the JSON document. The output is treated as
//! untrusted: missing interfaces or an empty series are reported as
//! [`SourceError::MalformedOutput`] instead of being indexed blindly.
//!
//! Only the selected entry has to be well formed. Everything else in the
//! document is either ignored or read leniently, so a vnStat release that
//! changes an unrelated field does not break collection.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::{SourceError, TrafficSource};
use crate::TrafficSample;
use crate::config::Granularity;

/// Reads an optional field, treating values of the wrong shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Top level of `vnstat --json` output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VnstatReport {
    #[serde(deserialize_with = "lenient")]
    pub jsonversion: Option<String>,
    pub interfaces: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterfaceReport {
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub updated: Option<Stamp>,
    /// Series keyed by name (`fiveminute`, `hour`, `day`, `month`, `year`)
    pub traffic: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stamp {
    pub date: EntryDate,
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<EntryTime>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EntryDate {
    pub year: i32,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EntryTime {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

/// One bucket of a traffic series
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficEntry {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<EntryDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<EntryTime>,
    pub rx: u64,
    pub tx: u64,
}

impl TrafficEntry {
    /// First day of the bucket, when the provider reported a valid date.
    pub fn period_start(&self) -> Option<NaiveDate> {
        let date = self.date?;
        NaiveDate::from_ymd_opt(date.year, date.month.unwrap_or(1), date.day.unwrap_or(1))
    }
}

impl InterfaceReport {
    /// First entry of the series for `granularity`, if there is one.
    pub fn first_entry(&self, granularity: Granularity) -> Option<&Value> {
        self.traffic.get(granularity.series())?.as_array()?.first()
    }
}

fn malformed(context: &str, e: serde_json::Error) -> SourceError {
    SourceError::MalformedOutput(format!("{context}: {e}"))
}

/// Extracts the sample for `granularity` from raw provider output.
///
/// Only the first interface and the first entry of the selected series are
/// consulted.
pub fn parse_report(output: &[u8], granularity: Granularity) -> Result<TrafficSample, SourceError> {
    let report: VnstatReport =
        serde_json::from_slice(output).map_err(|e| malformed("invalid JSON", e))?;
    if let Some(version) = &report.jsonversion {
        trace!("vnstat json version {version}");
    }

    let interface = report
        .interfaces
        .first()
        .ok_or_else(|| SourceError::MalformedOutput("no interfaces in report".to_string()))?;
    let interface =
        InterfaceReport::deserialize(interface).map_err(|e| malformed("invalid interface", e))?;
    let name = interface.name.as_deref().unwrap_or("?");

    if let Some(updated) = &interface.updated {
        trace!("interface '{name}' last updated in {}", updated.date.year);
    }

    let entry = interface.first_entry(granularity).ok_or_else(|| {
        SourceError::MalformedOutput(format!("no {granularity} entries for interface '{name}'"))
    })?;
    let entry = TrafficEntry::deserialize(entry)
        .map_err(|e| malformed(&format!("invalid {granularity} entry"), e))?;

    if let Some(start) = entry.period_start() {
        trace!("using {granularity} entry starting {start}");
    }

    Ok(TrafficSample::new(entry.rx, entry.tx))
}

/// [`TrafficSource`] backed by the `vnstat` command line tool.
#[derive(Debug, Clone)]
pub struct VnstatSource {
    binary: PathBuf,
}

impl VnstatSource {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn invoke(&self, interface: &str, granularity: Granularity) -> Result<Vec<u8>, SourceError> {
        let output = Command::new(&self.binary)
            .args(["-i", interface, "--json", granularity.flag(), "1"])
            .output()
            .await
            .map_err(|e| {
                SourceError::Unavailable(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Unavailable(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl TrafficSource for VnstatSource {
    #[instrument(skip(self), fields(binary = %self.binary.display()))]
    async fn sample(
        &self,
        interface: &str,
        granularity: Granularity,
    ) -> Result<TrafficSample, SourceError> {
        let output = self.invoke(interface, granularity).await?;
        debug!("vnstat returned {} bytes", output.len());
        parse_report(&output, granularity)
    }
}
