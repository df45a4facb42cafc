use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::trace;

use crate::metric::Unit;
use crate::util::{
    DEFAULT_MQTT_HOST, DEFAULT_MQTT_PORT, MQTT_HOST, MQTT_PASSWORD, MQTT_PORT, MQTT_SSL_PATH,
    MQTT_TOPIC, MQTT_USER, VNSTAT_INTERFACE, VNSTAT_JSON_MODE, VNSTAT_PATH, VNSTAT_UNIT,
    env_lookup,
};

/// Time bucket the provider reports traffic in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    FiveMinute,
    Hour,
    Day,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// Mode flag passed to `vnstat --json`.
    pub fn flag(self) -> &'static str {
        match self {
            Granularity::FiveMinute => "f",
            Granularity::Hour => "h",
            Granularity::Day => "d",
            Granularity::Month => "m",
            Granularity::Year => "y",
        }
    }

    /// Name of the series in the provider's JSON document.
    pub fn series(self) -> &'static str {
        match self {
            Granularity::FiveMinute => "fiveminute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.series())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "f" | "fiveminute" => Ok(Granularity::FiveMinute),
            "h" | "hour" => Ok(Granularity::Hour),
            "d" | "day" => Ok(Granularity::Day),
            "m" | "month" => Ok(Granularity::Month),
            "y" | "year" => Ok(Granularity::Year),
            other => Err(format!(
                "unknown granularity '{other}' (expected one of f, h, d, m, y)"
            )),
        }
    }
}

/// Broker address and login.
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: String,
    pub password: String,
    /// PEM bundle that replaces the system trust store
    pub ca_path: Option<PathBuf>,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ca_path", &self.ca_path)
            .finish()
    }
}

/// Where and how traffic counters are read.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub vnstat_path: PathBuf,
    pub interface: String,
    pub granularity: Granularity,
    pub unit: Unit,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub source: SourceConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    Missing(&'static str),

    /// A variable is set to a value that cannot be used
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(variable) => {
                write!(f, "{variable} environment required.")
            }
            ConfigError::Invalid {
                variable,
                value,
                reason,
            } => write!(f, "invalid value '{value}' for {variable}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. Required variables are checked in
    /// a fixed order so the first missing one is always the one reported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let vnstat_path = require(VNSTAT_PATH)?;
        let topic = require(MQTT_TOPIC)?;
        let username = require(MQTT_USER)?;
        let password = require(MQTT_PASSWORD)?;
        let ca_path = require(MQTT_SSL_PATH)?;

        let granularity = match get(VNSTAT_JSON_MODE) {
            Some(value) => value.parse::<Granularity>().map_err(|reason| ConfigError::Invalid {
                variable: VNSTAT_JSON_MODE,
                value,
                reason,
            })?,
            None => Granularity::default(),
        };

        let interface = require(VNSTAT_INTERFACE)?;

        let unit = match get(VNSTAT_UNIT) {
            Some(value) => value.parse::<Unit>().map_err(|e| {
                ConfigError::Invalid {
                    variable: VNSTAT_UNIT,
                    reason: e.to_string(),
                    value,
                }
            })?,
            None => Unit::default(),
        };

        let host = get(MQTT_HOST).unwrap_or_else(|| DEFAULT_MQTT_HOST.to_string());
        let port = match get(MQTT_PORT) {
            Some(value) => value.parse::<u16>().map_err(|e| {
                ConfigError::Invalid {
                    variable: MQTT_PORT,
                    reason: e.to_string(),
                    value,
                }
            })?,
            None => DEFAULT_MQTT_PORT,
        };

        let config = AgentConfig {
            source: SourceConfig {
                vnstat_path: PathBuf::from(vnstat_path),
                interface,
                granularity,
                unit,
            },
            broker: BrokerConfig {
                host,
                port,
                topic,
                username,
                password,
                ca_path: Some(PathBuf::from(ca_path)),
            },
        };
        trace!("loaded config: {config:?}");

        Ok(config)
    }
}
