//! Startup failures that end the process

use std::fmt;
use std::process::ExitCode;

use crate::config::ConfigError;
use crate::publisher::{ConnectError, TlsError};

pub const EXIT_CONNECT: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_TLS: u8 = 3;

/// Errors that abort the agent before the scheduler starts
#[derive(Debug)]
pub enum AgentError {
    /// Required configuration is missing or invalid
    Config(ConfigError),

    /// The TLS trust bundle could not be loaded
    Tls(TlsError),

    /// The broker session could not be established
    Connect(ConnectError),
}

impl AgentError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AgentError::Config(_) => EXIT_CONFIG,
            AgentError::Tls(_) => EXIT_TLS,
            AgentError::Connect(_) => EXIT_CONNECT,
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Config(err) => write!(f, "configuration error: {err}"),
            AgentError::Tls(err) => write!(f, "TLS setup failed: {err}"),
            AgentError::Connect(err) => write!(f, "broker connection failed: {err}"),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Config(err) => Some(err),
            AgentError::Tls(err) => Some(err),
            AgentError::Connect(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Config(err)
    }
}

impl From<TlsError> for AgentError {
    fn from(err: TlsError) -> Self {
        AgentError::Tls(err)
    }
}

impl From<ConnectError> for AgentError {
    fn from(err: ConnectError) -> Self {
        AgentError::Connect(err)
    }
}

impl From<&AgentError> for ExitCode {
    fn from(err: &AgentError) -> Self {
        ExitCode::from(err.exit_code())
    }
}
