//! Publish channel
//!
//! The agent delivers each derived metric through a [`Publisher`]. One
//! publisher instance exists per process; it is shared between the scheduled
//! tick and the shutdown listener as an `Arc<dyn Publisher>`, so all state
//! changes go through the trait methods.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;

pub mod mqtt;
pub mod tls;

pub use mqtt::{ConnectSettings, MqttPublisher};
pub use tls::{TlsError, TlsTrust};

/// Lifecycle of the broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// [`ConnectionState`] shared between the client and its event loop task
#[derive(Debug)]
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves from `from` to `to`, returning false if the current state was
    /// something else.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[derive(Debug)]
pub enum ConnectError {
    /// No acknowledgement from the broker within the connect timeout
    Timeout(Duration),

    /// The broker answered but refused the session (bad credentials etc.)
    Refused(String),

    /// Network or TLS failure while establishing the session
    Transport(rumqttc::ConnectionError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Timeout(timeout) => {
                write!(f, "broker did not acknowledge connect within {timeout:?}")
            }
            ConnectError::Refused(reason) => write!(f, "broker refused connection: {reason}"),
            ConnectError::Transport(err) => write!(f, "failed to connect to broker: {err}"),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The session is not in the connected state
    NotConnected(ConnectionState),

    /// The client refused to queue the message
    Rejected(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::NotConnected(state) => write!(f, "not connected (state: {state})"),
            PublishError::Rejected(reason) => write!(f, "publish rejected: {reason}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Delivery of string payloads to a named topic
///
/// Implementations must tolerate `publish` and `disconnect` being called
/// concurrently from different tasks, and `disconnect` being called more than
/// once.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Fire-and-forget delivery at the lowest guarantee level.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Announces a clean disconnect and waits at most `grace` for queued
    /// messages to flush.
    async fn disconnect(&self, grace: Duration) -> Result<(), PublishError>;

    fn state(&self) -> ConnectionState;
}
