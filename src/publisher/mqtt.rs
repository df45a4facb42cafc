//! MQTT over TLS publisher
//!
//! ## Session lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ConnAck──▶ Connected
//!                                  ▲                      │
//!                                  └──── link lost ───────┤
//!                                                         │ disconnect()
//!                                                         ▼
//! Disconnected ◀──── flushed or grace elapsed ──── Disconnecting
//! ```
//!
//! `connect` drives the rumqttc event loop until the broker acknowledges the
//! session or the connect timeout elapses. Afterwards a background task keeps
//! polling the event loop, which is what actually writes queued publishes to
//! the socket and reconnects after a dropped link.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls::ClientConfig;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

use super::{ConnectError, ConnectionState, PublishError, Publisher, SharedState};

/// Capacity of the request queue between client handle and event loop
const REQUEST_CAPACITY: usize = 10;

/// Pause between event loop polls after a connection error
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Everything needed to open the broker session
#[derive(Clone)]
pub struct ConnectSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub tls: Arc<ClientConfig>,
}

impl ConnectSettings {
    pub fn address(&self) -> String {
        format!("mqtts://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectSettings")
            .field("address", &self.address())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// [`Publisher`] backed by a single rumqttc session
pub struct MqttPublisher {
    client: AsyncClient,
    client_id: String,
    state: Arc<SharedState>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("client_id", &self.client_id)
            .field("state", &self.state.get())
            .finish()
    }
}

impl MqttPublisher {
    /// Opens the session and waits for the broker's acknowledgement.
    ///
    /// Fails if the broker does not acknowledge within
    /// `settings.connect_timeout`, refuses the login, or the TLS handshake
    /// fails.
    #[instrument(skip_all, fields(client_id = %settings.client_id))]
    pub async fn connect(settings: ConnectSettings) -> Result<Self, ConnectError> {
        info!("agent {} connecting to {}", settings.client_id, settings.address());

        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options
            .set_credentials(&settings.username, &settings.password)
            .set_keep_alive(settings.keep_alive)
            .set_clean_session(true)
            .set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::clone(&settings.tls),
            )));

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let state = Arc::new(SharedState::new(ConnectionState::Connecting));

        match timeout(settings.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                state.set(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                state.set(ConnectionState::Disconnected);
                return Err(ConnectError::Timeout(settings.connect_timeout));
            }
        }

        state.set(ConnectionState::Connected);
        info!("connected to {}", settings.address());

        let driver = tokio::spawn(drive(eventloop, Arc::clone(&state)));

        Ok(Self {
            client,
            client_id: settings.client_id,
            state,
            driver: Mutex::new(Some(driver)),
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(ConnectError::Refused(format!("{code:?}"))),
                };
            }
            Ok(event) => trace!("event before connack: {event:?}"),
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectError::Refused(format!("{code:?}")));
            }
            Err(e) => return Err(ConnectError::Transport(e)),
        }
    }
}

/// Polls the event loop until the disconnect has been written or every
/// client handle is gone.
async fn drive(mut eventloop: EventLoop, state: Arc<SharedState>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if state.transition(ConnectionState::Connecting, ConnectionState::Connected) {
                    info!("reconnected to broker");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent to broker");
                break;
            }
            Ok(event) => trace!("mqtt event: {event:?}"),
            Err(ConnectionError::RequestsDone) => {
                debug!("all client handles dropped");
                break;
            }
            Err(e) => {
                if matches!(
                    state.get(),
                    ConnectionState::Disconnecting | ConnectionState::Disconnected
                ) {
                    debug!("connection closed during shutdown: {e}");
                    break;
                }
                if state.transition(ConnectionState::Connected, ConnectionState::Connecting) {
                    warn!("connection to broker lost: {e}");
                } else {
                    debug!("reconnect failed: {e}");
                }
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let state = self.state.get();
        if state != ConnectionState::Connected {
            return Err(PublishError::NotConnected(state));
        }

        // try_publish never waits on a stalled event loop
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn disconnect(&self, grace: Duration) -> Result<(), PublishError> {
        let claimed = self
            .state
            .transition(ConnectionState::Connected, ConnectionState::Disconnecting)
            || self
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Disconnecting);
        if !claimed {
            debug!("disconnect requested while {}, nothing to do", self.state.get());
            return Ok(());
        }

        let mut driver = self.driver.lock().await.take();

        let flushed = timeout(grace, async {
            self.client
                .disconnect()
                .await
                .map_err(|e| PublishError::Rejected(e.to_string()))?;
            if let Some(handle) = driver.as_mut() {
                let _ = handle.await;
            }
            Ok::<_, PublishError>(())
        })
        .await;

        self.state.set(ConnectionState::Disconnected);

        let result = match flushed {
            Ok(Ok(())) => {
                info!("disconnected from broker");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("disconnect did not complete within {grace:?}, closing anyway");
                Ok(())
            }
        };

        if let Some(handle) = driver {
            handle.abort();
        }

        result
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}
