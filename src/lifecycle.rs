//! Startup order and shutdown protocol
//!
//! 1. Load TLS trust and connect the publisher (fatal on failure)
//! 2. Spawn the scheduler with the pipeline as its job
//! 3. Park on a oneshot until the shutdown listener fires it
//!
//! The shutdown listener waits for SIGINT/SIGTERM, disconnects the publisher
//! with a bounded grace period, stops the scheduler and only then releases
//! the main task. A tick that is in flight when the signal arrives may race
//! with the disconnect; its publish is then rejected or flushed, whichever
//! happens first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::scheduler::SchedulerHandle;
use crate::config::{AgentConfig, SourceConfig};
use crate::error::AgentError;
use crate::pipeline::Pipeline;
use crate::publisher::{ConnectSettings, MqttPublisher, Publisher, TlsTrust, tls};
use crate::source::{TrafficSource, VnstatSource};
use crate::util::{CONNECT_TIMEOUT, DISCONNECT_GRACE, KEEP_ALIVE, TICK_INTERVAL, generate_client_id};

/// Resolves on the first SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
        info!("received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Builds the TLS configuration and opens the broker session.
pub async fn connect(config: &AgentConfig) -> Result<MqttPublisher, AgentError> {
    let broker = &config.broker;
    let trust = TlsTrust::from(broker.ca_path.clone());
    let tls = tls::client_config(&trust)?;

    let settings = ConnectSettings {
        host: broker.host.clone(),
        port: broker.port,
        username: broker.username.clone(),
        password: broker.password.clone(),
        client_id: generate_client_id(),
        keep_alive: KEEP_ALIVE,
        connect_timeout: CONNECT_TIMEOUT,
        tls,
    };

    Ok(MqttPublisher::connect(settings).await?)
}

/// Runs the agent until a termination signal arrives.
pub async fn run(config: AgentConfig) -> Result<(), AgentError> {
    let publisher = connect(&config).await?;
    let source = VnstatSource::new(&config.source.vnstat_path);

    Agent::new(Arc::new(source), Arc::new(publisher), &config)
        .run_until(shutdown_signal())
        .await;

    Ok(())
}

/// Wires the scheduler, pipeline and publisher together
pub struct Agent {
    source: Arc<dyn TrafficSource>,
    publisher: Arc<dyn Publisher>,
    source_config: SourceConfig,
    topic: String,
    interval: Duration,
    disconnect_grace: Duration,
}

impl Agent {
    pub fn new(
        source: Arc<dyn TrafficSource>,
        publisher: Arc<dyn Publisher>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            source,
            publisher,
            source_config: config.source.clone(),
            topic: config.broker.topic.clone(),
            interval: TICK_INTERVAL,
            disconnect_grace: DISCONNECT_GRACE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    /// Schedules ticks until `shutdown` resolves, then disconnects.
    ///
    /// Returns once the publisher has been disconnected.
    #[instrument(skip_all, fields(interface = %self.source_config.interface))]
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pipeline = Pipeline::new(
            self.source,
            Arc::clone(&self.publisher),
            &self.source_config,
            self.topic,
        );
        let scheduler = SchedulerHandle::spawn(Arc::new(pipeline), self.interval);
        info!(
            "publishing {} {} traffic every {:?}",
            self.source_config.granularity, self.source_config.unit, self.interval
        );

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let publisher = self.publisher;
        let grace = self.disconnect_grace;
        let listener_scheduler = scheduler.clone();

        tokio::spawn(async move {
            shutdown.await;
            info!("shutting down");

            if let Err(e) = publisher.disconnect(grace).await {
                warn!("disconnect failed: {e}");
            }
            if let Err(e) = listener_scheduler.shutdown().await {
                debug!("scheduler already stopped: {e:#}");
            }

            let _ = done_tx.send(());
        });

        if done_rx.await.is_err() {
            error!("shutdown listener ended without completing shutdown");
        }
        info!("exiting");
    }
}
