pub mod broker;
#[cfg(feature = "mqtt")]
pub mod client;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::metering_modbus::MeasurementSet;
use crate::models::MeasurementId;
pub use broker::{Broker, BrokerError, BrokerEvent, DISCONNECT_CLEAN, DISCONNECT_ERROR};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Another connection attempt is in progress")]
    ConnectInProgress,
    #[error("Connecting to the broker failed: {0}")]
    BrokerConnect(String),
    #[error("Publishing to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("Broker unavailable after {attempts} connection attempts")]
    PublishUnavailable { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub base_topic: String,
    pub retry_count: u32,
    pub backoff: Duration,
    pub connect_timeout: Duration,
}

impl From<&MqttConfig> for ChannelSettings {
    fn from(config: &MqttConfig) -> Self {
        return ChannelSettings {
            base_topic: config.base_topic.clone(),
            retry_count: config.retry_count,
            backoff: Duration::from_secs(config.backoff_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        };
    }
}

/// Outcome of publishing one measurement set
#[derive(Debug, Default)]
pub struct PublishReport {
    pub published: usize,
    pub failed: Vec<(MeasurementId, PublishError)>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        return self.failed.is_empty();
    }
}

struct ChannelState {
    connection: ConnectionState,
    failed_attempts: u32,
    closed: bool,
}

/* Armed while a connect is awaited. A caller dropping that future
 * must not leave the channel stuck in Connecting. */
struct ConnectAttempt<'a> {
    state: &'a Mutex<ChannelState>,
    finished: bool,
}

impl ConnectAttempt<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.connection == ConnectionState::Connecting {
            warn!("Connection attempt abandoned");
            state.connection = ConnectionState::Failed;
        }
    }
}

/// Connection to the broker plus the state machine keeping it alive
pub struct PublishChannel<B: Broker> {
    broker: Arc<B>,
    settings: Arc<ChannelSettings>,
    state: Arc<Mutex<ChannelState>>,
}

impl<B: Broker> Clone for PublishChannel<B> {
    fn clone(&self) -> Self {
        return PublishChannel {
            broker: self.broker.clone(),
            settings: self.settings.clone(),
            state: self.state.clone(),
        };
    }
}

pub fn format_payload(value: f64) -> String {
    /* Debug keeps the decimal point on whole numbers, "230.0" instead of "230" */
    return format!("{:?}", value);
}

impl<B: Broker> PublishChannel<B> {
    pub fn new(broker: B, settings: ChannelSettings) -> Self {
        return PublishChannel {
            broker: Arc::new(broker),
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(ChannelState {
                connection: ConnectionState::Disconnected,
                failed_attempts: 0,
                closed: false,
            })),
        };
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        return self.state.lock().unwrap_or_else(|e| e.into_inner());
    }

    pub fn broker(&self) -> &B {
        return &self.broker;
    }

    pub fn state(&self) -> ConnectionState {
        return self.lock().connection;
    }

    pub fn failed_attempts(&self) -> u32 {
        return self.lock().failed_attempts;
    }

    pub fn topic_for(&self, id: MeasurementId) -> String {
        return format!("{}/{}", self.settings.base_topic, id.name());
    }

    /// One synchronous connection attempt unless already connected
    pub async fn ensure_connected(&self) -> Result<(), PublishError> {
        {
            let mut state = self.lock();
            match state.connection {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => return Err(PublishError::ConnectInProgress),
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    state.connection = ConnectionState::Connecting;
                    state.closed = false;
                }
            }
        }

        let attempt = ConnectAttempt { state: &*self.state, finished: false };
        debug!("Connecting to broker, timeout {:?}", self.settings.connect_timeout);
        let result = match tokio::time::timeout(self.settings.connect_timeout, self.broker.connect()).await {
            Ok(r) => r,
            Err(_) => Err(BrokerError::Connect(format!("no acknowledgement within {:?}", self.settings.connect_timeout))),
        };
        attempt.finish();

        let mut state = self.lock();
        match result {
            Ok(()) => {
                info!("Connected to MQTT Broker");
                state.connection = ConnectionState::Connected;
                state.failed_attempts = 0;
                return Ok(());
            }
            Err(e) => {
                state.failed_attempts += 1;
                let retry_count = std::cmp::max(self.settings.retry_count, 1);
                if state.failed_attempts >= retry_count {
                    let attempts = state.failed_attempts;
                    state.failed_attempts = 0;
                    state.connection = ConnectionState::Disconnected;
                    error!("Giving up on the broker after {} attempts, last error: {}", attempts, e);
                    return Err(PublishError::PublishUnavailable { attempts });
                }

                warn!("Broker connection attempt {}/{} failed: {}", state.failed_attempts, retry_count, e);
                state.connection = ConnectionState::Failed;
                return Err(PublishError::BrokerConnect(e.to_string()));
            }
        }
    }

    async fn send(&self, id: MeasurementId, value: f64) -> Result<(), PublishError> {
        let topic = self.topic_for(id);
        match self.broker.publish(&topic, format_payload(value)).await {
            Ok(()) => {
                debug!("Published {} = {}", topic, value);
                return Ok(());
            }
            Err(e) => {
                let mut state = self.lock();
                if state.connection == ConnectionState::Connected {
                    state.connection = ConnectionState::Disconnected;
                }
                return Err(PublishError::Publish { topic, reason: e.to_string() });
            }
        }
    }

    pub async fn publish(&self, id: MeasurementId, value: f64) -> Result<(), PublishError> {
        if self.state() != ConnectionState::Connected {
            self.ensure_connected().await?;
        }
        return self.send(id, value).await;
    }

    /// Publish every entry, one failing topic never stops the rest
    pub async fn publish_set(&self, set: &MeasurementSet) -> PublishReport {
        let mut report = PublishReport::default();

        if self.state() != ConnectionState::Connected {
            if let Err(e) = self.ensure_connected().await {
                warn!("Dropping {} values of this cycle: {}", set.len(), e);
                report.failed = set.iter().map(|(id, _)| (id, e.clone())).collect();
                return report;
            }
        }

        for (id, value) in set.iter() {
            match self.send(id, value).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    warn!("{}", e);
                    report.failed.push((id, e));
                }
            }
        }

        return report;
    }

    /// Called from the broker's event loop, must not block
    pub fn handle_event(&self, event: BrokerEvent) -> Option<JoinHandle<()>> {
        let code = match event {
            BrokerEvent::Connected => {
                let mut state = self.lock();
                state.connection = ConnectionState::Connected;
                state.failed_attempts = 0;
                return None;
            }
            BrokerEvent::Disconnected { code } => code,
        };

        {
            let mut state = self.lock();
            if state.closed {
                return None;
            }
            if state.connection != ConnectionState::Connected {
                debug!("Ignoring disconnect with code {} while {:?}", code, state.connection);
                return None;
            }
            state.connection = ConnectionState::Disconnected;
        }

        let delay = if code == DISCONNECT_CLEAN {
            info!("Broker disconnected cleanly, reconnecting");
            Duration::ZERO
        } else {
            warn!("Broker connection lost with code {}, reconnecting in {:?}", code, self.settings.backoff);
            self.settings.backoff
        };

        let channel = self.clone();
        return Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = channel.ensure_connected().await {
                warn!("Reconnect failed: {}", e);
            }
        }));
    }

    /// Feed broker notifications into the state machine
    pub fn watch_events(&self, mut events: UnboundedReceiver<BrokerEvent>) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                channel.handle_event(event);
            }
            debug!("Broker event stream ended");
        })
    }

    pub async fn shutdown(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            if state.connection != ConnectionState::Connected {
                state.connection = ConnectionState::Disconnected;
                return;
            }
            state.connection = ConnectionState::Disconnected;
        }

        if let Err(e) = self.broker.disconnect().await {
            warn!("Disconnect from broker failed: {}", e);
        }
    }
}
