use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::broker::{Broker, BrokerError, BrokerEvent, DISCONNECT_CLEAN, DISCONNECT_ERROR};
use crate::config::MqttConfig;

struct Session {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

/// rumqttc backed broker, every connect starts a fresh session
pub struct MqttBroker {
    config: MqttConfig,
    events: UnboundedSender<BrokerEvent>,
    session: Mutex<Option<Session>>,
}

impl MqttBroker {
    pub fn new(config: &MqttConfig) -> (Self, UnboundedReceiver<BrokerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        return (MqttBroker {
            config: config.clone(),
            events: tx,
            session: Mutex::new(None),
        }, rx);
    }

    fn options(&self) -> MqttOptions {
        /* Brokers kick the older session when two clients share an id */
        let client_id = format!("{}-{}", self.config.client_name, std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !self.config.user.is_empty() {
            mqttoptions.set_credentials(self.config.user.clone(), self.config.pass.clone());
        }
        return mqttoptions;
    }

    fn take_session(&self) -> Option<Session> {
        return self.session.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn client(&self) -> Option<AsyncClient> {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        return session.as_ref().map(|s| s.client.clone());
    }
}

/* Keeps the session alive and reports how it ended */
fn spawn_driver(mut eventloop: EventLoop, events: UnboundedSender<BrokerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("MQTT Eventloop started");
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("Broker closed the connection");
                    let _ = events.send(BrokerEvent::Disconnected { code: DISCONNECT_CLEAN });
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("Disconnect sent, stopping eventloop");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error in MQTT {:?}", e);
                    let _ = events.send(BrokerEvent::Disconnected { code: DISCONNECT_ERROR });
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl Broker for MqttBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        if let Some(old) = self.take_session() {
            old.driver.abort();
        }

        info!("MQTT connection to {}:{} starting up", self.config.host, self.config.port);
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BrokerError::Refused(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(_) => continue,
                Err(e) => return Err(BrokerError::Connect(e.to_string())),
            }
        }

        let driver = spawn_driver(eventloop, self.events.clone());
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(Session { client, driver });
        return Ok(());
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        let client = self.client().ok_or(BrokerError::Closed)?;
        client.publish(topic, QoS::AtLeastOnce, false, payload).await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let session = self.take_session().ok_or(BrokerError::Closed)?;
        let res = session.client.disconnect().await
            .map_err(|e| BrokerError::Publish(e.to_string()));

        /* Give the eventloop the chance to flush the disconnect */
        if tokio::time::timeout(Duration::from_secs(2), session.driver).await.is_err() {
            debug!("Eventloop did not stop in time");
        }
        return res;
    }
}
