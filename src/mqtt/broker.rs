use async_trait::async_trait;
use thiserror::Error;

/// Status code of a disconnect the broker asked for
pub const DISCONNECT_CLEAN: u8 = 0;
/// Status code of a connection lost through an error
pub const DISCONNECT_ERROR: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Broker refused the connection: {0}")]
    Refused(String),
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("No broker session")]
    Closed,
}

/// Notifications delivered from the broker client's own event loop
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    Disconnected { code: u8 },
}

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Returns once the broker acknowledged the handshake
    async fn connect(&self) -> Result<(), BrokerError>;
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError>;
    async fn disconnect(&self) -> Result<(), BrokerError>;
}
