use async_trait::async_trait;
use thiserror::Error;

use crate::registers::FunctionCode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Timeout waiting for the meter")]
    Timeout,
    #[error("Serial I/O error: {0}")]
    Io(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Meter answered with exception code {0}")]
    Exception(u8),
}

/// One bus master talking to one slave, requests never interleave
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` consecutive 16 bit words starting at `address`
    async fn read_words(&mut self, address: u16, count: u16, function: FunctionCode) -> Result<Vec<u16>, TransportError>;
}

