use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use rmodbus::{client::ModbusRequest, guess_response_frame_len, ModbusProto};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use super::transport::{RegisterTransport, TransportError};
use crate::registers::FunctionCode;

/* RTU frames start with slave id, function and byte count (or exception code) */
const RTU_HEADER_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub device: String,
    pub baudrate: u32,
    pub slave_id: u8,
    pub timeout: Duration,
}

/// Modbus RTU master on a serial line, 8 data bits, even parity, 1 stop bit
pub struct RtuTransport {
    port: SerialStream,
    slave_id: u8,
    timeout: Duration,
}

impl RtuTransport {
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = tokio_serial::new(&settings.device, settings.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::Even)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(settings.timeout)
            .open_native_async()
            .map_err(|e| TransportError::Io(format!("Failed to open {}: {}", settings.device, e)))?;

        debug!("Opened {} at {} baud for slave {}", settings.device, settings.baudrate, settings.slave_id);
        return Ok(RtuTransport {
            port,
            slave_id: settings.slave_id,
            timeout: settings.timeout,
        });
    }

    async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.port.write_all(request).await
            .map_err(|e| TransportError::Io(format!("Failed to write request: {}", e)))?;

        let mut response = vec![0u8; RTU_HEADER_LEN];
        self.port.read_exact(&mut response).await
            .map_err(|e| TransportError::Io(format!("Failed to read response header: {}", e)))?;

        let len = guess_response_frame_len(&response, ModbusProto::Rtu)
            .map_err(|e| TransportError::Malformed(format!("Failed to determine response length: {:?}", e)))? as usize;

        if len > RTU_HEADER_LEN {
            let mut rest = vec![0u8; len - RTU_HEADER_LEN];
            self.port.read_exact(&mut rest).await
                .map_err(|e| TransportError::Io(format!("Failed to read response body: {}", e)))?;
            response.extend(rest);
        }

        return Ok(response);
    }
}

#[async_trait]
impl RegisterTransport for RtuTransport {
    async fn read_words(&mut self, address: u16, count: u16, function: FunctionCode) -> Result<Vec<u16>, TransportError> {
        let (mreq, request) = build_request(self.slave_id, address, count, function)?;

        match tokio::time::timeout(self.timeout, self.transact(&request)).await {
            Ok(Ok(response)) => parse_response(&mreq, &response, count),
            Ok(Err(e)) => {
                self.discard_input();
                Err(e)
            }
            Err(_) => {
                /* A late answer would otherwise be taken for the next request */
                self.discard_input();
                Err(TransportError::Timeout)
            }
        }
    }
}

impl RtuTransport {
    fn discard_input(&mut self) {
        if let Err(e) = self.port.clear(ClearBuffer::Input) {
            warn!("Unable to clear serial input buffer: {}", e);
        }
    }
}

pub fn build_request(slave_id: u8, address: u16, count: u16, function: FunctionCode) -> Result<(ModbusRequest, Vec<u8>), TransportError> {
    let mut mreq = ModbusRequest::new(slave_id, ModbusProto::Rtu);
    let mut request = Vec::new();

    let res = match function {
        FunctionCode::ReadHolding => mreq.generate_get_holdings(address, count, &mut request),
        FunctionCode::ReadInput => mreq.generate_get_inputs(address, count, &mut request),
    };
    res.map_err(|e| TransportError::Malformed(format!("Failed to build request for 0x{:04x}: {:?}", address, e)))?;

    return Ok((mreq, request));
}

pub fn parse_response(mreq: &ModbusRequest, response: &[u8], count: u16) -> Result<Vec<u16>, TransportError> {
    if response.len() >= RTU_HEADER_LEN && response[1] & 0x80 != 0 {
        return Err(TransportError::Exception(response[2]));
    }

    let mut data: Vec<u16> = Vec::new();
    mreq.parse_u16(response, &mut data)
        .map_err(|e| TransportError::Malformed(format!("{:?}", e)))?;

    if data.len() != count as usize {
        return Err(TransportError::Malformed(format!("expected {} words, got {}", count, data.len())));
    }

    return Ok(data);
}
