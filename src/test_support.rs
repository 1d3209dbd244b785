use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;

use crate::metering_modbus::{MeasurementSet, RegisterTransport, TransportError};
use crate::models::{MeasurementId, MeterModel};
use crate::mqtt::{Broker, BrokerError};
use crate::registers::{decoder::encode_f32, FunctionCode, WordOrder, CATALOG};

/// Simulated meter memory, unknown addresses answer with an exception
#[derive(Default)]
pub struct FakeTransport {
    words: HashMap<u16, u16>,
    failing: HashSet<u16>,
    short: HashSet<u16>,
    requests: Vec<(u16, u16, FunctionCode)>,
}

impl FakeTransport {
    pub fn new() -> Self {
        return FakeTransport::default();
    }

    pub fn set_word(&mut self, address: u16, word: u16) {
        self.words.insert(address, word);
    }

    pub fn set_float(&mut self, address: u16, value: f32) {
        let [hi, lo] = encode_f32(value, WordOrder::HighFirst);
        self.words.insert(address, hi);
        self.words.insert(address + 1, lo);
    }

    /// Give every register of a model the same value
    pub fn fill_model(&mut self, model: MeterModel, value: f32) {
        for (_, desc) in CATALOG.measurements(model) {
            if desc.width == 2 {
                self.set_float(desc.address, value);
            } else {
                self.set_word(desc.address, value as u16);
            }
        }
    }

    /// Requests starting here time out
    pub fn fail_at(&mut self, address: u16) {
        self.failing.insert(address);
    }

    /// Requests starting here return one word too many
    pub fn short_answer_at(&mut self, address: u16) {
        self.short.insert(address);
    }

    pub fn requests(&self) -> &[(u16, u16, FunctionCode)] {
        return &self.requests;
    }
}

#[async_trait]
impl RegisterTransport for FakeTransport {
    async fn read_words(&mut self, address: u16, count: u16, function: FunctionCode) -> Result<Vec<u16>, TransportError> {
        self.requests.push((address, count, function));
        if self.failing.contains(&address) {
            return Err(TransportError::Timeout);
        }

        let mut words = Vec::new();
        for offset in 0..count {
            match self.words.get(&(address + offset)) {
                Some(w) => words.push(*w),
                None => return Err(TransportError::Exception(2)),
            }
        }
        if self.short.contains(&address) {
            words.push(0);
        }
        return Ok(words);
    }
}

#[derive(Default)]
struct FakeBrokerState {
    refuse: bool,
    hang: bool,
    connects: u32,
    disconnects: u32,
    published: Vec<(String, String)>,
    failing_topics: HashSet<String>,
}

/// Records everything instead of talking to a broker
#[derive(Default)]
pub struct FakeBroker {
    state: Mutex<FakeBrokerState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        return FakeBroker::default();
    }

    pub fn refusing() -> Self {
        let broker = FakeBroker::default();
        broker.set_refuse(true);
        return broker;
    }

    /// Never acknowledges the handshake
    pub fn hanging() -> Self {
        let broker = FakeBroker::default();
        broker.state.lock().unwrap().hang = true;
        return broker;
    }

    pub fn set_hang(&self, hang: bool) {
        self.state.lock().unwrap().hang = hang;
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    pub fn fail_topic(&self, topic: &str) {
        self.state.lock().unwrap().failing_topics.insert(topic.to_string());
    }

    pub fn connects(&self) -> u32 {
        return self.state.lock().unwrap().connects;
    }

    pub fn disconnects(&self) -> u32 {
        return self.state.lock().unwrap().disconnects;
    }

    pub fn published(&self) -> Vec<(String, String)> {
        return self.state.lock().unwrap().published.clone();
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let (refuse, hang) = {
            let mut state = self.state.lock().unwrap();
            state.connects += 1;
            (state.refuse, state.hang)
        };

        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if refuse {
            return Err(BrokerError::Refused("NotAuthorized".to_string()));
        }
        return Ok(());
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_topics.contains(topic) {
            return Err(BrokerError::Publish(format!("{} rejected", topic)));
        }
        state.published.push((topic.to_string(), payload));
        return Ok(());
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.state.lock().unwrap().disconnects += 1;
        return Ok(());
    }
}

/// A WE-514 style snapshot with the derived power included
pub fn sample_set() -> MeasurementSet {
    let mut values = BTreeMap::new();
    values.insert(MeasurementId::L1Voltage, 230.0);
    values.insert(MeasurementId::L1Current, 2.5);
    values.insert(MeasurementId::L1Power, 575.0);
    values.insert(MeasurementId::L1PF, 0.99);
    values.insert(MeasurementId::TotalPower, 1234.56);
    return MeasurementSet::new(MeterModel::OrnoWe514, values);
}
