use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::MeterModel;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Unable to parse config {path}: {source}")]
    Parse { path: PathBuf, source: serde_yml::Error },
}

fn meter_device_default() -> String { return "/dev/ttyUSB0".to_string() }
fn meter_slave_id_default() -> u8 { return 1 }
fn meter_baudrate_default() -> u32 { return 9600 }
fn meter_timeout_ms_default() -> u64 { return 600 }
fn meter_polling_interval_default() -> u64 { return 5 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MeterConfig {
    #[serde(default="meter_device_default")]
    pub device: String,
    #[serde(default="meter_slave_id_default")]
    pub slave_id: u8,
    #[serde(default)]
    pub model: MeterModel,
    #[serde(default="meter_baudrate_default")]
    pub baudrate: u32,
    #[serde(default="meter_timeout_ms_default")]
    pub timeout_ms: u64,
    #[serde(default="meter_polling_interval_default")]
    pub polling_interval: u64,
}

impl MeterConfig {
    pub fn timeout(&self) -> Duration {
        return Duration::from_millis(self.timeout_ms);
    }

    pub fn interval(&self) -> Duration {
        return Duration::from_secs(self.polling_interval);
    }
}

fn mqtt_host_default() -> String { return "localhost".to_string() }
fn mqtt_port_default() -> u16 { return 1886 }
fn mqtt_base_topic_default() -> String { return "SmartMeter/ORNO".to_string() }
fn mqtt_client_name_default() -> String { return "meter2mqtt".to_string() }
fn mqtt_retry_count_default() -> u32 { return 60 }
fn mqtt_backoff_secs_default() -> u64 { return 5 }
fn mqtt_connect_timeout_secs_default() -> u64 { return 10 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_retry_count_default")]
    pub retry_count: u32,
    #[serde(default="mqtt_backoff_secs_default")]
    pub backoff_secs: u64,
    #[serde(default="mqtt_connect_timeout_secs_default")]
    pub connect_timeout_secs: u64,
}

fn meter_default() -> MeterConfig {
    return MeterConfig {
        device: meter_device_default(),
        slave_id: meter_slave_id_default(),
        model: MeterModel::default(),
        baudrate: meter_baudrate_default(),
        timeout_ms: meter_timeout_ms_default(),
        polling_interval: meter_polling_interval_default(),
    };
}

fn mqtt_default() -> MqttConfig {
    return MqttConfig {
        enabled: false,
        host: mqtt_host_default(),
        port: mqtt_port_default(),
        user: String::new(),
        pass: String::new(),
        base_topic: mqtt_base_topic_default(),
        client_name: mqtt_client_name_default(),
        retry_count: mqtt_retry_count_default(),
        backoff_secs: mqtt_backoff_secs_default(),
        connect_timeout_secs: mqtt_connect_timeout_secs_default(),
    };
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default="meter_default")]
    pub meter: MeterConfig,
    #[serde(default="mqtt_default")]
    pub mqtt: MqttConfig,
}

impl Default for Config {
    fn default() -> Self {
        return Config { meter: meter_default(), mqtt: mqtt_default() };
    }
}

const CONFIG_LOCATIONS: [&str; 2] = ["config/meter2mqtt.yaml", "meter2mqtt.yaml"];

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        let c: Config = serde_yml::from_str(&contents)
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?;
        return Ok(c);
    }

    /// An explicit path has to exist, otherwise the usual places are tried
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            info!("Using config {}", p.display());
            return Config::from_file(p);
        }

        for location in CONFIG_LOCATIONS {
            let p = Path::new(location);
            if p.exists() {
                info!("Using config {}", location);
                return Config::from_file(p);
            }
        }

        debug!("No config file found, running on defaults");
        return Ok(Config::default());
    }
}
