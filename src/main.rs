use clap::{Parser, Subcommand};
use log::{error, info};
use meter2mqtt::config::{Config, MeterConfig};
use meter2mqtt::metering_modbus::rtu::{RtuTransport, SerialSettings};
use meter2mqtt::metering_modbus::scan::{self, ScanRange};
use meter2mqtt::mqtt::{client::MqttBroker, ChannelSettings, PublishChannel};
use meter2mqtt::registers::{FunctionCode, CATALOG};
use meter2mqtt::{MeterModel, MeterSession, Poller};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meter2mqtt")]
#[command(about = "Poll Modbus RTU energy meters and publish the readings to MQTT")]
struct Cli {
    /// Config file, otherwise config/meter2mqtt.yaml or meter2mqtt.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Write the log into meter2mqtt-<timestamp>.log instead of stderr
    #[arg(long, global = true)]
    log_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the meter periodically
    Poll {
        device: Option<String>,
        #[arg(short, long)]
        model: Option<MeterModel>,
        /// Publish to the configured broker
        #[arg(long)]
        mqtt: bool,
        /// Seconds between two cycles
        #[arg(short, long)]
        interval: Option<u64>,
        #[arg(short = 'n', long)]
        iterations: Option<u64>,
        #[arg(short, long)]
        slave_id: Option<u8>,
        /// Print every reading as a table
        #[arg(short, long)]
        print: bool,
    },
    /// Probe a register range for answers
    Scan {
        device: Option<String>,
        #[arg(default_value = "0x0000", value_parser = scan::parse_address)]
        start: u16,
        #[arg(default_value = "0x0360", value_parser = scan::parse_address)]
        end: u16,
        /// Decimal places the raw values are scaled by
        #[arg(short, long, default_value_t = scan::DEFAULT_DECIMALS)]
        decimals: u8,
        /// Modbus function code, 3 (holding) or 4 (input)
        #[arg(short, long, default_value = "3", value_parser = parse_function)]
        function: FunctionCode,
    },
    /// Read a single measurement by name, e.g. L1_Voltage
    Read {
        measurement: String,
        device: Option<String>,
        #[arg(short, long)]
        model: Option<MeterModel>,
    },
}

fn parse_function(s: &str) -> Result<FunctionCode, String> {
    let code: u8 = s.parse().map_err(|_| format!("{} is not a function code", s))?;
    return FunctionCode::from_code(code).ok_or_else(|| format!("function code {} is not supported", code));
}

fn init_logging(log_file: bool) -> Result<(), std::io::Error> {
    let default_filter = std::env::var("M2M_LOG_LEVEL").unwrap_or("info".to_string());
    let mut builder = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(default_filter));

    if log_file {
        let name = format!("meter2mqtt-{}.log", chrono::Local::now().format("%Y%m%d%H%M%S"));
        let file = std::fs::File::create(&name)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    return Ok(());
}

fn serial_settings(meter: &MeterConfig) -> SerialSettings {
    return SerialSettings {
        device: meter.device.clone(),
        baudrate: meter.baudrate,
        slave_id: meter.slave_id,
        timeout: meter.timeout(),
    };
}

async fn run_poll(mut config: Config, mqtt: bool, iterations: Option<u64>, print: bool) -> Result<(), Box<dyn Error>> {
    let transport = RtuTransport::open(&serial_settings(&config.meter))?;
    let session = MeterSession::new(config.meter.model, transport);
    info!("Reading a {} on {}", config.meter.model.description(), config.meter.device);

    config.mqtt.enabled |= mqtt;
    let mut poller = Poller::new(session, config.meter.interval()).with_print(print || !config.mqtt.enabled);

    let mut channel = None;
    if config.mqtt.enabled {
        let (broker, events) = MqttBroker::new(&config.mqtt);
        let publish_channel = PublishChannel::new(broker, ChannelSettings::from(&config.mqtt));
        publish_channel.watch_events(events);
        poller = poller.with_channel(publish_channel.clone());
        channel = Some(publish_channel);
    }

    tokio::select! {
        _ = poller.run(iterations) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Got a signal to exit");
        }
    }

    if let Some(channel) = channel {
        channel.shutdown().await;
    }
    return Ok(());
}

async fn run_scan(config: Config, range: ScanRange) -> Result<(), Box<dyn Error>> {
    let transport = RtuTransport::open(&serial_settings(&config.meter))?;
    let mut session = MeterSession::new(config.meter.model, transport);
    info!("Scanning 0x{:04x} to 0x{:04x} with function {}", range.start, range.end, range.function.code());

    let hits = scan::scan_range(&mut session, &range, |hit| {
        println!("{} -- Address 0x{:04x}: {}", chrono::Local::now().format("%d/%m/%Y %H:%M:%S"), hit.address, hit.value);
    }).await;

    info!("{} registers answered", hits.len());
    return Ok(());
}

async fn run_read(config: Config, measurement: &str) -> Result<(), Box<dyn Error>> {
    let transport = RtuTransport::open(&serial_settings(&config.meter))?;
    let model = config.meter.model;
    let mut session = MeterSession::new(model, transport);

    let value = session.read_one_by_name(measurement).await?;
    let unit = meter2mqtt::MeasurementId::from_name(measurement)
        .map(|id| CATALOG.unit(model, id))
        .unwrap_or("");
    println!("{} = {} {}", measurement, value, unit);
    return Ok(());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file)?;

    let mut config = Config::load(cli.config.as_deref())?;

    let res = match cli.command {
        Commands::Poll { device, model, mqtt, interval, iterations, slave_id, print } => {
            if let Some(d) = device { config.meter.device = d; }
            if let Some(m) = model { config.meter.model = m; }
            if let Some(i) = interval { config.meter.polling_interval = i; }
            if let Some(s) = slave_id { config.meter.slave_id = s; }
            run_poll(config, mqtt, iterations, print).await
        }
        Commands::Scan { device, start, end, decimals, function } => {
            if let Some(d) = device { config.meter.device = d; }
            let range = ScanRange { start, end, decimals, function, ..ScanRange::default() };
            run_scan(config, range).await
        }
        Commands::Read { measurement, device, model } => {
            if let Some(d) = device { config.meter.device = d; }
            if let Some(m) = model { config.meter.model = m; }
            run_read(config, &measurement).await
        }
    };

    if let Err(e) = &res {
        error!("{}", e);
    }
    return res;
}
