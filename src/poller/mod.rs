use std::time::Duration;
use log::{debug, info, warn};

use crate::metering_modbus::{MeterSession, RegisterTransport};
use crate::mqtt::{Broker, PublishChannel};
use crate::registers::CATALOG;

/// What happened during one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Measurements the model should deliver, derived ones included
    pub expected: usize,
    pub read: usize,
    pub published: usize,
    pub publish_failures: usize,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        return self.read == self.expected && self.publish_failures == 0;
    }
}

pub struct Poller<T: RegisterTransport, B: Broker> {
    session: MeterSession<T>,
    channel: Option<PublishChannel<B>>,
    interval: Duration,
    print: bool,
}

impl<T: RegisterTransport, B: Broker> Poller<T, B> {
    pub fn new(session: MeterSession<T>, interval: Duration) -> Self {
        return Poller {
            session,
            channel: None,
            interval,
            print: false,
        };
    }

    pub fn with_channel(mut self, channel: PublishChannel<B>) -> Self {
        self.channel = Some(channel);
        return self;
    }

    /// Dump every set to stdout as a table
    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        return self;
    }

    pub fn into_session(self) -> MeterSession<T> {
        return self.session;
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let model = self.session.model();
        let set = self.session.read_measurement_set().await;
        let mut report = CycleReport {
            expected: CATALOG.published_count(model),
            read: set.len(),
            ..CycleReport::default()
        };

        if report.read < report.expected {
            warn!("Only {} of {} measurements read from the {}", report.read, report.expected, model);
        }

        if self.print {
            println!("{}", set);
        }

        if let Some(channel) = &self.channel {
            if !set.is_empty() {
                let published = channel.publish_set(&set).await;
                report.published = published.published;
                report.publish_failures = published.failed.len();
            }
        }

        debug!("Cycle of {} done: {:?}", set.taken_at().format("%H:%M:%S%.3f"), report);
        return report;
    }

    /// Poll until the iteration bound is hit, runs forever without one
    pub async fn run(&mut self, iterations: Option<u64>) -> u64 {
        info!("Polling the {} every {:?}", self.session.model(), self.interval);
        let bound_reached = |cycles: u64| iterations.map_or(false, |max| cycles >= max);
        let mut cycles: u64 = 0;

        while !bound_reached(cycles) {
            self.run_cycle().await;
            cycles += 1;

            /* no pause after the last cycle */
            if !bound_reached(cycles) {
                tokio::time::sleep(self.interval).await;
            }
        }

        info!("Stopping after {} cycles", cycles);
        return cycles;
    }
}
